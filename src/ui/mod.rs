mod format;
mod spinner;
mod status;
mod table;

pub use format::{capitalize, format_environment};

pub use spinner::with_spinner;

pub use status::print_warning;

pub use table::{apply_column_padding, header, styled_table, truncate};
