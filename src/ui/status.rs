use dialoguer::console::style;

pub fn print_warning(message: &str) {
    eprintln!("{} {message}", style("!").yellow());
}
