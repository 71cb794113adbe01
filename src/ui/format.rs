use dialoguer::console::style;

/// Environment label: production shouts in red, everything else is quiet blue.
pub fn format_environment(env_type: &str) -> String {
    if env_type.eq_ignore_ascii_case("production") {
        style(env_type.to_uppercase()).red().to_string()
    } else {
        style(env_type.to_lowercase()).blue().bright().to_string()
    }
}

pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
