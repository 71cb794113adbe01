use anyhow::{bail, Result};

use crate::args::{BaseArgs, DEFAULT_API_URL};
use crate::config;

/// Resolved credentials and API location, built once per command and passed
/// down by reference.
#[derive(Debug, Clone)]
pub struct LoginContext {
    pub api_url: String,
    pub token: String,
}

pub fn login(base: &BaseArgs) -> Result<LoginContext> {
    resolve(base, &config::load())
}

fn resolve(base: &BaseArgs, defaults: &config::Defaults) -> Result<LoginContext> {
    let Some(token) = base
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    else {
        bail!("no API token found. Set VIP_TOKEN or pass --token");
    };

    // Priority: CLI flag / VIP_API_URL > config file > default
    let api_url = base
        .api_url
        .clone()
        .or_else(|| defaults.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    Ok(LoginContext {
        api_url: api_url.trim_end_matches('/').to_string(),
        token: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_with(token: Option<&str>, api_url: Option<&str>) -> BaseArgs {
        BaseArgs {
            json: false,
            verbose: false,
            token: token.map(str::to_string),
            api_url: api_url.map(str::to_string),
            app: None,
            env_id: None,
            env_file: None,
        }
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = resolve(&base_with(None, None), &config::Defaults::default()).unwrap_err();
        assert!(err.to_string().contains("VIP_TOKEN"));

        let err = resolve(&base_with(Some("  "), None), &config::Defaults::default()).unwrap_err();
        assert!(err.to_string().contains("--token"));
    }

    #[test]
    fn api_url_falls_back_to_config_then_default() {
        let cfg: config::Defaults =
            serde_json::from_value(serde_json::json!({"api_url": "https://api.example.com/"}))
                .unwrap();
        let ctx = resolve(&base_with(Some("t"), None), &cfg).unwrap();
        assert_eq!(ctx.api_url, "https://api.example.com");

        let ctx = resolve(&base_with(Some("t"), None), &config::Defaults::default()).unwrap();
        assert_eq!(ctx.api_url, DEFAULT_API_URL);

        let ctx = resolve(&base_with(Some("t"), Some("http://localhost:4000")), &cfg).unwrap();
        assert_eq!(ctx.api_url, "http://localhost:4000");
    }
}
