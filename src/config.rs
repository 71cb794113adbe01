//! Saved defaults for `--app`, `--env` and `--api-url`.
//!
//! Two JSON files are consulted: `~/.config/vip/config.json` (or under
//! `$XDG_CONFIG_HOME`), then the nearest `.vip/config.json` walking up from
//! the working directory, which wins key by key. The files are only read.

use anyhow::{anyhow, Result};
use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::ui::print_warning;

/// Ids may be written as numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub api_url: Option<String>,
    app: Option<IdValue>,
    env: Option<IdValue>,
}

impl Defaults {
    pub fn app_id(&self) -> Result<Option<i64>> {
        parse_id("app", self.app.as_ref())
    }

    pub fn env_id(&self) -> Result<Option<i64>> {
        parse_id("env", self.env.as_ref())
    }

    fn layered_under(self, over: Defaults) -> Defaults {
        Defaults {
            api_url: over.api_url.or(self.api_url),
            app: over.app.or(self.app),
            env: over.env.or(self.env),
        }
    }
}

fn parse_id(key: &str, value: Option<&IdValue>) -> Result<Option<i64>> {
    match value {
        None => Ok(None),
        Some(IdValue::Number(id)) => Ok(Some(*id)),
        Some(IdValue::Text(raw)) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("config key {key} must be a numeric id, found '{raw}'")),
    }
}

/// Global defaults overlaid with the nearest local ones. Missing or
/// unreadable files contribute nothing.
pub fn load() -> Defaults {
    let global = global_path().map(|p| load_file(&p)).unwrap_or_default();
    let local = env::current_dir()
        .ok()
        .and_then(|cwd| find_local(&cwd, dirs::home_dir().as_deref()))
        .map(|p| load_file(&p))
        .unwrap_or_default();
    global.layered_under(local)
}

fn global_path() -> Option<PathBuf> {
    let dir = match env::var_os("XDG_CONFIG_HOME") {
        Some(xdg) => PathBuf::from(xdg),
        None => dirs::home_dir()?.join(".config"),
    };
    Some(dir.join("vip").join("config.json"))
}

/// Nearest `.vip/config.json` at or above `start`. The search stops at a
/// repository root or the home directory.
fn find_local(start: &Path, home: Option<&Path>) -> Option<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(".vip").join("config.json");
        if candidate.is_file() {
            return Some(candidate);
        }
        if dir.join(".git").exists() || Some(dir) == home {
            return None;
        }
    }
    None
}

fn load_file(path: &Path) -> Defaults {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Defaults::default(),
        Err(e) => {
            print_warning(&format!("could not read {}: {e}", path.display()));
            return Defaults::default();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(defaults) => {
            tracing::debug!(path = %path.display(), "loaded config");
            defaults
        }
        Err(e) => {
            print_warning(&format!("could not parse {}: {e}", path.display()));
            Defaults::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(value: serde_json::Value) -> Defaults {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn ids_accept_numbers_and_numeric_strings() {
        let defaults = parse(serde_json::json!({"app": 42, "env": " 7 "}));
        assert_eq!(defaults.app_id().unwrap(), Some(42));
        assert_eq!(defaults.env_id().unwrap(), Some(7));

        let defaults = parse(serde_json::json!({"env": "staging"}));
        assert_eq!(defaults.app_id().unwrap(), None);
        let err = defaults.env_id().unwrap_err();
        assert!(err.to_string().contains("must be a numeric id"));
    }

    #[test]
    fn local_values_win_key_by_key() {
        let global = parse(serde_json::json!({
            "api_url": "https://api.example.com",
            "app": 1,
            "env": 2,
        }));
        let local = parse(serde_json::json!({"env": 20}));
        let merged = global.layered_under(local);
        assert_eq!(merged.api_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(merged.app_id().unwrap(), Some(1));
        assert_eq!(merged.env_id().unwrap(), Some(20));
    }

    #[test]
    fn local_file_is_found_above_the_working_directory() {
        let tmp = TempDir::new().unwrap();
        let site = tmp.path().join("site");
        let nested = site.join("wp-content").join("themes");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(site.join(".vip")).unwrap();
        fs::write(site.join(".vip").join("config.json"), r#"{"app": 5}"#).unwrap();

        let found = find_local(&nested, None).unwrap();
        assert_eq!(found, site.join(".vip").join("config.json"));
        assert_eq!(load_file(&found).app_id().unwrap(), Some(5));
    }

    #[test]
    fn local_search_stops_at_repository_root() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".vip")).unwrap();
        fs::write(tmp.path().join(".vip").join("config.json"), "{}").unwrap();
        let repo = tmp.path().join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();

        assert_eq!(find_local(&repo, None), None);
        assert_eq!(find_local(&repo.join("src"), Some(&repo)), None);
    }

    #[test]
    fn unreadable_files_contribute_nothing() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(load_file(&tmp.path().join("missing.json")), Defaults::default());

        let path = tmp.path().join("broken.json");
        fs::write(&path, "not valid json {{{").unwrap();
        assert_eq!(load_file(&path), Defaults::default());
    }
}
