use crate::domain::UserId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";
const DEFAULT_HISTORY_LIMIT: usize = 100;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ResolveStateDirError {
    #[error("home directory not found")]
    HomeDirNotFound,
}

pub fn resolve_state_dir(
    env: impl Fn(&str) -> Option<String>,
) -> Result<PathBuf, ResolveStateDirError> {
    if let Some(dir) = env("CARDCHAT_STATE_DIR").filter(|dir| !dir.trim().is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let Some(home) = dirs::home_dir() else {
        return Err(ResolveStateDirError::HomeDirNotFound);
    };
    Ok(home.join(".cardchat"))
}

/// On-disk settings. Every field is optional so a partial file still loads.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigFile {
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub default_conversation: Option<String>,
    pub history_limit: Option<usize>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub state_dir: PathBuf,
    pub api_url: Url,
    pub ws_url: Url,
    pub token: Option<String>,
    pub user_id: UserId,
    pub default_conversation: Option<String>,
    pub history_limit: usize,
    pub request_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SaveConfigError {
    #[error("failed to encode config: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write config: {0}")]
    Write(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadConfigError),

    #[error("invalid {field} url {value:?}: {message}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("no user id configured; set CARDCHAT_USER_ID or userId in {path}")]
    MissingUserId { path: String },
}

pub fn config_path(state_dir: &Path) -> PathBuf {
    state_dir.join("config.json")
}

pub fn load_config_file(state_dir: &Path) -> Result<ConfigFile, LoadConfigError> {
    let path = config_path(state_dir);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(ConfigFile::default());
        }
        Err(error) => return Err(error.into()),
    };
    Ok(serde_json::from_str(&raw)?)
}

pub fn save_config_file(state_dir: &Path, file: &ConfigFile) -> Result<(), SaveConfigError> {
    fs::create_dir_all(state_dir)?;

    let path = config_path(state_dir);
    let tmp = path.with_extension("json.tmp");
    let text = serde_json::to_string_pretty(file)?;
    fs::write(&tmp, text)?;
    fs::rename(tmp, path)?;
    Ok(())
}

/// Layers environment overrides on top of the config file.
pub fn resolve_settings(
    state_dir: &Path,
    file: ConfigFile,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings, ConfigError> {
    let pick = |key: &str, fallback: Option<String>| {
        env(key)
            .filter(|value| !value.trim().is_empty())
            .or(fallback)
            .map(|value| value.trim().to_string())
    };

    let api_url = pick("CARDCHAT_API_URL", file.api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let ws_url =
        pick("CARDCHAT_WS_URL", file.ws_url).unwrap_or_else(|| DEFAULT_WS_URL.to_string());
    let token = pick("CARDCHAT_TOKEN", file.token);
    let Some(user_id) = pick("CARDCHAT_USER_ID", file.user_id) else {
        return Err(ConfigError::MissingUserId {
            path: config_path(state_dir).display().to_string(),
        });
    };

    Ok(Settings {
        state_dir: state_dir.to_path_buf(),
        api_url: parse_url("api", &api_url)?,
        ws_url: parse_url("ws", &ws_url)?,
        token,
        user_id: UserId::new(user_id),
        default_conversation: file
            .default_conversation
            .filter(|conversation| !conversation.trim().is_empty()),
        history_limit: file
            .history_limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_HISTORY_LIMIT),
        request_timeout: Duration::from_secs(
            file.request_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        ),
    })
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|error| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempdir().expect("tempdir");
        assert_eq!(load_config_file(dir.path()).expect("load"), ConfigFile::default());
    }

    #[test]
    fn saved_file_round_trips() {
        let dir = tempdir().expect("tempdir");
        let file = ConfigFile {
            user_id: Some("u1".to_string()),
            history_limit: Some(20),
            ..ConfigFile::default()
        };
        save_config_file(dir.path(), &file).expect("save");
        assert_eq!(load_config_file(dir.path()).expect("load"), file);
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn environment_overrides_file_values() {
        let dir = tempdir().expect("tempdir");
        let file = ConfigFile {
            api_url: Some("http://file.example/api".to_string()),
            user_id: Some("from-file".to_string()),
            ..ConfigFile::default()
        };
        let settings = resolve_settings(
            dir.path(),
            file,
            env_from(&[("CARDCHAT_USER_ID", "from-env"), ("CARDCHAT_TOKEN", "t0k")]),
        )
        .expect("settings");

        assert_eq!(settings.user_id, UserId::new("from-env"));
        assert_eq!(settings.api_url.as_str(), "http://file.example/api");
        assert_eq!(settings.ws_url.as_str(), DEFAULT_WS_URL);
        assert_eq!(settings.token.as_deref(), Some("t0k"));
        assert_eq!(settings.history_limit, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn user_id_is_required() {
        let dir = tempdir().expect("tempdir");
        let result = resolve_settings(dir.path(), ConfigFile::default(), env_from(&[]));
        assert!(matches!(result, Err(ConfigError::MissingUserId { .. })));
    }

    #[test]
    fn bad_url_is_reported_with_field() {
        let dir = tempdir().expect("tempdir");
        let result = resolve_settings(
            dir.path(),
            ConfigFile::default(),
            env_from(&[("CARDCHAT_USER_ID", "u"), ("CARDCHAT_WS_URL", "not a url")]),
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidUrl { field: "ws", .. })
        ));
    }

    #[test]
    fn state_dir_env_override_wins() {
        let dir = resolve_state_dir(env_from(&[("CARDCHAT_STATE_DIR", "/tmp/cc")])).expect("dir");
        assert_eq!(dir, PathBuf::from("/tmp/cc"));
    }
}
