//! Configuration, credentials and executable resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::convert::default_branch_map;
use crate::errors::AutomationError;

pub const CONFIG_FILE_NAME: &str = "express.config.json";
pub const CONFIG_PATH_ENV: &str = "EXPRESS_CONFIG";
pub const EXPRESS_PATH_ENV: &str = "EXPRESS_PATH";
/// Organisation-wide install location, a mapped network drive.
pub const DEFAULT_EXPRESS_PATH: &str = r"Z:\ExpressI.exe";
pub const CREDENTIALS_FILE_NAME: &str = "credential.json";
pub const ARCHIVE_DIR_NAME: &str = "processed";

fn default_archive_dir() -> String {
    ARCHIVE_DIR_NAME.to_string()
}

fn default_launch_wait_ms() -> u64 {
    3000
}

fn default_login_wait_ms() -> u64 {
    2000
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from(CREDENTIALS_FILE_NAME)
}

fn default_watch_folder() -> PathBuf {
    PathBuf::from("excel_templates")
}

fn default_incoming_folder() -> PathBuf {
    PathBuf::from("incoming_exports")
}

fn default_popup_title() -> String {
    "Select".to_string()
}

/// Contents of `express.config.json`. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub express_path: Option<PathBuf>,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    /// Folder watched for input workbooks; also where converted files land.
    #[serde(default = "default_watch_folder")]
    pub watch_folder: PathBuf,
    /// Folder watched for raw vendor exports.
    #[serde(default = "default_incoming_folder")]
    pub incoming_folder: PathBuf,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,
    pub navigate_to_credit_purchase: bool,
    pub save_and_advance: bool,
    /// Title of the supplier selection window, used for popup detection.
    #[serde(default = "default_popup_title")]
    pub popup_window_title: String,
    #[serde(default = "default_launch_wait_ms")]
    pub launch_wait_ms: u64,
    #[serde(default = "default_login_wait_ms")]
    pub login_wait_ms: u64,
    /// Ship-to branch code -> department, for the export converter.
    #[serde(default = "default_branch_map")]
    pub branch_map: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            express_path: None,
            credentials_path: default_credentials_path(),
            watch_folder: default_watch_folder(),
            incoming_folder: default_incoming_folder(),
            archive_dir: default_archive_dir(),
            navigate_to_credit_purchase: false,
            save_and_advance: false,
            popup_window_title: default_popup_title(),
            launch_wait_ms: default_launch_wait_ms(),
            login_wait_ms: default_login_wait_ms(),
            branch_map: default_branch_map(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, AutomationError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| AutomationError::Config(format!("{}: {e}", path.display())))
    }

    /// Loads the config from `explicit`, else `$EXPRESS_CONFIG`, else
    /// `express.config.json` in the working directory. A missing default
    /// file yields the defaults; a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, AutomationError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(Path::new(&env_path));
        }
        let default = Path::new(CONFIG_FILE_NAME);
        if default.exists() {
            info!("Using config file {}", default.display());
            return Self::from_file(default);
        }
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }
}

/// First existing path among: the explicit parameter, `$EXPRESS_PATH`, the
/// configured `express_path`, then the organisation default.
pub fn resolve_express_path(
    explicit: Option<&Path>,
    config: &AppConfig,
) -> Result<PathBuf, AutomationError> {
    let env_value = std::env::var_os(EXPRESS_PATH_ENV).map(PathBuf::from);
    resolve_express_path_from(
        explicit,
        env_value.as_deref(),
        config.express_path.as_deref(),
        Path::new(DEFAULT_EXPRESS_PATH),
    )
}

pub(crate) fn resolve_express_path_from(
    explicit: Option<&Path>,
    env_value: Option<&Path>,
    configured: Option<&Path>,
    default: &Path,
) -> Result<PathBuf, AutomationError> {
    let candidates: Vec<&Path> = [explicit, env_value, configured, Some(default)]
        .into_iter()
        .flatten()
        .collect();

    for candidate in &candidates {
        if candidate.exists() {
            debug!("Resolved Express executable: {}", candidate.display());
            return Ok(candidate.to_path_buf());
        }
        debug!("Express candidate does not exist: {}", candidate.display());
    }

    Err(AutomationError::ExecutableNotFound {
        tried: candidates.iter().map(|p| p.to_path_buf()).collect(),
    })
}

/// Login for the target application.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Reads `{ "username": ..., "password": ... }`. A missing file, bad
    /// JSON or an empty field is a hard stop.
    pub fn load(path: &Path) -> Result<Self, AutomationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            warn!("Cannot read credentials at {}: {}", path.display(), e);
            AutomationError::MissingCredentials(format!("{} not readable: {e}", path.display()))
        })?;
        let credentials: Credentials = serde_json::from_str(&content).map_err(|e| {
            AutomationError::MissingCredentials(format!("{} is not valid JSON: {e}", path.display()))
        })?;
        credentials.validate()?;
        Ok(credentials)
    }

    pub fn validate(&self) -> Result<(), AutomationError> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(AutomationError::MissingCredentials(
                "username and password must both be set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_prefers_explicit_then_env_then_config_then_default() {
        let dir = tempfile::tempdir().unwrap();
        let make = |name: &str| {
            let p = dir.path().join(name);
            std::fs::write(&p, b"").unwrap();
            p
        };
        let explicit = make("explicit.exe");
        let env = make("env.exe");
        let configured = make("config.exe");
        let default = make("default.exe");
        let missing = dir.path().join("missing.exe");

        let resolve = |e: Option<&Path>, v: Option<&Path>, c: Option<&Path>, d: &Path| {
            resolve_express_path_from(e, v, c, d).unwrap()
        };

        assert_eq!(
            resolve(Some(&explicit), Some(&env), Some(&configured), &default),
            explicit
        );
        assert_eq!(
            resolve(Some(&missing), Some(&env), Some(&configured), &default),
            env
        );
        assert_eq!(resolve(None, Some(&missing), Some(&configured), &default), configured);
        assert_eq!(resolve(None, None, Some(&missing), &default), default);
    }

    #[test]
    fn resolution_fails_when_nothing_exists() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.exe");
        let err = resolve_express_path_from(Some(&missing), None, None, &missing).unwrap_err();
        match err {
            AutomationError::ExecutableNotFound { tried } => assert_eq!(tried.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn credentials_require_both_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.json");

        std::fs::write(&path, r#"{"username": "clerk", "password": "pw"}"#).unwrap();
        let creds = Credentials::load(&path).unwrap();
        assert_eq!(creds.username, "clerk");
        assert!(!format!("{creds:?}").contains("pw\""));

        std::fs::write(&path, r#"{"username": "clerk"}"#).unwrap();
        assert!(matches!(
            Credentials::load(&path),
            Err(AutomationError::MissingCredentials(_))
        ));

        assert!(matches!(
            Credentials::load(&dir.path().join("absent.json")),
            Err(AutomationError::MissingCredentials(_))
        ));
    }

    #[test]
    fn partial_config_uses_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"express_path": "C:\\Express\\ExpressI.exe"}"#).unwrap();
        assert_eq!(cfg.archive_dir, "processed");
        assert_eq!(cfg.launch_wait_ms, 3000);
        assert!(!cfg.save_and_advance);
        assert_eq!(cfg.branch_map.get("0002198490").map(String::as_str), Some("BKK"));
    }
}
