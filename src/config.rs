// Persisted credentials
// ---------------------
// A small JSON object at `~/.esa-cli-config.json` holding the access token
// and the team (sub-domain) name.
// - Every loader takes the path explicitly.
// - The CLI resolves it once from `--config` or the default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EsaError, Result};

/// Default config file name under the user's home directory.
const CONFIG_FILE_NAME: &str = ".esa-cli-config.json";

/// Credentials needed to talk to the esa API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub team_name: String,
}

impl Config {
    /// Both fields must be non-empty before any command other than `setup` runs.
    pub fn validate(&self) -> Result<()> {
        if self.team_name.trim().is_empty() || self.access_token.trim().is_empty() {
            return Err(EsaError::config(
                "configuration is incomplete; run 'esa-cli setup' first",
            ));
        }
        Ok(())
    }
}

/// `~/.esa-cli-config.json`
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EsaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_FILE_NAME))
}

/// Load the config from `path`. A missing file is a config error, not a default.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(EsaError::config(format!(
            "config file not found at {}; run 'esa-cli setup' first",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| EsaError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| EsaError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Load and validate in one step, as every networked command needs.
pub fn load_valid_config(path: &Path) -> Result<Config> {
    let config = load_config_from(path)?;
    config.validate()?;
    Ok(config)
}

/// Write the config as pretty JSON, readable only by the owner on Unix.
pub fn save_config_to(path: &Path, config: &Config) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| EsaError::io(dir, e))?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| EsaError::io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| EsaError::io(path, e))?;
    }

    tracing::info!(?path, "saved config");
    Ok(())
}
