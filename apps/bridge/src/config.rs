//! Bridge configuration.
//!
//! Reads TOML from `$CLOUDBOT_CONFIG`, or `~/.config/cloudbot/bridge.toml`.
//! A commented-out default is written on first run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use cloudbot_gateway::{AccountConfig, GatewaySettings};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "CLOUDBOT_CONFIG";

const DEFAULT_FILE: &str = r#"# cloudbot bridge configuration

[gateway]
# Messages held per account while its socket is down.
queue_capacity = 1000
# Where inbound attachments are saved.
# media_dir = "/var/lib/cloudbot/inbound"

[accounts.default]
enabled = false
apiKey = ""
apiEndpoint = "localhost:8080"
useTls = false
serverUrl = "http://localhost:8080"
"#;

/// `[gateway]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_dir: Option<PathBuf>,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            media_dir: None,
        }
    }
}

fn default_queue_capacity() -> usize {
    GatewaySettings::default().queue_capacity
}

/// One `[accounts.<id>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEntry {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(flatten)]
    pub account: AccountConfig,
}

fn enabled_by_default() -> bool {
    true
}

/// Bridge configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountEntry>,
}

impl BridgeConfig {
    /// Loads the config from its default location, writing a template if
    /// the file does not exist yet.
    pub fn load() -> anyhow::Result<(Self, PathBuf)> {
        let path = config_file_path();
        if !path.exists() {
            write_default(&path)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
        }
        let config = Self::load_from(&path)?;
        Ok((config, path))
    }

    /// Parses the config at `path`.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Accounts marked `enabled`, in id order.
    pub fn enabled_accounts(&self) -> Vec<(String, AccountConfig)> {
        self.accounts
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(id, entry)| (id.clone(), entry.account.clone()))
            .collect()
    }

    /// Gateway tunables; anything not in the file keeps its default.
    pub fn settings(&self) -> GatewaySettings {
        GatewaySettings {
            queue_capacity: self.gateway.queue_capacity,
            ..GatewaySettings::default()
        }
    }

    /// Directory inbound attachments are saved under.
    pub fn media_dir(&self) -> PathBuf {
        self.gateway
            .media_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("cloudbot").join("inbound"))
    }
}

fn write_default(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, DEFAULT_FILE)
        .with_context(|| format!("failed to write {}", path.display()))?;
    set_permissions_0600(path);
    Ok(())
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV)
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    config_base_dir().join("cloudbot").join("bridge.toml")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}
