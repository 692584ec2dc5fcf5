use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use smsnote_core::fs::write_atomic;
use smsnote_core::HashCost;

use crate::security::ensure_parent_dir;

#[derive(Debug, Serialize, Deserialize)]
pub struct SmsNoteConfig {
    pub storage: StorageSection,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub sms: SmsSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageSection {
    pub backend: StorageBackend,
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Sqlite,
    Document,
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    /// Token-signing secret; `SMSNOTE_SECRET` takes precedence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl std::fmt::Debug for SecuritySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecuritySection")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("memory_kib", &self.memory_kib)
            .field("iterations", &self.iterations)
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

impl Default for SecuritySection {
    fn default() -> Self {
        let cost = HashCost::default();
        Self {
            secret: None,
            memory_kib: cost.memory_kib,
            iterations: cost.iterations,
            parallelism: cost.parallelism,
        }
    }
}

impl SecuritySection {
    pub fn hash_cost(&self) -> HashCost {
        HashCost {
            memory_kib: self.memory_kib,
            iterations: self.iterations,
            parallelism: self.parallelism,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub page_size: usize,
    pub recent_window_seconds: i64,
    pub reset_link: String,
    /// Per-command deadline for store and gateway calls
    pub timeout_seconds: u64,
}

impl Default for ServiceSection {
    fn default() -> Self {
        let defaults = smsnote_core::ServiceConfig::default();
        Self {
            page_size: defaults.page_size,
            recent_window_seconds: defaults.recent_window.num_seconds(),
            reset_link: defaults.reset_link,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct SmsSection {
    /// Append outgoing messages to this JSON-lines file instead of only logging them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbox: Option<String>,
}

impl SmsNoteConfig {
    pub fn new(
        backend: StorageBackend,
        storage_path: PathBuf,
        secret: String,
        reset_link: Option<String>,
        outbox: Option<PathBuf>,
    ) -> Self {
        let mut service = ServiceSection::default();
        if let Some(link) = reset_link {
            service.reset_link = link;
        }
        Self {
            storage: StorageSection {
                backend,
                path: storage_path.to_string_lossy().to_string(),
            },
            security: SecuritySection {
                secret: Some(secret),
                ..SecuritySection::default()
            },
            service,
            sms: SmsSection {
                outbox: outbox.map(|path| path.to_string_lossy().to_string()),
            },
        }
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

pub fn default_storage_path(backend: StorageBackend) -> anyhow::Result<PathBuf> {
    let name = match backend {
        StorageBackend::Sqlite => "smsnote.db",
        StorageBackend::Document => "documents",
    };
    Ok(xdg_data_dir()?.join(name))
}

pub fn default_token_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_data_dir()?.join("token"))
}

pub fn default_outbox_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_data_dir()?.join("outbox.jsonl"))
}

pub fn read_config(path: &Path) -> anyhow::Result<SmsNoteConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
}

/// Write the config file. It may hold the signing secret, so it is owner-only.
pub fn write_config(path: &Path, config: &SmsNoteConfig) -> anyhow::Result<()> {
    ensure_parent_dir(path)?;
    let contents =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {}", e))?;
    write_atomic(path, contents.as_bytes())
        .map_err(|e| anyhow::anyhow!("Failed to write config {}: {}", path.display(), e))
}

pub fn xdg_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("smsnote"));
        }
    }
    Ok(home_dir()?.join(".config").join("smsnote"))
}

pub fn xdg_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_DATA_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("smsnote"));
        }
    }
    Ok(home_dir()?.join(".local").join("share").join("smsnote"))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; cannot resolve default paths"))?;
    Ok(PathBuf::from(home))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trip_through_toml() {
        let config = SmsNoteConfig::new(
            StorageBackend::Document,
            PathBuf::from("/tmp/smsnote/documents"),
            "c2VjcmV0".to_string(),
            Some("https://notes.example/reset/{token}".to_string()),
            None,
        );
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("backend = \"document\""));
        assert!(!text.contains("outbox"));

        let parsed: SmsNoteConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.storage.backend, StorageBackend::Document);
        assert_eq!(parsed.security.secret.as_deref(), Some("c2VjcmV0"));
        assert_eq!(
            parsed.service.reset_link,
            "https://notes.example/reset/{token}"
        );
        assert_eq!(parsed.service.page_size, 20);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let parsed: SmsNoteConfig =
            toml::from_str("[storage]\nbackend = \"sqlite\"\npath = \"/tmp/x.db\"\n").unwrap();
        assert!(parsed.security.secret.is_none());
        assert_eq!(parsed.security.hash_cost(), HashCost::default());
        assert_eq!(parsed.service.recent_window_seconds, 300);
        assert_eq!(parsed.service.timeout_seconds, 30);
        assert!(parsed.sms.outbox.is_none());
    }

    #[test]
    fn test_debug_hides_secret() {
        let section = SecuritySection {
            secret: Some("hunter2".to_string()),
            ..SecuritySection::default()
        };
        assert!(!format!("{:?}", section).contains("hunter2"));
    }
}
