use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cursor::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub oai: OaiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Token-bucket allowance: `rate_allowance` requests per `rate_period_secs`.
    #[serde(default = "default_rate_allowance")]
    pub rate_allowance: u32,
    #[serde(default = "default_rate_period_secs")]
    pub rate_period_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            rate_allowance: default_rate_allowance(),
            rate_period_secs: default_rate_period_secs(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("trove/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_rate_allowance() -> u32 {
    5
}
fn default_rate_period_secs() -> u64 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
fn default_max_page_size() -> usize {
    MAX_PAGE_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct OaiConfig {
    #[serde(default = "default_repository_name")]
    pub repository_name: String,
    #[serde(default = "default_repository_identifier")]
    pub repository_identifier: String,
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    #[serde(default = "default_oai_base_url")]
    pub base_url: String,
    #[serde(default = "default_oai_page_size")]
    pub page_size: usize,
}

impl Default for OaiConfig {
    fn default() -> Self {
        Self {
            repository_name: default_repository_name(),
            repository_identifier: default_repository_identifier(),
            admin_email: default_admin_email(),
            base_url: default_oai_base_url(),
            page_size: default_oai_page_size(),
        }
    }
}

fn default_repository_name() -> String {
    "trove".to_string()
}
fn default_repository_identifier() -> String {
    "trove.localhost".to_string()
}
fn default_admin_email() -> String {
    "admin@localhost".to_string()
}
fn default_oai_base_url() -> String {
    "http://localhost/oai".to_string()
}
fn default_oai_page_size() -> usize {
    13
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.harvest.rate_allowance == 0 {
        anyhow::bail!("harvest.rate_allowance must be > 0");
    }
    if config.harvest.rate_period_secs == 0 {
        anyhow::bail!("harvest.rate_period_secs must be > 0");
    }

    if config.search.default_page_size == 0 {
        anyhow::bail!("search.default_page_size must be > 0");
    }
    if config.search.default_page_size > config.search.max_page_size {
        anyhow::bail!(
            "search.default_page_size must not exceed search.max_page_size ({})",
            config.search.max_page_size
        );
    }

    if config.oai.page_size == 0 {
        anyhow::bail!("oai.page_size must be > 0");
    }
    if config.oai.repository_identifier.contains(':') {
        anyhow::bail!("oai.repository_identifier must not contain ':'");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config("[db]\npath = \"trove.db\"\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.search.default_page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.oai.page_size, 13);
        assert!(config.harvest.user_agent.starts_with("trove/"));
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let file = write_config("[db]\npath = \"trove.db\"\n\n[search]\ndefault_page_size = 0\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_rejects_colon_in_repository_identifier() {
        let file = write_config(
            "[db]\npath = \"trove.db\"\n\n[oai]\nrepository_identifier = \"oai:bad\"\n",
        );
        assert!(load_config(file.path()).is_err());
    }
}
