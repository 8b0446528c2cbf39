//! Locating and loading the provider file and key pair.
//!
//! # Environment Variables
//!
//! - `STACKUP_CONFIG_DIR` - Override the config directory
//!
//! For config_dir():
//! 1. `STACKUP_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/stackup` (if set)
//! 3. `~/.config/stackup`

use anyhow::{Context, Result, bail};
use nodekit::{KeyPair, ProviderConfig};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "STACKUP_CONFIG_DIR";

/// Provider file name inside the config directory
pub const PROVIDER_FILE: &str = "provider.toml";

static GROUP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]{0,38}[a-z0-9]$").expect("group name pattern is valid")
});

/// Get the stackup config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("stackup");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("stackup");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Resolve the provider file: the explicit path, or the default location.
pub fn provider_file(explicit: Option<&str>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(path)),
        None => Ok(config_dir()?.join(PROVIDER_FILE)),
    }
}

/// Resolve the key directory: the explicit path, or the provider file's directory.
pub fn keys_dir(explicit: Option<&str>, provider_file: &Path) -> PathBuf {
    match explicit {
        Some(dir) => expand(dir),
        None => provider_file
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
    }
}

/// Load and validate the provider file.
pub fn load_provider(path: &Path) -> Result<ProviderConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read provider file: {}", path.display()))?;
    let config = ProviderConfig::from_toml_str(&content)
        .with_context(|| format!("Invalid provider file: {}", path.display()))?;
    log::debug!("Loaded {config:?}");
    Ok(config)
}

/// Load the group's key pair.
pub fn load_keys(dir: &Path, group: &str) -> Result<KeyPair> {
    KeyPair::load(dir, group).with_context(|| {
        format!(
            "Failed to load key pair for group '{group}' from {}",
            dir.display()
        )
    })
}

/// Check that a group tag is usable as a node-name prefix.
pub fn validate_group(group: &str) -> Result<()> {
    if !GROUP_NAME.is_match(group) {
        bail!(
            "Invalid group '{group}': use 2-40 lowercase letters, digits or dashes, \
             starting with a letter and not ending with a dash"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROVIDER: &str = r#"
provider = "rackspace"

[rackspace]
name = "rackspace-cloudservers-us"
identity = "user"
credential = "api-key"
location = "DFW"
image = "Ubuntu 12.04"
hardware = "2"
"#;

    #[test]
    fn test_validate_group() {
        assert!(validate_group("multi-cloud-workshop").is_ok());
        assert!(validate_group("ab").is_ok());
        assert!(validate_group("a").is_err());
        assert!(validate_group("Upper").is_err());
        assert!(validate_group("trailing-").is_err());
        assert!(validate_group("1starts-with-digit").is_err());
        assert!(validate_group("has space").is_err());
    }

    #[test]
    fn test_keys_dir_defaults_to_provider_dir() {
        let file = PathBuf::from("/etc/stackup/provider.toml");
        assert_eq!(keys_dir(None, &file), PathBuf::from("/etc/stackup"));
        assert_eq!(keys_dir(Some("/keys"), &file), PathBuf::from("/keys"));
    }

    #[test]
    fn test_provider_file_explicit() {
        assert_eq!(
            provider_file(Some("/tmp/p.toml")).unwrap(),
            PathBuf::from("/tmp/p.toml")
        );
    }

    #[test]
    fn test_load_provider_and_keys() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join(PROVIDER_FILE);
        std::fs::write(&file, PROVIDER).unwrap();
        std::fs::write(dir.path().join("mcw.pub"), "ssh-ed25519 AAAA me\n").unwrap();
        std::fs::write(dir.path().join("mcw.key"), "PRIVATE").unwrap();

        let config = load_provider(&file).unwrap();
        assert_eq!(config.provider, "rackspace");
        assert_eq!(config.hardware_id(), "DFW/2");

        let keys = load_keys(&keys_dir(None, &file), "mcw").unwrap();
        assert_eq!(keys.public_key, "ssh-ed25519 AAAA me");
        assert_eq!(keys.private_key_path, dir.path().join("mcw.key"));
    }

    #[test]
    fn test_load_provider_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_provider(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read provider file"));
    }

    #[test]
    fn test_load_provider_missing_property() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join(PROVIDER_FILE);
        std::fs::write(&file, PROVIDER.replace("image = \"Ubuntu 12.04\"\n", "")).unwrap();
        let err = load_provider(&file).unwrap_err();
        assert!(format!("{err:#}").contains("rackspace.image"));
    }
}
