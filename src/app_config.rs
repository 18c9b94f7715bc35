//! Config file loading for CLI defaults.
//!
//! The file uses a flat `key = value` subset of TOML: double-quoted strings,
//! bare non-negative integers, and `#` comments.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use transfer_core::TransferConfig;

/// Values read from the config file. Unset keys keep library defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Storage root for downloads.
    pub storage_root: Option<PathBuf>,
    /// SQLite file holding resume records.
    pub state_db: Option<PathBuf>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Copy-loop slice size for downloads.
    pub download_chunk_size: Option<usize>,
    /// Body increment size for uploads.
    pub upload_chunk_size: Option<usize>,
    /// Suffix for in-progress downloads.
    pub partial_suffix: Option<String>,
    /// Content-Type sent with uploads.
    pub upload_content_type: Option<String>,
    /// Clean restarts allowed after a remote resource change.
    pub max_resource_restarts: Option<u32>,
}

impl FileConfig {
    /// Overlays the values present in this file onto `config`.
    pub fn apply_to(&self, config: &mut TransferConfig) {
        if let Some(value) = self.connect_timeout_secs {
            config.connect_timeout_secs = value;
        }
        if let Some(value) = self.read_timeout_secs {
            config.read_timeout_secs = value;
        }
        if let Some(value) = self.download_chunk_size {
            config.download_chunk_size = value;
        }
        if let Some(value) = self.upload_chunk_size {
            config.upload_chunk_size = value;
        }
        if let Some(value) = &self.partial_suffix {
            config.partial_suffix.clone_from(value);
        }
        if let Some(value) = &self.upload_content_type {
            config.upload_content_type.clone_from(value);
        }
        if let Some(value) = self.max_resource_restarts {
            config.max_resource_restarts = value;
        }
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/transfer/config.toml`
/// 2. `$HOME/.config/transfer/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(base) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(base).join("transfer").join("config.toml"));
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("transfer")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    env::var_os(name).filter(|value| !value.is_empty())
}

/// Loads `explicit`, or the default config file when it exists.
///
/// An explicit path must exist; a missing default file yields an empty config.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return load_file_config(path);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (index, raw_line) in raw.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let (key, value) = (key.trim(), value.trim());
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "storage_root" => {
                cfg.storage_root = Some(PathBuf::from(parse_string(value).with_context(context)?));
            }
            "state_db" => {
                cfg.state_db = Some(PathBuf::from(parse_string(value).with_context(context)?));
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_timeout(value).with_context(context)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_timeout(value).with_context(context)?);
            }
            "download_chunk_size" => {
                cfg.download_chunk_size = Some(parse_integer(value).with_context(context)?);
            }
            "upload_chunk_size" => {
                cfg.upload_chunk_size = Some(parse_integer(value).with_context(context)?);
            }
            "partial_suffix" => {
                cfg.partial_suffix = Some(parse_string(value).with_context(context)?);
            }
            "upload_content_type" => {
                cfg.upload_content_type = Some(parse_string(value).with_context(context)?);
            }
            "max_resource_restarts" => {
                cfg.max_resource_restarts = Some(parse_integer(value).with_context(context)?);
            }
            unknown => bail!("Unknown configuration key: '{unknown}' on line {line_no}"),
        }
    }
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string(raw: &str) -> Result<String> {
    raw.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Expected double-quoted string"))
}

fn parse_integer<T: TryFrom<u64>>(raw: &str) -> Result<T> {
    let value: u64 = raw
        .parse()
        .map_err(|_| anyhow!("Expected non-negative integer, got '{raw}'"))?;
    T::try_from(value).map_err(|_| anyhow!("Integer value {value} out of range"))
}

fn parse_timeout(raw: &str) -> Result<u64> {
    let value = parse_integer::<u64>(raw)?;
    if !(1..=3600).contains(&value) {
        bail!("Expected range: 1..=3600, got {value}");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_all_fields() {
        let cfg = parse_config_str(
            r#"
            # transfer defaults
            storage_root = "/data/downloads"
            state_db = "/data/state.db" # trailing comment
            connect_timeout_secs = 10
            read_timeout_secs = 600
            download_chunk_size = 8192
            upload_chunk_size = 1024
            partial_suffix = ".part"
            upload_content_type = "text/x-markdown"
            max_resource_restarts = 3
            "#,
        )
        .unwrap();

        assert_eq!(cfg.storage_root, Some(PathBuf::from("/data/downloads")));
        assert_eq!(cfg.state_db, Some(PathBuf::from("/data/state.db")));
        assert_eq!(cfg.connect_timeout_secs, Some(10));
        assert_eq!(cfg.read_timeout_secs, Some(600));
        assert_eq!(cfg.download_chunk_size, Some(8192));
        assert_eq!(cfg.upload_chunk_size, Some(1024));
        assert_eq!(cfg.partial_suffix.as_deref(), Some(".part"));
        assert_eq!(cfg.upload_content_type.as_deref(), Some("text/x-markdown"));
        assert_eq!(cfg.max_resource_restarts, Some(3));
    }

    #[test]
    fn test_parse_config_hash_inside_string_is_kept() {
        let cfg = parse_config_str(r#"storage_root = "/data/#1""#).unwrap();
        assert_eq!(cfg.storage_root, Some(PathBuf::from("/data/#1")));
    }

    #[test]
    fn test_parse_config_rejects_unknown_key() {
        let err = parse_config_str("concurrency = 4").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("storage_root").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_parse_config_rejects_bad_values() {
        assert!(parse_config_str("read_timeout_secs = 0").is_err());
        assert!(parse_config_str("connect_timeout_secs = -5").is_err());
        assert!(parse_config_str("partial_suffix = .part").is_err());
        assert!(parse_config_str("max_resource_restarts = 99999999999").is_err());
    }

    #[test]
    fn test_apply_to_overrides_only_present_values() {
        let cfg = FileConfig {
            read_timeout_secs: Some(42),
            partial_suffix: Some(".part".to_string()),
            ..FileConfig::default()
        };
        let mut config = TransferConfig::default();
        cfg.apply_to(&mut config);

        assert_eq!(config.read_timeout_secs, 42);
        assert_eq!(config.partial_suffix, ".part");
        assert_eq!(config.connect_timeout_secs, TransferConfig::default().connect_timeout_secs);
    }

    #[test]
    fn test_load_explicit_missing_file_is_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = load(Some(&temp_dir.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_explicit_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "upload_chunk_size = 512\n").unwrap();

        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.upload_chunk_size, Some(512));
    }
}
