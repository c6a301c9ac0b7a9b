use std::path::{Path, PathBuf};

use {secrecy::Secret, tracing::{debug, warn}};

use crate::{env_subst::substitute_env, schema::CourierConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "courier.toml",
    "courier.yaml",
    "courier.yml",
    "courier.json",
];

pub const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_SHEET_ID: &str = "GOOGLE_SHEET_ID";
pub const ENV_SHEET_TAB: &str = "SHEET_TAB_NAME";
pub const ENV_CREDENTIALS_BASE64: &str = "GOOGLE_CREDENTIALS_BASE64";
pub const ENV_CREDENTIALS_FILE: &str = "GOOGLE_CREDENTIALS_FILE";
pub const ENV_API_KEY: &str = "GOOGLE_SHEETS_API_KEY";
pub const ENV_SYNC_INTERVAL: &str = "COURIER_SYNC_INTERVAL_SECS";

/// A resolved configuration and the file it came from, if any.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: CourierConfig,
    pub path: Option<PathBuf>,
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<CourierConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
}

/// Resolve the effective configuration.
///
/// `explicit` wins over discovery. Without a file the defaults are used.
/// Environment overrides are applied last.
pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<LoadedConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    let config = match &path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(path)?
        },
        None => {
            debug!("no config file found, using defaults and environment");
            CourierConfig::default()
        },
    };

    Ok(LoadedConfig {
        config: apply_env_overrides(config),
        path,
    })
}

/// Find the first config file in standard locations.
///
/// Search order:
/// 1. `./courier.{toml,yaml,yml,json}`
/// 2. `~/.config/courier/courier.{toml,yaml,yml,json}`
pub fn find_config_file() -> Option<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    dirs.extend(config_dir());
    find_in_dirs(&dirs)
}

/// Returns the user-global config directory (`~/.config/courier/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "courier").map(|d| d.config_dir().to_path_buf())
}

fn find_in_dirs(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<CourierConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

/// Parse a config document into a generic tree, for field-level checks.
pub(crate) fn parse_config_value(raw: &str, path: &Path) -> anyhow::Result<serde_json::Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(serde_json::to_value(toml::from_str::<toml::Value>(raw)?)?),
        "yaml" | "yml" => Ok(serde_json::to_value(serde_yaml::from_str::<serde_yaml::Value>(raw)?)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

/// Overlay the documented environment variables onto `config`.
pub fn apply_env_overrides(config: CourierConfig) -> CourierConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

pub(crate) fn apply_env_overrides_with(
    mut config: CourierConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> CourierConfig {
    // Blank values count as unset.
    let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(token) = var(ENV_BOT_TOKEN) {
        config.telegram.token = Some(Secret::new(token));
    }
    if let Some(id) = var(ENV_SHEET_ID) {
        config.sheets.spreadsheet_id = id;
    }
    if let Some(tab) = var(ENV_SHEET_TAB) {
        config.sheets.tab = tab;
    }
    if let Some(encoded) = var(ENV_CREDENTIALS_BASE64) {
        config.sheets.credentials_base64 = Some(Secret::new(encoded));
    }
    if let Some(file) = var(ENV_CREDENTIALS_FILE) {
        config.sheets.credentials_file = Some(file);
    }
    if let Some(key) = var(ENV_API_KEY) {
        config.sheets.api_key = Some(Secret::new(key));
    }
    if let Some(raw) = var(ENV_SYNC_INTERVAL) {
        match raw.trim().parse::<u64>() {
            Ok(secs) => config.sync.interval_secs = secs,
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid {ENV_SYNC_INTERVAL}"),
        }
    }

    config
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use {super::*, secrecy::ExposeSecret};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn loads_each_format() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("courier.toml", "[sheets]\nspreadsheet_id = \"from-toml\"\n"),
            ("courier.yaml", "sheets:\n  spreadsheet_id: from-yaml\n"),
            ("courier.json", r#"{ "sheets": { "spreadsheet_id": "from-json" } }"#),
        ];

        for (name, body) in cases {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            let config = load_config(&path).unwrap();
            assert!(config.sheets.spreadsheet_id.starts_with("from-"), "{name}");
        }
    }

    #[test]
    fn unsupported_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.ini");
        std::fs::write(&path, "x=1").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"), "{err}");
    }

    #[test]
    fn type_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.toml");
        std::fs::write(&path, "[sync]\ninterval_secs = \"often\"\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("courier.toml"), "{err}");
    }

    #[test]
    fn discovery_prefers_earlier_directories_and_formats() {
        let local = tempfile::tempdir().unwrap();
        let global = tempfile::tempdir().unwrap();
        std::fs::write(global.path().join("courier.toml"), "").unwrap();
        std::fs::write(local.path().join("courier.yaml"), "").unwrap();
        std::fs::write(local.path().join("courier.json"), "{}").unwrap();

        let dirs = [local.path().to_path_buf(), global.path().to_path_buf()];
        assert_eq!(find_in_dirs(&dirs), Some(local.path().join("courier.yaml")));
        assert_eq!(find_in_dirs(&dirs[1..]), Some(global.path().join("courier.toml")));
    }

    #[test]
    fn discovery_finds_nothing_in_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_in_dirs(&[dir.path().to_path_buf()]), None);
    }

    #[test]
    fn resolve_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[sync]\nactive_status = \"live\"\n").unwrap();

        let loaded = resolve(Some(&path)).unwrap();
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.sync.active_status, "live");
    }

    #[test]
    fn resolve_fails_for_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = CourierConfig::default();
        config.sheets.spreadsheet_id = "from-file".into();

        let config = apply_env_overrides_with(
            config,
            env(&[
                (ENV_BOT_TOKEN, "123:abc"),
                (ENV_SHEET_ID, "from-env"),
                (ENV_SHEET_TAB, "Routes"),
                (ENV_CREDENTIALS_BASE64, "e30="),
                (ENV_CREDENTIALS_FILE, "/etc/courier/key.json"),
                (ENV_API_KEY, "k3y"),
                (ENV_SYNC_INTERVAL, "90"),
            ]),
        );

        assert_eq!(
            config.telegram.token.as_ref().map(|t| t.expose_secret().clone()),
            Some("123:abc".to_string())
        );
        assert_eq!(config.sheets.spreadsheet_id, "from-env");
        assert_eq!(config.sheets.tab, "Routes");
        assert!(config.sheets.credentials_base64.is_some());
        assert_eq!(
            config.sheets.credentials_file.as_deref(),
            Some("/etc/courier/key.json")
        );
        assert!(config.sheets.api_key.is_some());
        assert_eq!(config.sync.interval_secs, 90);
    }

    #[test]
    fn blank_and_invalid_env_values_are_ignored() {
        let config = apply_env_overrides_with(
            CourierConfig::default(),
            env(&[
                (ENV_SHEET_TAB, "  "),
                (ENV_SYNC_INTERVAL, "ten minutes"),
            ]),
        );

        assert_eq!(config.sheets.tab, "Research");
        assert_eq!(config.sync.interval_secs, 600);
    }
}
