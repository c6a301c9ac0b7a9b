//! Configuration loading, env substitution, env overrides, and validation.
//!
//! Config files: `courier.toml`, `courier.yaml`, `courier.yml` or
//! `courier.json`, searched in `./` then `~/.config/courier/`.
//!
//! Supports `${ENV_VAR}` substitution in the raw file; the documented
//! environment variables (see [`loader`]) override file values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{LoadedConfig, apply_env_overrides, config_dir, find_config_file, load_config, resolve},
    schema::{
        CourierConfig, DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_SHEET_TAB, SheetsConfig, SyncConfig,
        TelegramConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_config},
};
