//! Configuration validation.
//!
//! Flags unknown or misspelled fields in the config file, then checks the
//! resolved configuration (file plus environment) for settings the relay
//! cannot run without.

use std::path::{Path, PathBuf};

use crate::{
    loader::{
        ENV_API_KEY, ENV_BOT_TOKEN, ENV_CREDENTIALS_BASE64, ENV_CREDENTIALS_FILE, ENV_SHEET_ID,
        LoadedConfig, parse_config_value,
    },
    schema::CourierConfig,
};

/// Below this interval the Sheets read quota becomes a concern.
const MIN_RECOMMENDED_INTERVAL_SECS: u64 = 30;

/// Known fields per top-level section.
const KNOWN_FIELDS: &[(&str, &[&str])] = &[
    ("telegram", &["token", "poll_timeout_secs"]),
    (
        "sheets",
        &[
            "spreadsheet_id",
            "tab",
            "credentials_base64",
            "credentials_file",
            "api_key",
            "api_base",
        ],
    ),
    ("sync", &["interval_secs", "active_status"]),
];

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        })
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// "syntax", "unknown-field", "missing", "credentials", "sync"
    pub category: &'static str,
    /// Dotted path, e.g. "sheets.tab"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}] {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Validate a resolved configuration and the file it was read from.
#[must_use]
pub fn validate(loaded: &LoadedConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();

    match &loaded.path {
        Some(path) => check_file(path, &mut diagnostics),
        None => diagnostics.push(Diagnostic::new(
            Severity::Info,
            "file-ref",
            "",
            "no config file found; using defaults and environment",
        )),
    }
    diagnostics.extend(validate_config(&loaded.config));

    ValidationResult {
        diagnostics,
        config_path: loaded.path.clone(),
    }
}

/// Semantic checks on a resolved configuration.
#[must_use]
pub fn validate_config(config: &CourierConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.telegram.token.is_none() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing",
            "telegram.token",
            format!("bot token is not set (config or {ENV_BOT_TOKEN})"),
        ));
    }

    let sheets = &config.sheets;
    if sheets.spreadsheet_id.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing",
            "sheets.spreadsheet_id",
            format!("spreadsheet id is not set (config or {ENV_SHEET_ID})"),
        ));
    }
    if sheets.tab.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing",
            "sheets.tab",
            "sheet tab name is empty",
        ));
    }

    if !sheets.has_credentials() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "credentials",
            "sheets",
            format!(
                "no sheets credentials; set {ENV_CREDENTIALS_BASE64}, {ENV_CREDENTIALS_FILE} or \
                 {ENV_API_KEY}"
            ),
        ));
    }
    if sheets.credentials_base64.is_some() && sheets.credentials_file.is_some() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "credentials",
            "sheets.credentials_file",
            "ignored because credentials_base64 is also set",
        ));
    }
    let has_service_account =
        sheets.credentials_base64.is_some() || sheets.credentials_file.is_some();
    if has_service_account && sheets.api_key.is_some() {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "credentials",
            "sheets.api_key",
            "ignored because service-account credentials are set",
        ));
    }
    if sheets.credentials_base64.is_none()
        && let Some(file) = &sheets.credentials_file
        && !Path::new(file).is_file()
    {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "file-ref",
            "sheets.credentials_file",
            format!("file not found: {file}"),
        ));
    }

    if config.sync.interval_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "sync",
            "sync.interval_secs",
            "must be greater than zero",
        ));
    } else if config.sync.interval_secs < MIN_RECOMMENDED_INTERVAL_SECS {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "sync",
            "sync.interval_secs",
            format!(
                "refreshing every {}s may exhaust the Sheets read quota",
                config.sync.interval_secs
            ),
        ));
    }
    if config.sync.active_status.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "sync",
            "sync.active_status",
            "active status is empty; no row would ever be routed",
        ));
    }

    diagnostics
}

fn check_file(path: &Path, diagnostics: &mut Vec<Diagnostic>) {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read {}: {e}", path.display()),
            ));
            return;
        },
    };

    match parse_config_value(&raw, path) {
        Ok(value) => check_unknown_fields(&value, diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "syntax",
            "",
            format!("failed to parse {}: {e}", path.display()),
        )),
    }
}

/// Flag keys that do not exist in the schema, suggesting close matches.
fn check_unknown_fields(value: &serde_json::Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(root) = value.as_object() else {
        return;
    };
    let sections: Vec<&str> = KNOWN_FIELDS.iter().map(|(name, _)| *name).collect();

    for (key, child) in root {
        let Some((_, fields)) = KNOWN_FIELDS.iter().find(|(name, _)| name == key) else {
            diagnostics.push(unknown_field(key.clone(), key, &sections, "at top level "));
            continue;
        };
        let Some(table) = child.as_object() else {
            continue;
        };
        for field in table.keys() {
            if !fields.contains(&field.as_str()) {
                diagnostics.push(unknown_field(format!("{key}.{field}"), field, fields, ""));
            }
        }
    }
}

fn unknown_field(path: String, key: &str, known: &[&str], level: &str) -> Diagnostic {
    let message = match suggest(key, known, 3) {
        Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
        None => format!("unknown field {level}"),
    };
    Diagnostic::new(
        Severity::Error,
        "unknown-field",
        path,
        message.trim_end().to_string(),
    )
}

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&candidate| (candidate, levenshtein(needle, candidate)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(candidate, _)| candidate)
}
