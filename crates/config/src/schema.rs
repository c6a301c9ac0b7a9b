//! Config schema types (telegram, sheets, sync).

use {secrecy::Secret, serde::Deserialize};

/// Default sheet tab holding the routing rows.
pub const DEFAULT_SHEET_TAB: &str = "Research";
/// Long-poll timeout passed to `getUpdates`.
pub const DEFAULT_POLL_TIMEOUT_SECS: u32 = 30;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub telegram: TelegramConfig,
    pub sheets: SheetsConfig,
    pub sync: SyncConfig,
}

/// Bot connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub token: Option<Secret<String>>,
    /// Long-polling timeout for `getUpdates`, in seconds.
    pub poll_timeout_secs: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
        }
    }
}

/// Where the routing rows live and how to authenticate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub tab: String,
    /// Service-account key JSON, base64 encoded.
    pub credentials_base64: Option<Secret<String>>,
    /// Path to a service-account key JSON file.
    pub credentials_file: Option<String>,
    /// API key; only usable when the sheet is readable by link.
    pub api_key: Option<Secret<String>>,
    /// Override for the Sheets API endpoint.
    pub api_base: Option<String>,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            tab: DEFAULT_SHEET_TAB.into(),
            credentials_base64: None,
            credentials_file: None,
            api_key: None,
            api_base: None,
        }
    }
}

impl SheetsConfig {
    /// Whether any form of credentials is configured.
    pub fn has_credentials(&self) -> bool {
        self.credentials_base64.is_some()
            || self.credentials_file.is_some()
            || self.api_key.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between sheet refreshes.
    pub interval_secs: u64,
    /// Status cell value (case-insensitive) that marks a row as live.
    pub active_status: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            active_status: "aktif".into(),
        }
    }
}
