use std::{fmt, time::Duration};

use {
    async_trait::async_trait,
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    serde_json::Value,
    tracing::debug,
};

use courier_routing::{
    RowSource, SheetRow,
    sync::{COLUMN_SOURCE, COLUMN_STATUS, COLUMN_TARGET, COLUMN_TOPIC, EXPECTED_COLUMNS},
};

use crate::{Error, Result, auth::ServiceAccountAuth};

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How requests to the Sheets API are authorized.
pub enum SheetsAuth {
    ServiceAccount(Box<ServiceAccountAuth>),
    /// API key; only works for sheets readable by link.
    ApiKey(Secret<String>),
}

impl fmt::Debug for SheetsAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccount(auth) => f
                .debug_tuple("ServiceAccount")
                .field(&auth.client_email())
                .finish(),
            Self::ApiKey(_) => f.debug_tuple("ApiKey").field(&"[REDACTED]").finish(),
        }
    }
}

/// Response body of `spreadsheets.values.get`.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Reads the routing tab of one spreadsheet.
#[derive(Debug)]
pub struct SheetsClient {
    http: Client,
    api_base: String,
    spreadsheet_id: String,
    tab: String,
    auth: SheetsAuth,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>, tab: impl Into<String>, auth: SheetsAuth) -> Self {
        Self::with_http(http_client(), spreadsheet_id, tab, auth)
    }

    pub fn with_http(
        http: Client,
        spreadsheet_id: impl Into<String>,
        tab: impl Into<String>,
        auth: SheetsAuth,
    ) -> Self {
        Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            tab: tab.into(),
            auth,
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn values_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.api_base.trim_end_matches('/'),
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(&self.tab),
        )
    }

    /// Fetch and parse every row of the tab.
    pub async fn fetch(&self) -> Result<Vec<SheetRow>> {
        let url = self.values_url();
        debug!(tab = %self.tab, "fetching routing sheet");

        let mut request = self
            .http
            .get(&url)
            .query(&[("majorDimension", "ROWS")]);
        request = match &self.auth {
            SheetsAuth::ApiKey(key) => request.query(&[("key", key.expose_secret().as_str())]),
            SheetsAuth::ServiceAccount(auth) => {
                let token = auth.access_token().await?;
                request.bearer_auth(token.expose_secret())
            },
        };

        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::message(format!(
                "sheets API returned HTTP {status}: {body}"
            )));
        }

        let range: ValueRange = resp.json().await?;
        let rows = parse_rows(&range.values)?;
        debug!(tab = %self.tab, rows = rows.len(), "routing sheet fetched");
        Ok(rows)
    }
}

#[async_trait]
impl RowSource for SheetsClient {
    async fn fetch_rows(&self) -> anyhow::Result<Vec<SheetRow>> {
        Ok(self.fetch().await?)
    }
}

fn http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Map a header row plus data rows onto [`SheetRow`]s.
///
/// Header names are matched after trimming; unrelated columns are ignored and
/// short rows are padded with empty cells. Fails when a required column is
/// absent.
pub fn parse_rows(values: &[Vec<Value>]) -> Result<Vec<SheetRow>> {
    let header: Vec<String> = values
        .first()
        .map(|row| row.iter().map(cell_text).collect())
        .unwrap_or_default();

    let position = |name: &str| header.iter().position(|cell| cell.trim() == name);
    let missing: Vec<String> = EXPECTED_COLUMNS
        .iter()
        .filter(|&&name| position(name).is_none())
        .map(|name| (*name).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingColumns { missing });
    }

    let [source, target, topic, status] =
        [COLUMN_SOURCE, COLUMN_TARGET, COLUMN_TOPIC, COLUMN_STATUS]
            .map(|name| position(name).unwrap_or_default());

    let cell = |row: &[Value], index: usize| row.get(index).map(cell_text).unwrap_or_default();

    Ok(values
        .iter()
        .skip(1)
        .map(|row| {
            let row = row.as_slice();
            SheetRow {
                source_channel: cell(row, source),
                target_group_id: cell(row, target),
                topic_id: cell(row, topic),
                status: cell(row, status),
            }
        })
        .collect())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
