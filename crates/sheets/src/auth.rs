//! Service-account authentication (OAuth 2.0 JWT bearer grant, RFC 7523).

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use {
    base64::{
        Engine,
        engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    },
    reqwest::Client,
    ring::{
        rand::SystemRandom,
        signature::{RSA_PKCS1_SHA256, RsaKeyPair},
    },
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tokio::sync::Mutex,
    tracing::debug,
};

use crate::{Error, Result};

/// Read-only access to spreadsheets.
pub const SHEETS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account JSON key that token minting needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: Secret<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::external("invalid service account credentials", e))
    }

    /// Decode a base64-encoded JSON key, as commonly stored in environment
    /// variables. Embedded whitespace and line breaks are ignored.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|e| Error::external("service account credentials are not valid base64", e))?;
        let raw = String::from_utf8(bytes)
            .map_err(|e| Error::external("service account credentials are not UTF-8", e))?;
        Self::from_json(&raw)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: Secret<String>,
    refresh_at: Instant,
}

/// Mints and caches access tokens for a service account.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    signer: RsaKeyPair,
    rng: SystemRandom,
    http: Client,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, http: Client) -> Result<Self> {
        let der = pkcs8_der(key.private_key.expose_secret())?;
        let signer = RsaKeyPair::from_pkcs8(&der).map_err(|e| {
            Error::message(format!("service account private key rejected: {e}"))
        })?;
        Ok(Self {
            key,
            signer,
            rng: SystemRandom::new(),
            http,
            scope: SHEETS_READONLY_SCOPE.to_string(),
            cached: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// A valid access token, minting a new one when the cached token is
    /// missing or about to expire.
    pub async fn access_token(&self) -> Result<Secret<String>> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let token = self.request_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn request_token(&self) -> Result<CachedToken> {
        let assertion = self.signed_assertion(unix_now())?;
        debug!(client_email = %self.key.client_email, "requesting sheets access token");

        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::external("failed to reach token endpoint", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::message(format!(
                "token endpoint returned HTTP {status}: {body}"
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::external("invalid token response", e))?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS))
            .saturating_sub(EXPIRY_MARGIN);
        let now = Instant::now();
        Ok(CachedToken {
            value: Secret::new(token.access_token),
            // An absurd lifetime falls back to refreshing on the next call.
            refresh_at: now.checked_add(lifetime).unwrap_or(now),
        })
    }

    /// RS256-signed JWT assertion for the token endpoint.
    fn signed_assertion(&self, issued_at: u64) -> Result<String> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let claims = serde_json::json!({
            "iss": self.key.client_email,
            "scope": self.scope,
            "aud": self.key.token_uri,
            "iat": issued_at,
            "exp": issued_at + ASSERTION_LIFETIME_SECS,
        });
        let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{header}.{claims}");

        let mut signature = vec![0; self.signer.public().modulus_len()];
        self.signer
            .sign(
                &RSA_PKCS1_SHA256,
                &self.rng,
                signing_input.as_bytes(),
                &mut signature,
            )
            .map_err(|_| Error::message("failed to sign service account assertion"))?;

        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }
}

/// Extract the first PKCS#8 private key from a PEM document.
fn pkcs8_der(pem: &str) -> Result<Vec<u8>> {
    let mut reader = pem.as_bytes();
    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(rustls_pemfile::Item::Pkcs8Key(key))) => {
                return Ok(key.secret_pkcs8_der().to_vec());
            },
            Ok(Some(_)) => continue,
            Ok(None) => {
                return Err(Error::message(
                    "no PKCS#8 private key found in service account credentials",
                ));
            },
            Err(e) => return Err(Error::external("invalid private key PEM", e)),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
