//! Webhook notification transport.
//!
//! Posts each notification as JSON to a configured endpoint. When a secret is
//! configured the body is signed with HMAC-SHA256 and the signature sent in
//! `X-Coach-Signature` as `sha256=<hex>`.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::debug;
use url::Url;

use coach_core::error::{CoachError, CoachResult, ErrorCode};
use coach_core::traits::{Notification, Notifier, NotifierConfig};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const SIGNATURE_HEADER: &str = "X-Coach-Signature";

/// Delivers notifications to an HTTP endpoint.
pub struct WebhookNotifier {
    client: Client,
    url: Url,
    secret: Option<SecretString>,
}

impl WebhookNotifier {
    pub fn new(config: NotifierConfig) -> CoachResult<Self> {
        let raw_url = config
            .url
            .or_else(|| std::env::var("COACH_WEBHOOK_URL").ok())
            .ok_or_else(|| {
                CoachError::Configuration(
                    "Webhook URL not found. Set COACH_WEBHOOK_URL or provide url in config.".to_string(),
                )
            })?;
        let url = Url::parse(&raw_url)
            .map_err(|e| CoachError::Configuration(format!("Invalid webhook URL '{}': {}", raw_url, e)))?;
        let secret = config
            .secret
            .or_else(|| std::env::var("COACH_WEBHOOK_SECRET").ok())
            .map(SecretString::new);

        let timeout = match config.timeout_secs {
            0 => DEFAULT_TIMEOUT_SECS,
            secs => secs,
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| CoachError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, url, secret })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn signature(&self, payload: &str) -> CoachResult<Option<String>> {
        self.secret
            .as_ref()
            .map(|secret| sign_payload(payload, secret.expose_secret()))
            .transpose()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notification: &Notification) -> CoachResult<()> {
        let payload = serde_json::to_string(notification)?;

        let mut request = self
            .client
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .header("X-Coach-Message", notification.message_id.as_str());
        if let Some(signature) = self.signature(&payload)? {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| CoachError::delivery(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            debug!(message_id = %notification.message_id, status = %status, "Webhook accepted notification");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        let code = if status.is_client_error() {
            ErrorCode::DlvRejected
        } else {
            ErrorCode::DlvTransportFailed
        };
        Err(CoachError::Delivery {
            message: format!("Webhook returned {}: {}", status, body),
            code,
            source: None,
        })
    }
}

/// `sha256=<hex>` HMAC of `payload` under `secret`.
pub fn sign_payload(payload: &str, secret: &str) -> CoachResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| CoachError::Configuration(format!("Invalid webhook secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check a signature produced by [`sign_payload`].
///
/// Receivers use this to authenticate deliveries.
pub fn verify_signature(payload: &str, secret: &str, signature: &str) -> bool {
    let Some(hex_sig) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(bytes) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload.as_bytes());
    mac.verify_slice(&bytes).is_ok()
}
