use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

use crate::app::ports::{NotifierPort, SendReceipt};
use crate::config::SmsCredentials;
use crate::error::{PipelineError, Result, TransportError};

type HmacSha256 = Hmac<Sha256>;

/// SMS gateway client authenticating each request with an HMAC-SHA256 header.
pub struct SmsHttpNotifier {
    client: Client,
    endpoint: String,
    credentials: SmsCredentials,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: OutboundMessage<'a>,
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    to: &'a str,
    from: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    message_id: Option<String>,
    status_message: Option<String>,
}

impl SmsHttpNotifier {
    pub fn new(endpoint: impl Into<String>, credentials: SmsCredentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PipelineError::Http)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            credentials,
        })
    }

    fn authorization(&self) -> std::result::Result<String, TransportError> {
        let date = chrono::Utc::now().to_rfc3339();
        let salt = uuid::Uuid::new_v4().simple().to_string();
        let signature = sign(&self.credentials.api_secret, &date, &salt)?;
        Ok(format!(
            "HMAC-SHA256 apiKey={}, date={}, salt={}, signature={}",
            self.credentials.api_key, date, salt, signature
        ))
    }
}

/// Hex HMAC-SHA256 of `date || salt` keyed by the API secret.
pub fn sign(secret: &str, date: &str, salt: &str) -> std::result::Result<String, TransportError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TransportError::Permanent(format!("invalid signing key: {}", e)))?;
    mac.update(date.as_bytes());
    mac.update(salt.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// 5xx and 429 are worth retrying; other non-success codes are not.
pub fn classify_status(status: StatusCode, body: &str) -> TransportError {
    let detail = format!("{}: {}", status, body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        TransportError::Transient(detail)
    } else {
        TransportError::Permanent(detail)
    }
}

fn classify_request_error(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        TransportError::Transient(error.to_string())
    } else {
        TransportError::Permanent(error.to_string())
    }
}

#[async_trait]
impl NotifierPort for SmsHttpNotifier {
    async fn send(&self, to: &str, text: &str) -> std::result::Result<SendReceipt, TransportError> {
        let recipient = to.replace('-', "");
        let body = SendRequest {
            message: OutboundMessage {
                to: &recipient,
                from: &self.credentials.sender,
                text,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, self.authorization()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| classify_request_error(&e))?;
        if !status.is_success() {
            return Err(classify_status(status, &raw));
        }

        // Gateways differ in what they echo back; a 2xx is a send either way.
        let parsed: Option<SendResponse> = serde_json::from_str(&raw).ok();
        let receipt = match parsed {
            Some(r) => SendReceipt {
                message_id: r.message_id,
                diagnostic: r.status_message.unwrap_or_else(|| status.to_string()),
            },
            None => SendReceipt {
                message_id: None,
                diagnostic: status.to_string(),
            },
        };
        debug!("gateway accepted message to {}: {}", to, receipt.diagnostic);
        Ok(receipt)
    }
}
