//! Loyalteez API client
//!
//! Posts reward events to the Loyalteez manual-event endpoint. One POST per
//! call: no retries, no timeout override, the ledger decides duplicates.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fixed origin tag sent as `domain` and `metadata.platform`
pub const PLATFORM: &str = "discord";

/// Open key/value context attached to an event
pub type Metadata = Map<String, Value>;

/// Ledger identity for a Discord user.
///
/// Pure function of the user id, so the same user maps to the same ledger
/// account from every guild and command.
pub fn user_identity(discord_user_id: &str) -> String {
    format!("discord_{}@loyalteez.app", discord_user_id)
}

#[derive(Debug, Error)]
pub enum RewardError {
    #[error("Loyalteez Brand ID is not configured.")]
    MissingBrandId,
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("request to Loyalteez failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Payload for `POST /manual-event`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardEventRequest {
    pub brand_id: String,
    pub event_type: String,
    pub user_email: String,
    pub domain: String,
    pub metadata: Metadata,
}

impl RewardEventRequest {
    /// Build the payload. Caller metadata is merged in, but can never replace
    /// the platform tag; the timestamp is only stamped when the caller did not
    /// provide one.
    pub fn new(
        brand_id: &str,
        event_type: &str,
        user_identity: &str,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> Self {
        let mut merged = metadata;
        merged.insert("platform".to_string(), Value::from(PLATFORM));
        merged
            .entry("timestamp")
            .or_insert_with(|| Value::from(now.to_rfc3339_opts(SecondsFormat::Millis, true)));

        Self {
            brand_id: brand_id.to_string(),
            event_type: event_type.to_string(),
            user_email: user_identity.to_string(),
            domain: PLATFORM.to_string(),
            metadata: merged,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RewardAmount {
    Number(serde_json::Number),
    Text(String),
}

/// Successful ledger response
#[derive(Debug, Clone, Default)]
pub struct RewardEventResult {
    pub reward_amount: Option<RewardAmount>,
    pub extra: Map<String, Value>,
}

impl RewardEventResult {
    /// Read a 2xx body. The status already decided success, so a body of an
    /// unexpected shape only loses the amount.
    pub fn from_body(body: &str) -> Self {
        if body.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::from_value(value),
            Err(e) => {
                debug!("Ignoring unparsable Loyalteez success body: {}", e);
                Self::default()
            }
        }
    }

    pub fn from_value(value: Value) -> Self {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                debug!("Loyalteez success body is not an object: {}", other);
                return Self::default();
            }
        };

        let reward_amount = match fields.remove("rewardAmount") {
            Some(Value::Number(n)) => Some(RewardAmount::Number(n)),
            Some(Value::String(s)) => Some(RewardAmount::Text(s)),
            Some(Value::Null) | None => None,
            Some(other) => {
                debug!("Ignoring rewardAmount of unexpected shape: {}", other);
                None
            }
        };

        Self {
            reward_amount,
            extra: fields,
        }
    }

    /// Rendered amount, `None` when absent, blank or zero
    pub fn amount(&self) -> Option<String> {
        match self.reward_amount.as_ref()? {
            RewardAmount::Number(n) if n.as_f64() == Some(0.0) => None,
            RewardAmount::Number(n) => Some(n.to_string()),
            RewardAmount::Text(s) if s.trim().is_empty() => None,
            RewardAmount::Text(s) => Some(s.trim().to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
}

/// Loyalteez client bound to a single brand
#[derive(Debug, Clone)]
pub struct RewardClient {
    client: reqwest::Client,
    brand_id: String,
    endpoint: String,
}

impl RewardClient {
    /// Fails immediately when the brand id is empty, before any request is made
    pub fn new(brand_id: impl Into<String>, api_base: &str) -> Result<Self, RewardError> {
        let brand_id = brand_id.into();
        if brand_id.trim().is_empty() {
            return Err(RewardError::MissingBrandId);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            brand_id,
            endpoint: format!("{}/manual-event", api_base.trim_end_matches('/')),
        })
    }

    pub fn brand_id(&self) -> &str {
        &self.brand_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a reward event to Loyalteez
    pub async fn send_event(
        &self,
        event_type: &str,
        user_identity: &str,
        metadata: Metadata,
    ) -> Result<RewardEventResult, RewardError> {
        let payload =
            RewardEventRequest::new(&self.brand_id, event_type, user_identity, metadata, Utc::now());

        info!("Sending Loyalteez event: {} for {}", event_type, user_identity);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to send event to Loyalteez: {}", e);
                RewardError::Transport(e)
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| format!("API returned {}", status.as_u16()));
            warn!("Loyalteez API error {}: {}", status, message);
            return Err(RewardError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Loyalteez accepted {} ({} byte body)", event_type, body.len());
        Ok(RewardEventResult::from_body(&body))
    }
}
