//! Deferred completion of button claims
//!
//! A drop-button click is acknowledged with a deferred ephemeral response.
//! The ledger call runs afterwards on a tracked background task, and its
//! outcome replaces the placeholder via Discord's "edit original response"
//! webhook. The follow-up token expires after 15 minutes; no expiry check is
//! made here, a late edit simply fails and is logged.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::Response;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::commands::claim_success_message;
use crate::error::reward_error_message;
use crate::loyalteez::{Metadata, RewardClient};

/// Lifetime of an interaction token
pub const FOLLOWUP_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Error)]
pub enum FollowupError {
    #[error("follow-up request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Discord rejected follow-up edit with {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Serialize)]
struct EditMessage<'a> {
    content: &'a str,
}

/// Edits deferred interaction responses
#[derive(Debug, Clone)]
pub struct FollowupClient {
    client: reqwest::Client,
    api_base: String,
    application_id: String,
}

impl FollowupClient {
    pub fn new(api_base: &str, application_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            application_id: application_id.into(),
        }
    }

    fn original_message_url(&self, token: &str) -> String {
        format!(
            "{}/webhooks/{}/{}/messages/@original",
            self.api_base, self.application_id, token
        )
    }

    /// PATCH the original (deferred) response with final content
    pub async fn edit_original(&self, token: &str, content: &str) -> Result<(), FollowupError> {
        let response = self
            .client
            .patch(self.original_message_url(token))
            .json(&EditMessage { content })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FollowupError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// A button claim waiting to be completed out of band
#[derive(Debug, Clone)]
pub struct DeferredClaim {
    pub event_type: String,
    pub user_identity: String,
    pub metadata: Metadata,
    pub token: String,
}

/// Build a response whose body reports when it has been handed to the
/// connection. `committed` fires once the payload chunk has been consumed;
/// it is dropped without firing if the response is abandoned first.
pub fn committed_json(
    status: StatusCode,
    payload: Vec<u8>,
    committed: oneshot::Sender<()>,
) -> Response {
    enum Stage {
        Payload(Bytes, oneshot::Sender<()>),
        Flushed(oneshot::Sender<()>),
    }

    let stream = futures::stream::unfold(
        Some(Stage::Payload(Bytes::from(payload), committed)),
        |stage: Option<Stage>| async move {
            match stage {
                Some(Stage::Payload(bytes, tx)) => {
                    Some((Ok::<_, Infallible>(bytes), Some(Stage::Flushed(tx))))
                }
                Some(Stage::Flushed(tx)) => {
                    let _ = tx.send(());
                    None
                }
                None => None,
            }
        },
    );

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

/// Spawn the completion task for a deferred claim.
///
/// The task waits for `committed` so the ledger is never called before
/// Discord has the acknowledgement, then issues exactly one event and one
/// follow-up edit. There is no cancellation.
pub fn spawn_claim_completion(
    tasks: &TaskTracker,
    rewards: Arc<RewardClient>,
    followups: Arc<FollowupClient>,
    claim: DeferredClaim,
    committed: oneshot::Receiver<()>,
) {
    tasks.spawn(async move {
        if committed.await.is_err() {
            warn!(
                "Deferred acknowledgement for {} was never sent; skipping claim",
                claim.event_type
            );
            return;
        }

        complete_claim(&rewards, &followups, claim).await;
    });
}

/// Run the ledger call and report its outcome to Discord
pub async fn complete_claim(
    rewards: &RewardClient,
    followups: &FollowupClient,
    claim: DeferredClaim,
) {
    let content = match rewards
        .send_event(&claim.event_type, &claim.user_identity, claim.metadata)
        .await
    {
        Ok(result) => {
            info!(
                "Button claim {} completed for {}",
                claim.event_type, claim.user_identity
            );
            claim_success_message(&result, &claim.event_type)
        }
        Err(e) => {
            warn!("Button claim {} failed: {}", claim.event_type, e);
            reward_error_message(&e)
        }
    };

    match followups.edit_original(&claim.token, &content).await {
        Ok(()) => debug!("Follow-up edited for {}", claim.event_type),
        // Nothing else to do: the user keeps the deferred placeholder
        Err(e) => error!("Failed to edit deferred response: {}", e),
    }
}
