//! Loyalteez Discord Gateway Server
//!
//! HTTP endpoint for Discord interactions.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth::{SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::commands::{
    event_metadata, handle_command, CommandContext, RewardSettings, SOURCE_DROP_BUTTON,
};
use crate::config::{Config, StoreBackend};
use crate::error::GatewayError;
use crate::followup::{
    committed_json, spawn_claim_completion, DeferredClaim, FollowupClient, FOLLOWUP_WINDOW,
};
use crate::interaction::{
    ComponentAction, ComponentData, Interaction, InteractionKind, InteractionResponse, User,
};
use crate::loyalteez::{user_identity, RewardClient};
use crate::store::{ConfigStore, MemoryStore, SqliteStore};

pub const LIVENESS_MESSAGE: &str = "Loyalteez Discord Bot is running";

pub struct AppState {
    pub verifier: SignatureVerifier,
    pub rewards: Arc<RewardClient>,
    pub followups: Arc<FollowupClient>,
    pub store: Arc<dyn ConfigStore>,
    pub settings: RewardSettings,
    /// Deferred completions still running
    pub tasks: TaskTracker,
    pub started_at: Instant,
}

impl AppState {
    /// Build state from a validated config. Fails closed on a bad key or brand.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;

        let store: Arc<dyn ConfigStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Sqlite => Arc::new(SqliteStore::new(&config.store.path)?),
        };

        Self::new(config, store)
    }

    /// Build state with an explicit store
    pub fn new(config: &Config, store: Arc<dyn ConfigStore>) -> anyhow::Result<Self> {
        let verifier = SignatureVerifier::from_hex(&config.discord.public_key)
            .context("Invalid Discord public key")?;
        let rewards =
            RewardClient::new(config.loyalteez.brand_id.clone(), &config.loyalteez.api_base)?;
        let followups =
            FollowupClient::new(&config.discord.api_base, config.discord.application_id.clone());

        Ok(Self {
            verifier,
            rewards: Arc::new(rewards),
            followups: Arc::new(followups),
            store,
            settings: config.reward_settings(),
            tasks: TaskTracker::new(),
            started_at: Instant::now(),
        })
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(interactions_handler).fallback(liveness_handler))
        .route("/health", get(health_handler))
        .fallback(liveness_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn liveness_handler() -> &'static str {
    LIVENESS_MESSAGE
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub uptime_secs: u64,
    pub version: String,
    pub pending_followups: usize,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        uptime_secs: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pending_followups: state.tasks.len(),
    })
}

// ============================================================================
// POST / - Discord interactions
// ============================================================================

async fn interactions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match route_interaction(&state, &headers, &body).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Rejected interaction: {}", e);
            e.into_response()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Verify, parse and dispatch one interaction
async fn route_interaction(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, GatewayError> {
    // Nothing in the body is looked at until the signature checks out
    if !state.verifier.verify(
        header_str(headers, SIGNATURE_HEADER),
        header_str(headers, TIMESTAMP_HEADER),
        body,
    ) {
        return Err(GatewayError::Unauthorized("Bad request signature"));
    }

    let interaction = Interaction::parse(body)?;
    debug!("Interaction {} of type {}", interaction.id, interaction.kind);

    match interaction.kind()? {
        InteractionKind::Ping => Ok(Json(InteractionResponse::pong()).into_response()),
        InteractionKind::Command(data) => {
            let user = interaction.invoker()?;
            let ctx = CommandContext {
                rewards: &state.rewards,
                store: state.store.as_ref(),
                settings: &state.settings,
            };
            let response = handle_command(&ctx, &interaction, user, &data).await;
            Ok(Json(response).into_response())
        }
        InteractionKind::Component(data) => {
            let user = interaction.invoker()?.clone();
            handle_component(state, &interaction, &user, &data)
        }
    }
}

fn handle_component(
    state: &AppState,
    interaction: &Interaction,
    user: &User,
    data: &ComponentData,
) -> Result<Response, GatewayError> {
    let action = match ComponentAction::parse(&data.custom_id) {
        Ok(action) => action,
        Err(e) => {
            info!("Ignoring component click: {}", e);
            let notice = InteractionResponse::ephemeral("Unknown interaction");
            return Ok(Json(notice).into_response());
        }
    };

    match action {
        ComponentAction::Claim { event_type } => {
            let claim = DeferredClaim {
                metadata: event_metadata(
                    user,
                    interaction.guild_id.as_deref(),
                    Some(SOURCE_DROP_BUTTON),
                ),
                event_type,
                user_identity: user_identity(&user.id),
                token: interaction.token.clone(),
            };

            let payload = serde_json::to_vec(&InteractionResponse::deferred_ephemeral())
                .map_err(|e| GatewayError::BadRequest(e.to_string()))?;
            let (committed_tx, committed_rx) = oneshot::channel();

            spawn_claim_completion(
                &state.tasks,
                state.rewards.clone(),
                state.followups.clone(),
                claim,
                committed_rx,
            );

            Ok(committed_json(StatusCode::OK, payload, committed_tx))
        }
    }
}

/// Run the server until Ctrl-C, then drain deferred completions
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);

    info!("Starting Loyalteez Discord gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve(listener, state, shutdown_signal()).await
}

/// Serve until `shutdown` resolves. In-flight requests finish, then deferred
/// completions get up to the follow-up window to send their edits.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let tasks = state.tasks.clone();
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tasks.close();
    if !tasks.is_empty() {
        info!("Waiting for {} deferred completions", tasks.len());
    }
    if tokio::time::timeout(FOLLOWUP_WINDOW, tasks.wait()).await.is_err() {
        warn!(
            "Follow-up window elapsed with {} completions still running",
            tasks.len()
        );
    }

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
