//! Loyalteez Discord Gateway - Issue loyalty rewards from Discord interactions
//!
//! A stateless webhook for Discord's interaction endpoint. Slash commands and
//! button clicks are mapped to Loyalteez reward events and the outcome is
//! reported back to the user.
//!
//! # How it works
//!
//! 1. Discord POSTs an interaction signed with the application's ed25519 key
//! 2. The signature is checked before the body is parsed
//! 3. Pings are answered directly, commands go to a handler by name
//! 4. Handlers post a reward event to Loyalteez and reply with the result
//! 5. Drop-button clicks are acknowledged at once and completed in the
//!    background, editing the deferred reply when the ledger answers
//!
//! # Commands
//!
//! - `/join`, `/daily`, `/claim` issue rewards
//! - `/daily-config` binds a guild's `/daily` to an event id
//! - `/drop` posts a claim button
//! - `/balance`, `/help` are static
//!
//! Duplicate detection is left entirely to the ledger.

pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod followup;
pub mod interaction;
pub mod loyalteez;
pub mod server;
pub mod store;

pub use auth::{verify_signature, SignatureVerifier};
pub use commands::{RewardSettings, SlashCommand};
pub use config::Config;
pub use error::{GatewayError, RewardFailure};
pub use followup::FollowupClient;
pub use interaction::{ComponentAction, Interaction, InteractionResponse};
pub use loyalteez::{user_identity, RewardClient, RewardError, RewardEventResult};
pub use server::{create_router, run_server, serve, AppState};
pub use store::{ConfigStore, MemoryStore, SqliteStore};
