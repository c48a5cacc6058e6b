//! Slash command handlers
//!
//! Each handler turns one invocation into an immediate interaction response.
//! Ledger failures go through [`reward_error_message`] and nowhere else.

use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{internal_error_message, reward_error_message};
use crate::interaction::{
    ActionRow, CommandData, ComponentAction, Interaction, InteractionResponse, User,
    MAX_BUTTON_LABEL_LEN, PERMISSION_ADMINISTRATOR, PERMISSION_MANAGE_GUILD,
};
use crate::loyalteez::{user_identity, Metadata, RewardClient, RewardError, RewardEventResult};
use crate::store::{bind_daily_event, resolve_daily_event, ConfigStore};

pub const OPTION_EVENT_TYPE: &str = "event_type";
pub const OPTION_LABEL: &str = "label";
pub const OPTION_DESCRIPTION: &str = "description";

const DEFAULT_DROP_LABEL: &str = "Claim Reward";
const DEFAULT_DROP_DESCRIPTION: &str = "A reward drop is live! Click the button below to claim it.";

pub const SOURCE_MANUAL_CLAIM: &str = "manual_claim";
pub const SOURCE_DROP_BUTTON: &str = "drop_button";

/// Event ids and behaviour switches the handlers need from configuration
#[derive(Debug, Clone)]
pub struct RewardSettings {
    pub join_event: String,
    /// Used by /daily when the guild has no binding
    pub default_daily_event: String,
    pub marketplace_url: String,
    pub enforce_admin: bool,
}

/// Shared collaborators for one invocation
pub struct CommandContext<'a> {
    pub rewards: &'a RewardClient,
    pub store: &'a dyn ConfigStore,
    pub settings: &'a RewardSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashCommand {
    Join,
    Daily,
    DailyConfig,
    Claim,
    Drop,
    Balance,
    Help,
}

impl SlashCommand {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "join" => Some(Self::Join),
            "daily" => Some(Self::Daily),
            "daily-config" => Some(Self::DailyConfig),
            "claim" => Some(Self::Claim),
            "drop" => Some(Self::Drop),
            "balance" => Some(Self::Balance),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    /// Commands meant for server managers only
    pub fn is_admin(self) -> bool {
        matches!(self, Self::DailyConfig | Self::Drop)
    }
}

/// Dispatch a slash command by name
pub async fn handle_command(
    ctx: &CommandContext<'_>,
    interaction: &Interaction,
    user: &User,
    data: &CommandData,
) -> InteractionResponse {
    let Some(command) = SlashCommand::from_name(&data.name) else {
        return InteractionResponse::message(format!("Unknown command: {}", data.name));
    };

    if ctx.settings.enforce_admin
        && command.is_admin()
        && !interaction.member_has_any(PERMISSION_ADMINISTRATOR | PERMISSION_MANAGE_GUILD)
    {
        info!("User {} denied /{}: missing permission", user.id, data.name);
        return InteractionResponse::ephemeral(format!(
            "❌ You need the Manage Server permission to use /{}.",
            data.name
        ));
    }

    let guild_id = interaction.guild_id.as_deref();

    match command {
        SlashCommand::Join => join(ctx, user, guild_id).await,
        SlashCommand::Daily => daily(ctx, user, guild_id).await,
        SlashCommand::DailyConfig => daily_config(ctx, guild_id, data).await,
        SlashCommand::Claim => claim(ctx, user, guild_id, data).await,
        SlashCommand::Drop => drop_reward(data),
        SlashCommand::Balance => balance(ctx.settings),
        SlashCommand::Help => help(),
    }
}

/// Context attached to every event: who, where, and optionally why
pub fn event_metadata(user: &User, guild_id: Option<&str>, source: Option<&str>) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("discord_id".to_string(), Value::from(user.id.as_str()));
    metadata.insert("username".to_string(), Value::from(user.username.as_str()));
    if let Some(guild_id) = guild_id {
        metadata.insert("server_id".to_string(), Value::from(guild_id));
    }
    if let Some(source) = source {
        metadata.insert("source".to_string(), Value::from(source));
    }
    metadata
}

/// Message shown after a successful /claim or drop button click
pub fn claim_success_message(result: &RewardEventResult, event_type: &str) -> String {
    format!(
        "✅ Reward claimed! You earned **{} LTZ** for `{}`.",
        result.amount().unwrap_or_else(|| "0".to_string()),
        event_type
    )
}

fn failure(command: &str, e: &RewardError) -> InteractionResponse {
    warn!("/{} failed: {}", command, e);
    InteractionResponse::message(reward_error_message(e))
}

async fn join(
    ctx: &CommandContext<'_>,
    user: &User,
    guild_id: Option<&str>,
) -> InteractionResponse {
    let metadata = event_metadata(user, guild_id, None);

    match ctx
        .rewards
        .send_event(&ctx.settings.join_event, &user_identity(&user.id), metadata)
        .await
    {
        Ok(result) => InteractionResponse::message(format!(
            "🎉 Welcome to the community, <@{}>! You've earned **{} LTZ** tokens! 🪙\nCheck your balance at [the marketplace]({})",
            user.id,
            result.amount().unwrap_or_else(|| "some".to_string()),
            ctx.settings.marketplace_url
        )),
        Err(e) => failure("join", &e),
    }
}

async fn daily(
    ctx: &CommandContext<'_>,
    user: &User,
    guild_id: Option<&str>,
) -> InteractionResponse {
    let event_type =
        match resolve_daily_event(ctx.store, guild_id, &ctx.settings.default_daily_event).await {
            Ok(event_type) => event_type,
            Err(e) => {
                error!("Failed to read daily binding: {}", e);
                return InteractionResponse::message(internal_error_message());
            }
        };

    let metadata = event_metadata(user, guild_id, None);

    match ctx
        .rewards
        .send_event(&event_type, &user_identity(&user.id), metadata)
        .await
    {
        Ok(result) => InteractionResponse::message(format!(
            "✅ Daily check-in complete! You earned **{} LTZ**.",
            result.amount().unwrap_or_else(|| "0".to_string())
        )),
        Err(e) => failure("daily", &e),
    }
}

async fn daily_config(
    ctx: &CommandContext<'_>,
    guild_id: Option<&str>,
    data: &CommandData,
) -> InteractionResponse {
    let Some(guild_id) = guild_id else {
        return InteractionResponse::ephemeral("❌ /daily-config can only be used inside a server.");
    };
    let Some(event_type) = data.string_option(OPTION_EVENT_TYPE) else {
        return InteractionResponse::ephemeral(
            "❌ Please provide an event ID: `/daily-config event_type:<id>`",
        );
    };

    match bind_daily_event(ctx.store, guild_id, &event_type).await {
        Ok(()) => InteractionResponse::ephemeral(format!(
            "✅ /daily in this server now rewards `{}`.",
            event_type
        )),
        Err(e) => {
            error!("Failed to store daily binding for guild {}: {}", guild_id, e);
            InteractionResponse::ephemeral(internal_error_message())
        }
    }
}

async fn claim(
    ctx: &CommandContext<'_>,
    user: &User,
    guild_id: Option<&str>,
    data: &CommandData,
) -> InteractionResponse {
    let Some(event_type) = data.string_option(OPTION_EVENT_TYPE) else {
        return InteractionResponse::ephemeral(
            "❌ Please provide an event ID: `/claim event_type:<id>`",
        );
    };

    let metadata = event_metadata(user, guild_id, Some(SOURCE_MANUAL_CLAIM));

    match ctx
        .rewards
        .send_event(&event_type, &user_identity(&user.id), metadata)
        .await
    {
        Ok(result) => InteractionResponse::message(claim_success_message(&result, &event_type)),
        Err(e) => failure("claim", &e),
    }
}

/// Post a claim button. Nothing is sent to the ledger until someone clicks it.
fn drop_reward(data: &CommandData) -> InteractionResponse {
    let Some(event_type) = data.string_option(OPTION_EVENT_TYPE) else {
        return InteractionResponse::ephemeral(
            "❌ Please provide an event ID: `/drop event_type:<id> [label] [description]`",
        );
    };

    // Discord counts both limits in characters
    let max_event_len = ComponentAction::max_claim_event_len();
    if event_type.chars().count() > max_event_len {
        return InteractionResponse::ephemeral(format!(
            "❌ Event ID is too long for a button (max {} characters).",
            max_event_len
        ));
    }

    let label = data
        .string_option(OPTION_LABEL)
        .unwrap_or_else(|| DEFAULT_DROP_LABEL.to_string());
    if label.chars().count() > MAX_BUTTON_LABEL_LEN {
        return InteractionResponse::ephemeral(format!(
            "❌ Button label is too long (max {} characters).",
            MAX_BUTTON_LABEL_LEN
        ));
    }

    let description = data
        .string_option(OPTION_DESCRIPTION)
        .unwrap_or_else(|| DEFAULT_DROP_DESCRIPTION.to_string());
    let custom_id = ComponentAction::Claim {
        event_type: event_type.clone(),
    }
    .custom_id();

    info!("Creating reward drop for {}", event_type);

    InteractionResponse::message(format!("🎁 **Reward Drop**\n{}", description))
        .with_components(vec![ActionRow::single_button(label, custom_id)])
}

fn balance(settings: &RewardSettings) -> InteractionResponse {
    // The ledger has no balance endpoint; point at the marketplace instead
    InteractionResponse::message(format!(
        "💰 To check your LTZ balance and redeem rewards, visit the [Loyalteez Marketplace]({}).",
        settings.marketplace_url
    ))
}

fn help() -> InteractionResponse {
    InteractionResponse::message(
        "**Loyalteez Bot Commands**\n\
         /join - Claim your welcome bonus\n\
         /daily - Claim your daily check-in reward\n\
         /claim `event_type` - Claim a reward by event ID\n\
         /balance - Check your token balance\n\
         /help - Show this message\n\
         \n\
         **Admin Commands**\n\
         /daily-config `event_type` - Set the event used by /daily in this server\n\
         /drop `event_type` [`label`] [`description`] - Post a claimable reward button",
    )
}
