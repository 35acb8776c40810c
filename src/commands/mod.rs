pub mod admin;
pub mod chat;
pub mod loan;
pub mod user;
pub mod utility;

use poise::serenity_prelude as serenity;
use tracing::{debug, warn};

use crate::components::ButtonAction;
use crate::config::BotConfig;
use crate::{Context, Data, Error};

pub const GENERIC_FAILURE: &str = "เกิดข้อผิดพลาด กรุณาลองใหม่อีกครั้ง";
pub const NO_PERMISSION: &str = "คุณไม่มีสิทธิ์ใช้คำสั่งนี้";

/// Check if user is an admin (listed in ADMIN_USER_IDS, bot owner, has admin role, or has ADMINISTRATOR permission)
pub async fn is_admin(ctx: Context<'_>) -> Result<bool, Error> {
    let user_id = ctx.author().id;
    let config = &ctx.data().config;

    if config.is_listed_admin(user_id.get()) {
        return Ok(true);
    }

    // Check if user is bot application owner
    if let Ok(app_info) = ctx.http().get_current_application_info().await {
        if let Some(owner) = &app_info.owner {
            if owner.id == user_id {
                return Ok(true);
            }
        }
    }

    // Check if we're in a guild (server)
    if let Some(guild_id) = ctx.guild_id() {
        if let Some(member) = ctx.author_member().await {
            if member.permissions.map_or(false, |perms| perms.administrator()) {
                return Ok(true);
            }

            if let Ok(guild) = guild_id.to_partial_guild(&ctx.http()).await {
                if has_admin_role(config, &guild.roles, &member.roles) {
                    return Ok(true);
                }
            }
        }
    }

    Ok(false)
}

/// Same check for the user behind a button click.
pub async fn is_component_admin(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    config: &BotConfig,
) -> bool {
    if config.is_listed_admin(component.user.id.get()) {
        return true;
    }

    let Some(member) = &component.member else {
        return false;
    };

    if member.permissions.map_or(false, |perms| perms.administrator()) {
        return true;
    }

    match member.guild_id.to_partial_guild(&ctx.http).await {
        Ok(guild) => has_admin_role(config, &guild.roles, &member.roles),
        Err(e) => {
            warn!("Failed to load guild {} for admin check: {}", member.guild_id, e);
            false
        }
    }
}

fn has_admin_role(
    config: &BotConfig,
    guild_roles: &std::collections::HashMap<serenity::RoleId, serenity::Role>,
    member_roles: &[serenity::RoleId],
) -> bool {
    member_roles.iter().any(|role_id| {
        guild_roles
            .get(role_id)
            .map_or(false, |role| role.name == config.admin_role_name)
    })
}

pub async fn reply_ephemeral(ctx: Context<'_>, text: impl Into<String>) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}

/// Direct-messages every listed admin. Failures are logged and skipped.
pub async fn notify_admins(http: &serenity::Http, config: &BotConfig, text: &str) {
    notify_admins_except(http, config, text, None).await;
}

pub async fn notify_admins_except(
    http: &serenity::Http,
    config: &BotConfig,
    text: &str,
    skip: Option<serenity::UserId>,
) {
    for admin_id in &config.admin_user_ids {
        if *admin_id == 0 || Some(serenity::UserId::new(*admin_id)) == skip {
            continue;
        }
        send_dm(http, serenity::UserId::new(*admin_id), text).await;
    }
}

pub async fn send_dm(http: &serenity::Http, user_id: serenity::UserId, text: &str) {
    if let Err(e) = user_id
        .direct_message(http, serenity::CreateMessage::new().content(text))
        .await
    {
        warn!("Failed to DM {}: {}", user_id, e);
    }
}

/// Routes a button click to the feature that owns its custom id.
pub async fn handle_component(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    match ButtonAction::parse(&component.data.custom_id) {
        Some(ButtonAction::RequestLoan { offer_id }) => {
            loan::handle_loan_click(ctx, component, data, &offer_id).await
        }
        Some(ButtonAction::ApproveRepayment { loan_id }) => {
            user::handle_repayment_approval(ctx, component, data, &loan_id).await
        }
        None => {
            debug!("Ignoring component with custom id {:?}", component.data.custom_id);
            Ok(())
        }
    }
}

// Re-export all commands
pub use admin::*;
pub use chat::ai;
pub use loan::loan;
pub use user::*;
pub use utility::*;
