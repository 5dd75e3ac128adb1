//! Maps a command failure to exactly one action.
//!
//! `classify` performs no I/O; the dispatcher carries the action out.

use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, GuildId, UserId};

use crate::error::Failure;
use crate::gateway::GatewayError;

/// What the dispatcher knew when the failure happened.
#[derive(Debug, Clone)]
pub struct FailureContext {
    pub user_id: UserId,
    pub user_name: String,
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub command: String,
    pub content: String,
    pub is_owner: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Operator-facing record of an unexpected failure.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationReport {
    pub command: String,
    pub kind: &'static str,
    pub detail: String,
    pub user_id: UserId,
    pub user_name: String,
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Ignore,
    ReplyToUser(String),
    /// Re-run once with cooldowns bypassed.
    OwnerBypassRetry,
    Escalate(EscalationReport),
}

pub fn classify(failure: &Failure, ctx: &FailureContext) -> Action {
    match failure {
        Failure::NotFound(_) | Failure::CheckFailed => Action::Ignore,
        Failure::OnCooldown { .. } if ctx.is_owner => Action::OwnerBypassRetry,
        Failure::OnCooldown { .. }
        | Failure::GuildRestricted(_)
        | Failure::PermissionDenied(_)
        | Failure::BadArgument(_)
        | Failure::MissingArgument(_)
        | Failure::ExternalApi(_) => Action::ReplyToUser(failure.to_string()),
        Failure::Gateway(GatewayError::NotFound(msg) | GatewayError::Forbidden(msg)) => {
            Action::ReplyToUser(msg.clone())
        }
        Failure::Gateway(_) | Failure::Unclassified(_) => Action::Escalate(report(failure, ctx)),
    }
}

fn report(failure: &Failure, ctx: &FailureContext) -> EscalationReport {
    let detail = match failure {
        Failure::Unclassified(err) => format!("{:?}", err),
        other => other.to_string(),
    };
    EscalationReport {
        command: ctx.command.clone(),
        kind: failure.kind(),
        detail,
        user_id: ctx.user_id,
        user_name: ctx.user_name.clone(),
        guild_id: ctx.guild_id,
        channel_id: ctx.channel_id,
        content: ctx.content.clone(),
        occurred_at: ctx.occurred_at,
    }
}
