//! Message to command execution: prefix, resolution, gates, handler, failure routing.

use std::sync::Arc;

use chrono::Utc;
use serenity::all::{GuildId, UserId};
use tracing::{debug, error, info, warn};

use super::args::Args;
use super::checks::{evaluate_all, Viewer};
use super::classify::{classify, Action, EscalationReport, FailureContext};
use super::context::Invocation;
use super::registry::Handler;
use crate::error::{CommandResult, Failure};
use crate::gateway::IncomingMessage;
use crate::ratelimit::RateDecision;
use crate::Data;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not addressed to the bot or no such command.
    Skipped,
    Succeeded,
    Failed(Action),
}

/// Accepts the configured prefix or a mention of the bot.
pub fn strip_prefix<'a>(content: &'a str, prefix: &str, bot_id: UserId) -> Option<&'a str> {
    if let Some(rest) = content.strip_prefix(prefix) {
        return Some(rest);
    }
    [format!("<@{}>", bot_id), format!("<@!{}>", bot_id)]
        .iter()
        .find_map(|mention| content.strip_prefix(mention.as_str()))
}

pub async fn viewer_for(
    data: &Data,
    user: UserId,
    guild: Option<GuildId>,
    needs_permissions: bool,
) -> CommandResult<Viewer> {
    let permissions = match guild {
        Some(guild) if needs_permissions => Some(data.gateway.member_permissions(guild, user).await?),
        _ => None,
    };
    Ok(Viewer {
        user_id: user,
        guild_id: guild,
        is_owner: data.config.is_owner(user.get()),
        permissions,
    })
}

pub async fn dispatch(data: Arc<Data>, message: IncomingMessage) -> Outcome {
    if message.author.bot {
        return Outcome::Skipped;
    }
    let prefix = data.config.prefix.clone();
    let Some(rest) = strip_prefix(&message.content, &prefix, data.bot_id) else {
        return Outcome::Skipped;
    };

    let resolved = data.registry.read().resolve(rest);
    let Some(resolved) = resolved else {
        debug!("No command matches {:?}", rest);
        return Outcome::Skipped;
    };

    let mut inv = Invocation {
        data: data.clone(),
        message,
        prefix,
        resolved,
        bypass_cooldowns: false,
    };
    info!(
        command = %inv.qualified_name(),
        user = %inv.author_id(),
        guild = ?inv.guild_id(),
        "Invoking command"
    );

    let failure = match run(&inv).await {
        Ok(()) => return Outcome::Succeeded,
        Err(failure) => failure,
    };

    let action = classify(&failure, &failure_context(&inv));
    if action != Action::OwnerBypassRetry {
        return act(&inv, &failure, action).await;
    }

    info!("Owner {} bypassed the cooldown for {}", inv.author_id(), inv.qualified_name());
    inv.bypass_cooldowns = true;
    match run(&inv).await {
        Ok(()) => Outcome::Succeeded,
        Err(failure) => {
            let action = match classify(&failure, &failure_context(&inv)) {
                Action::OwnerBypassRetry => Action::ReplyToUser(failure.to_string()),
                action => action,
            };
            act(&inv, &failure, action).await
        }
    }
}

/// Gates the invocation and runs its handler.
async fn run(inv: &Invocation) -> CommandResult {
    let data = &inv.data;
    let now = data.clock.now();

    if !inv.bypass_cooldowns {
        if let RateDecision::Denied { retry_after } = data.global_cooldown.check(inv.author_id(), now) {
            return Err(Failure::OnCooldown { retry_after });
        }
    }

    let path = &inv.resolved.path;
    let checks = || {
        inv.resolved
            .category
            .checks
            .iter()
            .chain(path.iter().flat_map(|c| c.checks.iter()))
    };
    let needs_permissions = checks().any(|c| c.needs_permissions());
    let viewer = viewer_for(data, inv.author_id(), inv.guild_id(), needs_permissions).await?;
    evaluate_all(checks(), &viewer)?;

    if !inv.bypass_cooldowns {
        for command in path {
            if let Some(cooldown) = &command.cooldown {
                let decision = cooldown.check(inv.author_id(), inv.guild_id(), inv.channel_id(), now);
                if let RateDecision::Denied { retry_after } = decision {
                    return Err(Failure::OnCooldown { retry_after });
                }
            }
        }
    }

    let command = inv.command();
    match command.handler {
        None => {
            debug!("{} has no handler of its own", inv.qualified_name());
            Ok(())
        }
        Some(Handler::Sync(handler)) => {
            let args = Args::parse(&command.args, &inv.resolved.rest)?;
            let reply = handler(inv, &args)?;
            inv.send(reply).await?;
            Ok(())
        }
        Some(Handler::Async(handler)) => {
            let args = Args::parse(&command.args, &inv.resolved.rest)?;
            handler(inv, &args).await
        }
    }
}

fn failure_context(inv: &Invocation) -> FailureContext {
    FailureContext {
        user_id: inv.author_id(),
        user_name: inv.author().name.clone(),
        guild_id: inv.guild_id(),
        channel_id: inv.channel_id(),
        command: inv.qualified_name(),
        content: inv.message.content.clone(),
        is_owner: inv.is_owner(),
        occurred_at: Utc::now(),
    }
}

async fn act(inv: &Invocation, failure: &Failure, action: Action) -> Outcome {
    match &action {
        Action::Ignore => {
            debug!("Ignoring {} for {}", failure.kind(), inv.qualified_name());
        }
        Action::ReplyToUser(text) => {
            debug!("Replying to {} failure in {}", failure.kind(), inv.qualified_name());
            if let Err(e) = inv.say(text.clone()).await {
                warn!("Could not deliver error reply for {}: {}", inv.qualified_name(), e);
                let mut ctx = failure_context(inv);
                ctx.command = format!("{} (error reply)", ctx.command);
                if let Action::Escalate(report) = classify(&e, &ctx) {
                    escalate(inv, &report).await;
                }
            }
        }
        Action::OwnerBypassRetry => {}
        Action::Escalate(report) => {
            escalate(inv, report).await;
            let ack = format!(
                "Something went wrong while running `{}{}`. The owners have been notified.",
                inv.prefix,
                inv.qualified_name()
            );
            if let Err(e) = inv.say(ack).await {
                debug!("Could not acknowledge failure: {}", e);
            }
        }
    }
    Outcome::Failed(action)
}

async fn escalate(inv: &Invocation, report: &EscalationReport) {
    error!(
        command = %report.command,
        user = %report.user_id,
        guild = ?report.guild_id,
        channel = %report.channel_id,
        "Command failed: {}",
        report.detail
    );
    if let Err(e) = inv.data.escalation.deliver(report).await {
        error!("Failed to deliver escalation report: {:#}", e);
    }
}
