//! The invocation handed to command handlers, with reply helpers bound to its channel.

use std::sync::Arc;

use serenity::all::{ChannelId, GuildId, MessageId, UserId};
use tracing::debug;

use super::registry::{Command, Resolved};
use crate::error::{CommandResult, Failure};
use crate::gateway::{jump_url, Author, Gateway, IncomingMessage, Reply};
use crate::Data;

/// Everything a handler knows about the message that invoked it.
pub struct Invocation {
    pub data: Arc<Data>,
    pub message: IncomingMessage,
    pub prefix: String,
    pub resolved: Resolved,
    /// Set for the owner's retry after a cooldown denial.
    pub bypass_cooldowns: bool,
}

impl Invocation {
    pub fn author(&self) -> &Author {
        &self.message.author
    }

    pub fn author_id(&self) -> UserId {
        self.message.author.id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.message.channel_id
    }

    pub fn guild_id(&self) -> Option<GuildId> {
        self.message.guild_id
    }

    /// Guild of the invocation; outside of guilds the command silently fails.
    pub fn require_guild(&self) -> CommandResult<GuildId> {
        self.message.guild_id.ok_or(Failure::CheckFailed)
    }

    pub fn command(&self) -> &Arc<Command> {
        self.resolved.command()
    }

    pub fn qualified_name(&self) -> String {
        self.resolved.qualified_name()
    }

    pub fn gateway(&self) -> &dyn Gateway {
        self.data.gateway.as_ref()
    }

    pub fn is_owner(&self) -> bool {
        self.data.config.is_owner(self.author_id().get())
    }

    pub fn colour(&self) -> u32 {
        self.data.config.colour
    }

    pub fn jump_url(&self) -> String {
        jump_url(self.guild_id(), self.channel_id(), self.message.id)
    }

    pub async fn send(&self, reply: Reply) -> CommandResult<MessageId> {
        let delete_after = reply.delete_after;
        let id = self.data.gateway.send(self.channel_id(), reply).await?;

        if let Some(after) = delete_after {
            let gateway = self.data.gateway.clone();
            let channel = self.channel_id();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                if let Err(e) = gateway.delete_message(channel, id).await {
                    debug!("Failed to delete temporary message {}: {}", id, e);
                }
            });
        }
        Ok(id)
    }

    pub async fn say(&self, text: impl Into<String>) -> CommandResult<MessageId> {
        self.send(Reply::text(text)).await
    }

    /// Reacts to the invoking message.
    pub async fn react(&self, emoji: &str) -> CommandResult {
        self.data
            .gateway
            .react(self.channel_id(), self.message.id, emoji)
            .await?;
        Ok(())
    }
}
