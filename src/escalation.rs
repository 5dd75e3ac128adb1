//! Delivery of unexpected failures to the bot operators.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{ChannelId, UserId};
use tracing::warn;

use crate::config::Config;
use crate::framework::EscalationReport;
use crate::gateway::{Embed, Gateway, Reply};

const DESCRIPTION_LIMIT: usize = 4000;
const ERROR_COLOUR: u32 = 0xe74c3c;

#[async_trait]
pub trait EscalationSink: Send + Sync {
    async fn deliver(&self, report: &EscalationReport) -> anyhow::Result<()>;
}

/// Posts reports to the log channel, or DMs every owner when none is set.
pub struct GatewaySink {
    gateway: Arc<dyn Gateway>,
    channel: Option<ChannelId>,
    owners: Vec<UserId>,
}

impl GatewaySink {
    pub fn new(gateway: Arc<dyn Gateway>, config: &Config) -> Self {
        Self {
            gateway,
            channel: config.log_channel_id.map(ChannelId::new),
            owners: config.owner_ids.iter().copied().map(UserId::new).collect(),
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{}...", cut)
}

pub fn report_embed(report: &EscalationReport) -> Embed {
    let location = match report.guild_id {
        Some(guild) => format!("Guild `{}` / <#{}>", guild, report.channel_id),
        None => format!("Direct message `{}`", report.channel_id),
    };
    Embed::new()
        .title(format!("Command `{}` failed", report.command))
        .description(format!(
            "```\n{}\n```",
            truncate(&report.detail, DESCRIPTION_LIMIT)
        ))
        .colour(ERROR_COLOUR)
        .field("Kind", report.kind, true)
        .field(
            "User",
            format!("{} (`{}`)", report.user_name, report.user_id),
            true,
        )
        .field("Where", location, false)
        .field("Message", truncate(&report.content, 1000), false)
        .timestamp(report.occurred_at)
}

#[async_trait]
impl EscalationSink for GatewaySink {
    async fn deliver(&self, report: &EscalationReport) -> anyhow::Result<()> {
        let reply = Reply::embed(report_embed(report));

        if let Some(channel) = self.channel {
            self.gateway.send(channel, reply).await?;
            return Ok(());
        }

        let mut delivered = false;
        for owner in &self.owners {
            match self.gateway.direct_message(*owner, reply.clone()).await {
                Ok(_) => delivered = true,
                Err(e) => warn!("Could not DM owner {} about a failure: {}", owner, e),
            }
        }
        if !delivered && !self.owners.is_empty() {
            anyhow::bail!("no owner could be reached");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use serenity::all::GuildId;

    use super::*;
    use crate::config::test_config;
    use crate::testing::{Call, MockGateway};

    fn report() -> EscalationReport {
        EscalationReport {
            command: "cat".into(),
            kind: "unclassified",
            detail: "boom".into(),
            user_id: UserId::new(10),
            user_name: "someone".into(),
            guild_id: Some(GuildId::new(20)),
            channel_id: ChannelId::new(30),
            content: "!cat".into(),
            occurred_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_report_embed_carries_context() {
        let embed = report_embed(&report());
        assert_eq!(embed.title.as_deref(), Some("Command `cat` failed"));
        assert_eq!(embed.field_value("User"), Some("someone (`10`)"));
        assert_eq!(embed.field_value("Where"), Some("Guild `20` / <#30>"));
        assert!(embed.description.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_posts_to_log_channel() {
        let gateway = Arc::new(MockGateway::new());
        let sink = GatewaySink::new(gateway.clone(), &test_config());
        sink.deliver(&report()).await.unwrap();

        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::Send { channel, .. } if *channel == ChannelId::new(900)));
    }

    #[tokio::test]
    async fn test_dms_owners_without_log_channel() {
        let gateway = Arc::new(MockGateway::new());
        let mut config = test_config();
        config.log_channel_id = None;
        config.owner_ids = vec![1, 2];
        let sink = GatewaySink::new(gateway.clone(), &config);
        sink.deliver(&report()).await.unwrap();

        let dms: Vec<UserId> = gateway
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DirectMessage { user, .. } => Some(user),
                _ => None,
            })
            .collect();
        assert_eq!(dms, vec![UserId::new(1), UserId::new(2)]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 10), "abcdef");
        assert_eq!(truncate("abcdefghijk", 6), "abc...");
    }
}
