pub mod announcer;
pub mod clock;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod escalation;
pub mod framework;
pub mod gateway;
pub mod ratelimit;
pub mod services;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serenity::all::UserId;

/// Bot-wide state shared by every invocation
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub apis: services::apis::ApiClient,
    pub gateway: Arc<dyn gateway::Gateway>,
    pub escalation: Arc<dyn escalation::EscalationSink>,
    pub clock: Arc<dyn clock::Clock>,
    /// Applies to every command, keyed by author.
    pub global_cooldown: ratelimit::RateLimiter<UserId>,
    pub registry: RwLock<framework::CommandRegistry>,
    pub announcer: announcer::Announcer,
    /// Bot's own user ID, accepted as a mention prefix
    pub bot_id: UserId,
    pub started_at: DateTime<Utc>,
}

impl Data {
    pub fn new(
        config: config::Config,
        db: db::Database,
        gateway: Arc<dyn gateway::Gateway>,
        escalation: Arc<dyn escalation::EscalationSink>,
        clock: Arc<dyn clock::Clock>,
        bot_id: UserId,
    ) -> anyhow::Result<Self> {
        let apis = services::apis::ApiClient::new(Duration::from_secs(config.http_timeout_secs))?;
        let global_cooldown = ratelimit::RateLimiter::new(
            config.global_cooldown_rate,
            Duration::try_from_secs_f64(config.global_cooldown_per_secs)
                .map_err(|e| anyhow::anyhow!("Invalid global cooldown window: {}", e))?,
        );
        let announcer = announcer::Announcer::new(
            gateway.clone(),
            db.clone(),
            announcer::AnnouncerSettings::from_config(&config),
        );

        Ok(Self {
            config,
            db,
            apis,
            gateway,
            escalation,
            clock,
            global_cooldown,
            registry: RwLock::new(framework::CommandRegistry::new()),
            announcer,
            bot_id,
            started_at: Utc::now(),
        })
    }

    /// Drops idle buckets from the global limiter and every command cooldown.
    pub fn prune_cooldowns(&self) -> usize {
        let now = self.clock.now();
        let commands: Vec<Arc<framework::Command>> = self.registry.read().commands().to_vec();

        let mut pruned = self.global_cooldown.prune(now);
        let mut stack = commands;
        while let Some(command) = stack.pop() {
            if let Some(cooldown) = &command.cooldown {
                pruned += cooldown.prune(now);
            }
            stack.extend(command.subcommands.iter().cloned());
        }
        pruned
    }
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::framework::dispatch;
    use crate::testing::{harness, message, USER};

    #[tokio::test]
    async fn test_prune_cooldowns_drops_idle_buckets() {
        let h = harness();
        h.install("info");

        dispatch(h.data.clone(), message(USER, "!hello")).await;
        assert_eq!(h.data.prune_cooldowns(), 0);
        assert_eq!(h.data.global_cooldown.len(), 1);

        h.clock.advance(Duration::from_secs(7));
        assert_eq!(h.data.prune_cooldowns(), 1);
        assert!(h.data.global_cooldown.is_empty());
    }
}
