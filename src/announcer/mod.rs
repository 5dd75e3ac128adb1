//! Periodically re-renders the class routine into one pinned message.
//!
//! - `Stopped`: no task; persisted `should_run` may still be true (resume on startup)
//! - `Running`: one task editing the target message every interval
//!
//! Every transition holds the state lock, so commands racing each other are
//! applied one at a time.

pub mod render;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, Utc};
use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, GuildId, MessageId, UserId};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::gateway::{jump_url, Gateway, GatewayError, GatewayResult, Reply};
use render::{routine_embed, RenderContext};

/// Row name in the `cog_config` table.
pub const CONFIG_NAME: &str = "school";

pub const STARTING_NOTICE: &str = "Starting...";
pub const CANCELLED_NOTICE: &str = "Routine cancelled.";
pub const OFFLINE_NOTICE: &str = "Auto-updating cancelled. `Bot offline/module unloaded`";

/// Persisted routine document. `ROUTINE` holds one row per weekday, Monday first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnouncerConfig {
    #[serde(default)]
    pub should_run: bool,
    #[serde(default)]
    pub message_id: Option<u64>,
    #[serde(default)]
    pub channel_id: Option<u64>,
    #[serde(default)]
    pub guild_id: Option<u64>,
    #[serde(rename = "ROUTINE", default)]
    pub routine: Vec<Vec<String>>,
    #[serde(rename = "LINKS", default)]
    pub links: BTreeMap<String, String>,
}

impl AnnouncerConfig {
    fn target(&self) -> Option<Target> {
        Some(Target {
            guild_id: self.guild_id.map(GuildId::new),
            channel_id: ChannelId::new(self.channel_id.filter(|id| *id != 0)?),
            message_id: MessageId::new(self.message_id.filter(|id| *id != 0)?),
        })
    }
}

/// Operator-maintained routine table, as read from a TOML file:
///
/// ```toml
/// routine = [["Math", "Physics"], ...] # seven rows, Monday first
///
/// [links]
/// Math = "https://meet.example/math"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoutineTable {
    pub routine: Vec<Vec<String>>,
    #[serde(default)]
    pub links: BTreeMap<String, String>,
}

impl RoutineTable {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let table: RoutineTable = toml::from_str(text)?;
        if table.routine.len() != 7 {
            anyhow::bail!(
                "routine must have one row per weekday, found {} rows",
                table.routine.len()
            );
        }
        Ok(table)
    }

    /// Replaces the stored routine and links, keeping the running state.
    pub fn import(self, db: &Database) -> anyhow::Result<AnnouncerConfig> {
        let mut config = db
            .get_config::<AnnouncerConfig>(CONFIG_NAME)?
            .unwrap_or_default();
        config.routine = self.routine;
        config.links = self.links;
        db.upsert_config(CONFIG_NAME, &config)?;
        info!("Announcer: imported routine with {} links", config.links.len());
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

impl Target {
    pub fn jump_url(&self) -> String {
        jump_url(self.guild_id, self.channel_id, self.message_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnnouncerError {
    #[error("It's already running at:\n{0}")]
    AlreadyRunning(String),

    #[error("The routine is not running.")]
    NotRunning,

    #[error("No routine has been configured yet.")]
    NotConfigured,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct AnnouncerSettings {
    pub interval: Duration,
    pub colour: u32,
    pub creator_id: Option<UserId>,
}

impl AnnouncerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.announcer_interval,
            colour: config.colour,
            creator_id: config.creator_id.map(UserId::new),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    Restart,
    Shutdown,
}

struct Running {
    target: Target,
    stop: oneshot::Sender<StopReason>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    config: Option<AnnouncerConfig>,
    running: Option<Running>,
}

struct Shared {
    gateway: Arc<dyn Gateway>,
    db: Database,
    settings: AnnouncerSettings,
}

pub struct Announcer {
    shared: Arc<Shared>,
    state: Mutex<State>,
}

impl Announcer {
    pub fn new(gateway: Arc<dyn Gateway>, db: Database, settings: AnnouncerSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                gateway,
                db,
                settings,
            }),
            state: Mutex::new(State::default()),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running.is_some()
    }

    pub async fn target(&self) -> Option<Target> {
        self.state.lock().await.running.as_ref().map(|r| r.target)
    }

    /// Posts the target message in `channel` and starts updating it.
    pub async fn start(
        &self,
        guild: Option<GuildId>,
        channel: ChannelId,
    ) -> Result<Target, AnnouncerError> {
        let mut state = self.state.lock().await;
        if let Some(running) = &state.running {
            return Err(AnnouncerError::AlreadyRunning(running.target.jump_url()));
        }

        let mut config = match state.config.clone() {
            Some(config) => config,
            None => self.shared.load().await?.ok_or(AnnouncerError::NotConfigured)?,
        };

        let message = self
            .shared
            .gateway
            .send(channel, Reply::text(STARTING_NOTICE))
            .await?;
        config.should_run = true;
        config.guild_id = guild.map(|g| g.get());
        config.channel_id = Some(channel.get());
        config.message_id = Some(message.get());
        self.shared.persist(&config).await?;

        let target = Target {
            guild_id: guild,
            channel_id: channel,
            message_id: message,
        };
        info!("Routine started at {}", target.jump_url());
        state.running = Some(self.shared.spawn(config.clone(), target));
        state.config = Some(config);
        Ok(target)
    }

    /// Persists the routine as disabled and replaces the message with a notice.
    pub async fn cancel(&self) -> Result<(), AnnouncerError> {
        let mut state = self.state.lock().await;

        let config = match state.config.clone() {
            Some(config) => Some(config),
            None => self.shared.load().await?,
        };
        if let Some(mut config) = config {
            config.should_run = false;
            config.message_id = None;
            config.channel_id = None;
            self.shared.persist(&config).await?;
            state.config = Some(config);
        }

        match state.running.take() {
            Some(running) => {
                stop(running, StopReason::Cancelled).await;
                info!("Routine cancelled");
                Ok(())
            }
            None => Err(AnnouncerError::NotRunning),
        }
    }

    /// Stops the task and starts a fresh one on the same message.
    ///
    /// The stored routine is re-read first; if that fails the last known
    /// config is reused, and without one the current task keeps running.
    pub async fn restart(&self) -> Result<Target, AnnouncerError> {
        let mut state = self.state.lock().await;
        if state.running.is_none() {
            return Err(AnnouncerError::NotRunning);
        }

        let config = match self.shared.load().await {
            Ok(Some(config)) => config,
            Ok(None) => state.config.clone().unwrap_or_default(),
            Err(e) => match state.config.clone() {
                Some(config) => {
                    warn!("Could not reload routine, restarting with the last one: {}", e);
                    config
                }
                None => return Err(e.into()),
            },
        };
        let running = state.running.take().ok_or(AnnouncerError::NotRunning)?;
        let target = running.target;
        stop(running, StopReason::Restart).await;

        state.running = Some(self.shared.spawn(config.clone(), target));
        state.config = Some(config);
        info!("Routine restarted at {}", target.jump_url());
        Ok(target)
    }

    /// Picks up a routine that was running before the process restarted.
    ///
    /// Returns `Ok(None)` when nothing should run. A target message that can no
    /// longer be fetched leaves the announcer stopped.
    pub async fn resume(&self) -> Result<Option<Target>, AnnouncerError> {
        let mut state = self.state.lock().await;
        if let Some(running) = &state.running {
            return Ok(Some(running.target));
        }

        let config = self.shared.load().await?.ok_or(AnnouncerError::NotConfigured)?;
        state.config = Some(config.clone());
        if !config.should_run {
            return Ok(None);
        }
        let Some(target) = config.target() else {
            warn!("Routine marked as running but no target message is stored");
            return Ok(None);
        };

        if let Err(e) = self
            .shared
            .gateway
            .fetch_message(target.channel_id, target.message_id)
            .await
        {
            error!("Could not fetch routine message {}: {}", target.jump_url(), e);
            return Err(e.into());
        }

        info!("Resuming routine at {}", target.jump_url());
        state.running = Some(self.shared.spawn(config, target));
        Ok(Some(target))
    }

    /// Stops updating without touching the persisted state, so the next
    /// startup resumes.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(running) = state.running.take() {
            stop(running, StopReason::Shutdown).await;
            info!("Routine stopped for shutdown");
        }
    }
}

async fn stop(running: Running, reason: StopReason) {
    let _ = running.stop.send(reason);
    if let Err(e) = running.handle.await {
        warn!("Routine task ended abnormally: {}", e);
    }
}

impl Shared {
    async fn load(&self) -> anyhow::Result<Option<AnnouncerConfig>> {
        self.db
            .run_blocking(|db| db.get_config::<AnnouncerConfig>(CONFIG_NAME))
            .await
    }

    async fn persist(&self, config: &AnnouncerConfig) -> anyhow::Result<()> {
        let config = config.clone();
        self.db
            .run_blocking(move |db| db.upsert_config(CONFIG_NAME, &config))
            .await
    }

    fn spawn(self: &Arc<Self>, config: AnnouncerConfig, target: Target) -> Running {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(run_routine(self.clone(), config, target, rx));
        Running {
            target,
            stop: tx,
            handle,
        }
    }

    async fn render_context(&self, target: Target) -> RenderContext {
        let guild = match target.guild_id {
            Some(guild) => self.gateway.guild(guild).await.ok(),
            None => None,
        };
        let creator = match self.settings.creator_id {
            Some(id) => self.gateway.user(id).await.ok(),
            None => None,
        };
        let now = Local::now();

        RenderContext {
            colour: self.settings.colour,
            weekday: now.weekday(),
            now: now.with_timezone(&Utc),
            guild_name: guild.as_ref().map(|g| g.name.clone()),
            guild_icon: guild.and_then(|g| g.icon_url),
            creator_name: creator.as_ref().map(|u| u.name.clone()),
            creator_avatar: creator.map(|u| u.avatar_url),
        }
    }

    async fn tick(&self, config: &AnnouncerConfig, target: Target) -> GatewayResult<()> {
        let ctx = self.render_context(target).await;
        let embed = routine_embed(config, &ctx);
        self.gateway
            .edit(target.channel_id, target.message_id, Reply::embed(embed))
            .await
    }

    async fn finish(&self, target: Target, reason: StopReason) {
        let notice = match reason {
            StopReason::Cancelled => CANCELLED_NOTICE,
            StopReason::Shutdown => OFFLINE_NOTICE,
            StopReason::Restart => return,
        };
        if let Err(e) = self
            .gateway
            .edit(target.channel_id, target.message_id, Reply::text(notice))
            .await
        {
            warn!("Could not post routine notice: {}", e);
        }
    }
}

async fn run_routine(
    shared: Arc<Shared>,
    config: AnnouncerConfig,
    target: Target,
    mut stop: oneshot::Receiver<StopReason>,
) {
    let mut ticker = tokio::time::interval(shared.settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            reason = &mut stop => {
                // A dropped sender means the announcer itself went away
                let reason = reason.unwrap_or(StopReason::Shutdown);
                shared.finish(target, reason).await;
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = shared.tick(&config, target).await {
                    warn!("Routine update failed, retrying next tick: {}", e);
                }
            }
        }
    }
}
