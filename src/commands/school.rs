//! Commands for one class's server: the auto-updating daily routine.

use futures::future::BoxFuture;
use serenity::all::GuildId;
use tracing::{info, warn};

use super::FeatureModule;
use crate::announcer::AnnouncerError;
use crate::config::Config;
use crate::error::{CommandResult, Failure};
use crate::framework::{async_handler, Args, Category, Check, Command, Invocation};
use crate::Data;

const UNAVAILABLE: &str = "This command is unavailable for this guild.";

pub fn module(config: &Config) -> FeatureModule {
    let restriction = Check::GuildRestricted {
        guild_id: config.school_guild_id.map(GuildId::new),
        message: UNAVAILABLE.to_string(),
    };

    FeatureModule::new(
        "school",
        Category::new("School", "Commands for my class's discord server.").check(restriction),
        vec![Command::new("routine")
            .help("An auto updating daily routine of my class.")
            .subcommand(
                Command::new("start")
                    .help("Start the routine.")
                    .handler(async_handler!(start)),
            )
            .subcommand(
                Command::new("cancel")
                    .help("Cancel the routine.")
                    .handler(async_handler!(cancel)),
            )
            .subcommand(
                Command::new("restart")
                    .help("Restart the routine.")
                    .handler(async_handler!(restart)),
            )],
    )
    .on_load(resume)
    .on_unload(stop)
}

impl From<AnnouncerError> for Failure {
    fn from(err: AnnouncerError) -> Self {
        match err {
            AnnouncerError::Gateway(e) => Failure::Gateway(e),
            AnnouncerError::Storage(e) => Failure::Unclassified(e),
            other => Failure::bad_argument(other.to_string()),
        }
    }
}

/// Picks the routine back up if it was running before the last shutdown.
/// A routine that cannot be resumed leaves the module loaded.
fn resume(data: &Data) -> BoxFuture<'_, anyhow::Result<()>> {
    Box::pin(async move {
        match data.announcer.resume().await {
            Ok(Some(target)) => info!("School: routine resumed at {}", target.jump_url()),
            Ok(None) => info!("School: routine not running"),
            Err(e) => warn!("School: could not resume the routine: {}", e),
        }
        Ok(())
    })
}

fn stop(data: &Data) -> BoxFuture<'_, anyhow::Result<()>> {
    Box::pin(async move {
        data.announcer.shutdown().await;
        Ok(())
    })
}

async fn start(inv: &Invocation, _args: &Args) -> CommandResult {
    let target = inv
        .data
        .announcer
        .start(inv.guild_id(), inv.channel_id())
        .await?;
    info!("School: {} started the routine at {}", inv.author().name, target.jump_url());
    Ok(())
}

async fn cancel(inv: &Invocation, _args: &Args) -> CommandResult {
    inv.data.announcer.cancel().await?;
    Ok(())
}

async fn restart(inv: &Invocation, _args: &Args) -> CommandResult {
    inv.data.announcer.restart().await?;
    inv.say("Restarted the routine.").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serenity::all::{ChannelId, MessageId};

    use crate::announcer::{AnnouncerConfig, CANCELLED_NOTICE, CONFIG_NAME, STARTING_NOTICE};
    use crate::framework::dispatch;
    use crate::testing::{direct_message, harness, message, Call, Harness, CHANNEL, USER};

    fn seed(h: &Harness, config: AnnouncerConfig) {
        h.data.db.upsert_config(CONFIG_NAME, &config).unwrap();
    }

    fn routine() -> AnnouncerConfig {
        AnnouncerConfig {
            routine: vec![vec!["Math".into()]; 7],
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restricted_to_school_guild() {
        let h = harness();
        h.install("school");

        dispatch(h.data.clone(), direct_message(USER, "!routine start")).await;
        assert_eq!(
            h.gateway.sent_texts(),
            vec!["This command is unavailable for this guild."]
        );
        assert!(!h.data.announcer.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_points_at_running_message() {
        let h = harness();
        h.install("school");
        seed(&h, routine());

        dispatch(h.data.clone(), message(USER, "!routine start")).await;
        let target = h.data.announcer.target().await.unwrap();
        assert_eq!(target.channel_id, ChannelId::new(CHANNEL));

        dispatch(h.data.clone(), message(USER, "!routine start")).await;
        assert_eq!(
            h.gateway.sent_texts(),
            vec![
                STARTING_NOTICE.to_string(),
                format!("It's already running at:\n{}", target.jump_url())
            ]
        );
        h.data.announcer.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_restart_replies() {
        let h = harness();
        h.install("school");
        seed(&h, routine());

        dispatch(h.data.clone(), message(USER, "!routine restart")).await;
        assert_eq!(h.gateway.sent_texts(), vec!["The routine is not running."]);

        dispatch(h.data.clone(), message(USER, "!routine start")).await;
        dispatch(h.data.clone(), message(USER, "!routine restart")).await;
        assert_eq!(h.gateway.sent_texts().last().unwrap(), "Restarted the routine.");

        let target = h.data.announcer.target().await.unwrap();
        dispatch(h.data.clone(), message(USER, "!routine cancel")).await;
        assert!(!h.data.announcer.is_running().await);
        let cancelled = h.gateway.calls().into_iter().any(|c| match c {
            Call::Edit { message, reply, .. } => {
                message == target.message_id && reply.content.as_deref() == Some(CANCELLED_NOTICE)
            }
            _ => false,
        });
        assert!(cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_hook_resumes_stored_routine() {
        let h = harness();
        seed(
            &h,
            AnnouncerConfig {
                should_run: true,
                channel_id: Some(CHANNEL),
                message_id: Some(555),
                guild_id: Some(761),
                ..routine()
            },
        );

        crate::commands::load(&h.data, "school").await.unwrap();
        let target = h.data.announcer.target().await.unwrap();
        assert_eq!(target.message_id, MessageId::new(555));

        crate::commands::unload(&h.data, "school").await.unwrap();
        assert!(!h.data.announcer.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_without_routine_still_loads() {
        let h = harness();
        crate::commands::load(&h.data, "school").await.unwrap();
        assert!(h.data.registry.read().get("routine").is_some());
        assert!(!h.data.announcer.is_running().await);
    }
}
