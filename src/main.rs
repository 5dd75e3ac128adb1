use std::sync::Arc;
use std::time::Duration;

use poise::serenity_prelude as serenity;
use sneaky::clock::SystemClock;
use sneaky::config::Config;
use sneaky::db::Database;
use sneaky::escalation::GatewaySink;
use sneaky::framework::dispatch;
use sneaky::gateway::discord::{incoming_message, SerenityGateway};
use sneaky::gateway::Gateway;
use sneaky::{commands, Data, Error};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sneaky=info,warn")),
        )
        .init();

    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();
    info!("Loaded configuration: {:?}", config);

    let framework = poise::Framework::<Arc<Data>, Error>::builder()
        .options(poise::FrameworkOptions {
            event_handler: |_ctx, event, _framework, data| {
                Box::pin(async move {
                    if let serenity::FullEvent::Message { new_message } = event {
                        let data = data.clone();
                        let message = incoming_message(new_message);
                        tokio::spawn(async move {
                            let outcome = dispatch(data, message).await;
                            debug!("Dispatch: {:?}", outcome);
                        });
                    }
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot is ready as {}!", ready.user.name);
                ctx.set_activity(Some(serenity::ActivityData::playing(&config.status_message)));

                let gateway = Arc::new(SerenityGateway::new(
                    ctx.http.clone(),
                    ctx.cache.clone(),
                    Some(framework.shard_manager().clone()),
                    Duration::from_secs(config.gateway_timeout_secs),
                ));
                let db = Database::new(&config)?;
                db.execute_init()?;
                let sink = Arc::new(GatewaySink::new(gateway.clone(), &config));

                let data = Arc::new(Data::new(
                    config,
                    db,
                    gateway,
                    sink,
                    Arc::new(SystemClock),
                    ready.user.id,
                )?);
                commands::load_initial(&data).await?;

                let maintenance = data.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(PRUNE_INTERVAL);
                    loop {
                        interval.tick().await;
                        let pruned = maintenance.prune_cooldowns();
                        if pruned > 0 {
                            debug!("Maintenance: pruned {} idle cooldown buckets", pruned);
                        }
                    }
                });

                let on_signal = data.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Interrupt received, shutting down...");
                        on_signal.announcer.shutdown().await;
                        on_signal.gateway.shutdown().await;
                    }
                });

                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_VOICE_STATES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
