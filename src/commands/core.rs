//! Always-loaded module holding `help`.

use crate::config::Config;
use crate::error::CommandResult;
use crate::framework::dispatch::viewer_for;
use crate::framework::help::{render, HelpStyle};
use crate::framework::{async_handler, ArgSpec, Args, Category, Command, Invocation};
use crate::gateway::Reply;

use super::FeatureModule;

pub fn module(_config: &Config) -> FeatureModule {
    FeatureModule::new(
        super::CORE,
        Category::new("Core", "Help and error handling."),
        vec![Command::new("help")
            .help("Shows this message.")
            .args([ArgSpec::rest("query")])
            .hidden()
            .handler(async_handler!(help))],
    )
}

/// Only lists what the author could run here.
async fn help(inv: &Invocation, args: &Args) -> CommandResult {
    let data = &inv.data;
    let viewer = viewer_for(data, inv.author_id(), inv.guild_id(), true).await?;

    let page = render(&data.registry.read(), &viewer, args.get("query"));
    let style = HelpStyle {
        prefix: &inv.prefix,
        colour: data.config.colour,
        bot_description: &data.config.description,
    };
    inv.send(Reply::embed(style.to_embed(&page))).await?;
    Ok(())
}
