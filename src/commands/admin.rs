use tracing::info;

use crate::config::Config;
use crate::error::CommandResult;
use crate::framework::{async_handler, ArgSpec, Args, Category, Check, Command, Invocation};

use super::{FeatureModule, ModuleError};

pub const SUCCESS: &str = "\u{2705}";

pub fn module(_config: &Config) -> FeatureModule {
    let target = || [ArgSpec::rest_required("module")];
    FeatureModule::new(
        "admin",
        Category::new("Admin", "Owner only commands for dynamic bot management.")
            .check(Check::OwnerOnly)
            .hidden(),
        vec![
            Command::new("load")
                .help("Loads a module.")
                .args(target())
                .handler(async_handler!(load)),
            Command::new("unload")
                .help("Unloads a module.")
                .args(target())
                .handler(async_handler!(unload)),
            Command::new("reload")
                .help("Reloads a module.")
                .args(target())
                .handler(async_handler!(reload)),
            Command::new("shutdown")
                .help("Stops the routine and disconnects.")
                .handler(async_handler!(shutdown)),
        ],
    )
}

/// Reacts on success, otherwise tells the owner what went wrong.
async fn report(inv: &Invocation, result: Result<(), ModuleError>) -> CommandResult {
    match result {
        Ok(()) => inv.react(SUCCESS).await,
        Err(e) => {
            inv.say(e.to_string()).await?;
            Ok(())
        }
    }
}

async fn load(inv: &Invocation, args: &Args) -> CommandResult {
    let result = super::load(&inv.data, args.require("module")?).await;
    report(inv, result).await
}

async fn unload(inv: &Invocation, args: &Args) -> CommandResult {
    let result = super::unload(&inv.data, args.require("module")?).await;
    report(inv, result).await
}

async fn reload(inv: &Invocation, args: &Args) -> CommandResult {
    let result = super::reload(&inv.data, args.require("module")?).await;
    report(inv, result).await
}

async fn shutdown(inv: &Invocation, _args: &Args) -> CommandResult {
    info!("Shutdown command received from owner: {}", inv.author().name);
    inv.say("\u{1f44b} Shutting down...").await?;
    inv.data.announcer.shutdown().await;
    inv.gateway().shutdown().await;
    Ok(())
}
