//! Feature modules: named bundles of commands that can be loaded,
//! unloaded and reloaded at runtime.

pub mod admin;
pub mod converters;
pub mod core;
pub mod fun;
pub mod info;
pub mod manage;
pub mod moderation;
pub mod school;
pub mod utilities;

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{CommandResult, Failure};
use crate::framework::args::split_words;
use crate::framework::{Category, Command, RegistryError};
use crate::gateway::{Author, Embed};
use crate::Data;

/// Runs after a module's commands are registered, or after they are removed.
pub type Hook = for<'a> fn(&'a Data) -> BoxFuture<'a, anyhow::Result<()>>;

pub struct FeatureModule {
    pub name: &'static str,
    pub category: Category,
    pub commands: Vec<Command>,
    pub on_load: Option<Hook>,
    pub on_unload: Option<Hook>,
}

impl FeatureModule {
    pub fn new(name: &'static str, category: Category, commands: Vec<Command>) -> Self {
        Self {
            name,
            category,
            commands,
            on_load: None,
            on_unload: None,
        }
    }

    pub fn on_load(mut self, hook: Hook) -> Self {
        self.on_load = Some(hook);
        self
    }

    pub fn on_unload(mut self, hook: Hook) -> Self {
        self.on_unload = Some(hook);
        self
    }
}

/// `01 January, 2024; 09:30 PM`
pub const TIME_FORMAT: &str = "%d %B, %Y; %I:%M %p";

/// Joins lines with newlines, dropping whole lines that would overflow `limit`.
pub fn join_within(lines: &[String], limit: usize) -> String {
    let mut out = String::new();
    for line in lines {
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + line.chars().count() > limit.saturating_sub(4) {
            out.push_str("\n...");
            break;
        }
        if extra == 1 {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}

/// `Requested by <name>` footer with the requester's avatar.
pub fn requested_by(embed: Embed, author: &Author) -> Embed {
    embed.footer(
        format!("Requested by {}", author.name),
        Some(author.avatar_url.clone()),
    )
}

/// Splits flag text into tokens, rewriting multi-letter short flags
/// (`-em`) to their long form so clap can parse them.
pub fn flag_tokens(raw: &str, aliases: &[(&str, &str)]) -> CommandResult<Vec<String>> {
    let tokens = split_words(raw)?
        .into_iter()
        .map(|token| {
            aliases
                .iter()
                .find(|(short, _)| *short == token)
                .map(|(_, long)| long.to_string())
                .unwrap_or(token)
        })
        .collect();
    Ok(tokens)
}

/// First line of a clap error, without the `error: ` prefix.
pub fn flag_error(err: clap::Error) -> Failure {
    let rendered = err.to_string();
    let line = rendered.lines().next().unwrap_or_default();
    Failure::bad_argument(line.trim_start_matches("error: ").to_string())
}

/// Always loaded first; a failure here aborts startup.
pub const CORE: &str = "core";

/// Loaded at startup after [`CORE`]. A failure is logged and skipped.
pub const INITIAL_MODULES: &[&str] = &["info", "admin", "mod", "manage", "fun", "school", "utilities"];

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("No module named '{0}'.")]
    Unknown(String),

    #[error("The core module cannot be unloaded.")]
    CoreLocked,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Module '{name}' failed to start: {source:#}")]
    Hook {
        name: &'static str,
        source: anyhow::Error,
    },
}

/// Builds a fresh copy of a module by name, case-insensitively.
pub fn build_module(name: &str, config: &Config) -> Option<FeatureModule> {
    let module = match name.trim().to_lowercase().as_str() {
        "core" => core::module(config),
        "admin" => admin::module(config),
        "info" => info::module(config),
        "mod" | "moderation" => moderation::module(config),
        "manage" => manage::module(config),
        "fun" => fun::module(config),
        "utilities" => utilities::module(config),
        "school" => school::module(config),
        _ => return None,
    };
    Some(module)
}

fn lookup(name: &str, config: &Config) -> Result<FeatureModule, ModuleError> {
    build_module(name, config).ok_or_else(|| ModuleError::Unknown(name.trim().to_string()))
}

async fn run_hook(data: &Data, name: &'static str, hook: Option<Hook>) -> Result<(), ModuleError> {
    match hook {
        Some(hook) => hook(data)
            .await
            .map_err(|source| ModuleError::Hook { name, source }),
        None => Ok(()),
    }
}

pub async fn load(data: &Data, name: &str) -> Result<(), ModuleError> {
    let module = lookup(name, &data.config)?;
    let category = module.category.name.clone();
    data.registry
        .write()
        .register_module(module.category, module.commands)?;

    if let Err(e) = run_hook(data, module.name, module.on_load).await {
        // Leave nothing half-loaded behind
        if let Err(unregister) = data.registry.write().unregister_module(&category) {
            warn!("Modules: could not roll back '{}': {}", module.name, unregister);
        }
        return Err(e);
    }
    info!("Modules: loaded '{}'", module.name);
    Ok(())
}

pub async fn unload(data: &Data, name: &str) -> Result<(), ModuleError> {
    let module = lookup(name, &data.config)?;
    if module.name == CORE {
        return Err(ModuleError::CoreLocked);
    }
    data.registry
        .write()
        .unregister_module(&module.category.name)?;
    run_hook(data, module.name, module.on_unload).await?;
    info!("Modules: unloaded '{}'", module.name);
    Ok(())
}

/// Swaps in a fresh copy, running the unload hook of the old copy and the
/// load hook of the new one.
pub async fn reload(data: &Data, name: &str) -> Result<(), ModuleError> {
    let module = lookup(name, &data.config)?;
    data.registry
        .write()
        .reload_module(module.category, module.commands)?;
    run_hook(data, module.name, module.on_unload).await?;
    run_hook(data, module.name, module.on_load).await?;
    info!("Modules: reloaded '{}'", module.name);
    Ok(())
}

/// Loads [`CORE`] and then every initial module.
pub async fn load_initial(data: &Data) -> anyhow::Result<()> {
    load(data, CORE).await?;
    for name in INITIAL_MODULES {
        if let Err(e) = load(data, name).await {
            warn!("Modules: failed to load '{}': {}", name, e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::testing::harness;

    #[test]
    fn test_every_module_builds_without_conflicts() {
        let config = test_config();
        let mut registry = crate::framework::CommandRegistry::new();
        for name in std::iter::once(&CORE).chain(INITIAL_MODULES) {
            let module = build_module(name, &config).unwrap();
            registry
                .register_module(module.category, module.commands)
                .unwrap();
        }
        assert_eq!(registry.categories().len(), 8);
        assert!(registry.resolve("tlto en hola").is_some());
        assert!(registry.resolve("vc mute <@5>").is_some());
    }

    #[test]
    fn test_join_within() {
        let lines: Vec<String> = (0..5).map(|i| format!("line{}", i)).collect();
        assert_eq!(join_within(&lines[..2], 100), "line0\nline1");
        assert_eq!(join_within(&lines, 20), "line0\nline1\n...");
    }

    #[test]
    fn test_flag_tokens() {
        let tokens = flag_tokens("-em -c \"two words\" -ro 3", &[("-em", "--embed"), ("-ro", "--reaction-over")])
            .unwrap();
        assert_eq!(tokens, vec!["--embed", "-c", "two words", "--reaction-over", "3"]);
    }

    #[test]
    fn test_unknown_module() {
        assert!(build_module("music", &test_config()).is_none());
        assert!(build_module(" Fun ", &test_config()).is_some());
    }

    #[tokio::test]
    async fn test_load_unload_reload() {
        let h = harness();
        load(&h.data, "fun").await.unwrap();
        assert!(h.data.registry.read().get("cats").is_some());

        assert!(matches!(
            load(&h.data, "fun").await,
            Err(ModuleError::Registry(RegistryError::AlreadyLoaded(_)))
        ));

        reload(&h.data, "fun").await.unwrap();
        unload(&h.data, "fun").await.unwrap();
        assert!(h.data.registry.read().get("cats").is_none());

        assert!(matches!(
            unload(&h.data, "fun").await,
            Err(ModuleError::Registry(RegistryError::NotLoaded(_)))
        ));
        assert!(matches!(unload(&h.data, "core").await, Err(ModuleError::CoreLocked)));
        assert_eq!(
            load(&h.data, "nope").await.unwrap_err().to_string(),
            "No module named 'nope'."
        );
    }
}
