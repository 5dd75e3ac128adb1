//! Command descriptors and the name/alias index used by the dispatcher.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use super::args::{ArgSpec, Args};
use super::checks::Check;
use super::context::Invocation;
use crate::error::CommandResult;
use crate::gateway::Reply;
use crate::ratelimit::{BucketScope, Cooldown};

pub type SyncHandler = fn(&Invocation, &Args) -> CommandResult<Reply>;
pub type AsyncHandler = for<'a> fn(&'a Invocation, &'a Args) -> BoxFuture<'a, CommandResult>;

/// A handler either computes a reply without I/O or drives the gateway itself.
#[derive(Clone, Copy)]
pub enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

/// Wraps an `async fn(&Invocation, &Args) -> CommandResult` as a [`Handler`].
macro_rules! async_handler {
    ($f:path) => {
        $crate::framework::Handler::Async(|inv, args| Box::pin($f(inv, args)))
    };
}
pub(crate) use async_handler;

pub struct Command {
    pub name: String,
    pub aliases: Vec<String>,
    /// Set when the command is registered.
    pub category: String,
    pub help: String,
    pub args: Vec<ArgSpec>,
    pub hidden: bool,
    pub checks: Vec<Check>,
    pub cooldown: Option<Cooldown>,
    pub handler: Option<Handler>,
    pub subcommands: Vec<Arc<Command>>,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            category: String::new(),
            help: String::new(),
            args: Vec::new(),
            hidden: false,
            checks: Vec::new(),
            cooldown: None,
            handler: None,
            subcommands: Vec::new(),
        }
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn help(mut self, help: &str) -> Self {
        self.help = help.trim().to_string();
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = ArgSpec>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn cooldown(mut self, rate: u32, per_secs: f64, scope: BucketScope) -> Self {
        self.cooldown = Some(Cooldown::new(rate, Duration::from_secs_f64(per_secs), scope));
        self
    }

    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn subcommand(mut self, command: Command) -> Self {
        self.subcommands.push(Arc::new(command));
        self
    }

    /// Name plus aliases, deduplicated, in declaration order.
    pub fn keys(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        std::iter::once(self.name.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .filter(|k| seen.insert(*k))
            .collect()
    }

    pub fn find_subcommand(&self, word: &str) -> Option<&Arc<Command>> {
        self.subcommands
            .iter()
            .find(|sub| sub.name == word || sub.aliases.iter().any(|a| a == word))
    }

    pub fn is_group(&self) -> bool {
        !self.subcommands.is_empty()
    }

    /// First paragraph of the help text.
    pub fn short_help(&self) -> &str {
        self.help.split("\n\n").next().unwrap_or("").trim()
    }

    /// Everything after the first paragraph.
    pub fn long_help(&self) -> Option<&str> {
        self.help
            .split_once("\n\n")
            .map(|(_, rest)| rest.trim())
            .filter(|rest| !rest.is_empty())
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("category", &self.category)
            .field("hidden", &self.hidden)
            .field("subcommands", &self.subcommands.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub name: String,
    pub description: String,
    pub checks: Vec<Check>,
    pub hidden: bool,
}

impl Category {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            checks: Vec::new(),
            hidden: false,
        }
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("The command or alias \"{alias}\" is already registered to \"{existing}\".")]
    DuplicateAlias { alias: String, existing: String },

    #[error("Invalid command name \"{0}\".")]
    InvalidName(String),

    #[error("Module '{0}' is already loaded.")]
    AlreadyLoaded(String),

    #[error("Module '{0}' has not been loaded.")]
    NotLoaded(String),
}

/// Outcome of matching a message against the registry.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Top-level command first, invoked (sub)command last.
    pub path: Vec<Arc<Command>>,
    pub category: Arc<Category>,
    pub invoked_with: String,
    /// Raw argument text after the command words.
    pub rest: String,
}

impl Resolved {
    pub fn command(&self) -> &Arc<Command> {
        // path always holds at least the top-level command
        &self.path[self.path.len() - 1]
    }

    pub fn qualified_name(&self) -> String {
        qualified_name(&self.path)
    }
}

pub fn qualified_name(path: &[Arc<Command>]) -> String {
    path.iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_first_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], &input[end..]),
        None => (input, ""),
    }
}

#[derive(Default)]
pub struct CommandRegistry {
    categories: Vec<Arc<Category>>,
    commands: Vec<Arc<Command>>,
    index: HashMap<String, Arc<Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a single command into `category`, creating the category if needed.
    /// Either every name and alias gets bound or none do.
    pub fn register(&mut self, category: &str, mut command: Command) -> Result<(), RegistryError> {
        self.validate(std::slice::from_ref(&command), None)?;
        if self.category(category).is_none() {
            self.categories
                .push(Arc::new(Category::new(category, "")));
        }
        command.category = category.to_string();
        self.insert(command);
        Ok(())
    }

    pub fn register_module(
        &mut self,
        category: Category,
        commands: Vec<Command>,
    ) -> Result<(), RegistryError> {
        if self.category(&category.name).is_some() {
            return Err(RegistryError::AlreadyLoaded(category.name));
        }
        self.validate(&commands, None)?;
        self.install(category, commands);
        Ok(())
    }

    pub fn unregister_module(&mut self, name: &str) -> Result<Arc<Category>, RegistryError> {
        let position = self
            .categories
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| RegistryError::NotLoaded(name.to_string()))?;
        let category = self.categories.remove(position);
        self.commands.retain(|c| c.category != name);
        self.index.retain(|_, c| c.category != name);
        Ok(category)
    }

    /// Swaps a loaded module for a fresh copy. On error the old one stays.
    pub fn reload_module(
        &mut self,
        category: Category,
        commands: Vec<Command>,
    ) -> Result<(), RegistryError> {
        if self.category(&category.name).is_none() {
            return Err(RegistryError::NotLoaded(category.name));
        }
        self.validate(&commands, Some(&category.name))?;
        self.unregister_module(&category.name)?;
        self.install(category, commands);
        Ok(())
    }

    pub fn resolve(&self, input: &str) -> Option<Resolved> {
        let (first, mut rest) = split_first_word(input);
        if first.is_empty() {
            return None;
        }
        let top = self.index.get(first)?.clone();
        let category = self.category(&top.category)?;

        let mut path = vec![top];
        loop {
            let current = &path[path.len() - 1];
            if !current.is_group() {
                break;
            }
            let (word, after) = split_first_word(rest);
            match current.find_subcommand(word) {
                Some(sub) => {
                    let sub = sub.clone();
                    path.push(sub);
                    rest = after;
                }
                None => break,
            }
        }

        Some(Resolved {
            path,
            category,
            invoked_with: first.to_string(),
            rest: rest.trim().to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        self.index.get(name).cloned()
    }

    pub fn category(&self, name: &str) -> Option<Arc<Category>> {
        self.categories.iter().find(|c| c.name == name).cloned()
    }

    pub fn categories(&self) -> &[Arc<Category>] {
        &self.categories
    }

    pub fn commands(&self) -> &[Arc<Command>] {
        &self.commands
    }

    pub fn commands_in(&self, category: &str) -> Vec<Arc<Command>> {
        self.commands
            .iter()
            .filter(|c| c.category == category)
            .cloned()
            .collect()
    }

    fn install(&mut self, category: Category, commands: Vec<Command>) {
        let name = category.name.clone();
        self.categories.push(Arc::new(category));
        for mut command in commands {
            command.category = name.clone();
            self.insert(command);
        }
    }

    fn insert(&mut self, command: Command) {
        let command = Arc::new(command);
        for key in command.keys() {
            self.index.insert(key.to_string(), command.clone());
        }
        self.commands.push(command);
    }

    /// Checks names for clashes with the index (ignoring `replacing`) and each other.
    fn validate(&self, commands: &[Command], replacing: Option<&str>) -> Result<(), RegistryError> {
        let mut pending: HashMap<&str, &str> = HashMap::new();
        for command in commands {
            validate_tree(command)?;
            for key in command.keys() {
                if let Some(existing) = self.index.get(key) {
                    if Some(existing.category.as_str()) != replacing {
                        return Err(RegistryError::DuplicateAlias {
                            alias: key.to_string(),
                            existing: existing.name.clone(),
                        });
                    }
                }
                if let Some(existing) = pending.insert(key, &command.name) {
                    return Err(RegistryError::DuplicateAlias {
                        alias: key.to_string(),
                        existing: existing.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn validate_tree(command: &Command) -> Result<(), RegistryError> {
    for key in command.keys() {
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(RegistryError::InvalidName(key.to_string()));
        }
    }

    let mut siblings: HashMap<&str, &str> = HashMap::new();
    for sub in &command.subcommands {
        validate_tree(sub)?;
        for key in sub.keys() {
            if let Some(existing) = siblings.insert(key, &sub.name) {
                return Err(RegistryError::DuplicateAlias {
                    alias: format!("{} {}", command.name, key),
                    existing: format!("{} {}", command.name, existing),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping(_: &Invocation, _: &Args) -> CommandResult<Reply> {
        Ok(Reply::text("pong"))
    }

    fn module(names: &[(&str, &[&str])]) -> Vec<Command> {
        names
            .iter()
            .map(|(name, aliases)| {
                Command::new(name)
                    .aliases(aliases)
                    .handler(Handler::Sync(ping))
            })
            .collect()
    }

    #[test]
    fn test_resolve_by_name_and_alias_is_idempotent() {
        let mut registry = CommandRegistry::new();
        registry
            .register_module(Category::new("Info", ""), module(&[("avatar", &["av", "pfp"])]))
            .unwrap();

        let first = registry.resolve("av  <@1>").unwrap();
        let second = registry.resolve("av  <@1>").unwrap();
        assert!(Arc::ptr_eq(first.command(), second.command()));
        assert!(Arc::ptr_eq(
            first.command(),
            &registry.resolve("avatar").unwrap().path[0]
        ));
        assert_eq!(first.invoked_with, "av");
        assert_eq!(first.rest, "<@1>");
        assert_eq!(first.category.name, "Info");
    }

    #[test]
    fn test_resolution_is_case_sensitive() {
        let mut registry = CommandRegistry::new();
        registry.register("Core", Command::new("ping")).unwrap();
        assert!(registry.resolve("ping").is_some());
        assert!(registry.resolve("PING").is_none());
        assert!(registry.resolve("   ").is_none());
    }

    #[test]
    fn test_duplicate_alias_rejects_whole_module() {
        let mut registry = CommandRegistry::new();
        registry
            .register_module(Category::new("Fun", ""), module(&[("cat", &["kitty"])]))
            .unwrap();

        let err = registry
            .register_module(
                Category::new("Utilities", ""),
                module(&[("translate", &["tr"]), ("pet", &["kitty"])]),
            )
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateAlias {
                alias: "kitty".into(),
                existing: "cat".into()
            }
        );
        // Nothing from the failed module was bound
        assert!(registry.get("translate").is_none());
        assert!(registry.get("tr").is_none());
        assert!(registry.category("Utilities").is_none());
        assert!(Arc::ptr_eq(
            &registry.get("kitty").unwrap(),
            &registry.get("cat").unwrap()
        ));
    }

    #[test]
    fn test_duplicates_inside_one_module_are_rejected() {
        let mut registry = CommandRegistry::new();
        let err = registry
            .register_module(
                Category::new("Mod", ""),
                module(&[("kick", &["k"]), ("kill", &["k"])]),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateAlias { .. }));
        assert!(registry.commands().is_empty());
    }

    #[test]
    fn test_subcommands_resolve_through_groups() {
        let group = Command::new("voice")
            .aliases(&["vc"])
            .subcommand(Command::new("mute").handler(Handler::Sync(ping)))
            .subcommand(Command::new("deafen").aliases(&["deaf"]).handler(Handler::Sync(ping)));
        let mut registry = CommandRegistry::new();
        registry.register("Mod", group).unwrap();

        let resolved = registry.resolve("vc deaf <@4> <@5>").unwrap();
        assert_eq!(resolved.qualified_name(), "voice deafen");
        assert_eq!(resolved.rest, "<@4> <@5>");

        // Unknown subcommand words stay as arguments of the group
        let resolved = registry.resolve("voice shout").unwrap();
        assert_eq!(resolved.qualified_name(), "voice");
        assert_eq!(resolved.rest, "shout");
    }

    #[test]
    fn test_unregister_and_reload() {
        let mut registry = CommandRegistry::new();
        registry
            .register_module(Category::new("Fun", ""), module(&[("cat", &[])]))
            .unwrap();
        registry
            .register_module(Category::new("Info", ""), module(&[("ping", &[])]))
            .unwrap();

        // A reload that clashes with another module keeps the old copy
        let err = registry
            .reload_module(Category::new("Fun", ""), module(&[("dog", &["ping"])]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateAlias { .. }));
        assert!(registry.get("cat").is_some());

        registry
            .reload_module(Category::new("Fun", ""), module(&[("cat", &[]), ("dog", &[])]))
            .unwrap();
        assert!(registry.get("dog").is_some());
        assert_eq!(registry.commands_in("Fun").len(), 2);

        registry.unregister_module("Fun").unwrap();
        assert!(registry.get("cat").is_none());
        assert_eq!(
            registry.unregister_module("Fun").unwrap_err(),
            RegistryError::NotLoaded("Fun".into())
        );
        assert_eq!(
            registry
                .register_module(Category::new("Info", ""), Vec::new())
                .unwrap_err(),
            RegistryError::AlreadyLoaded("Info".into())
        );
    }

    #[test]
    fn test_help_paragraphs() {
        let command = Command::new("purge").help("Delete messages.\n\nFlags:\n  -b  bots only");
        assert_eq!(command.short_help(), "Delete messages.");
        assert_eq!(command.long_help(), Some("Flags:\n  -b  bots only"));
        assert_eq!(Command::new("x").long_help(), None);
    }
}
