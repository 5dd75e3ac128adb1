//! Help pages, filtered to what the viewer could actually run.
//!
//! Visibility uses the same static checks as dispatch. Cooldowns are left
//! out: a command on cooldown is still a command the viewer can use.

use std::sync::Arc;

use super::args::signature;
use super::checks::{evaluate_all, Viewer};
use super::registry::{qualified_name, Category, Command, CommandRegistry};
use crate::gateway::Embed;

#[derive(Debug, Clone)]
pub enum HelpPage {
    Bot {
        categories: Vec<(Arc<Category>, Vec<Arc<Command>>)>,
    },
    Category {
        category: Arc<Category>,
        commands: Vec<Arc<Command>>,
    },
    Group {
        path: Vec<Arc<Command>>,
        subcommands: Vec<Arc<Command>>,
    },
    Command {
        path: Vec<Arc<Command>>,
    },
    NotFound(String),
}

fn visible(category: &Category, path: &[Arc<Command>], viewer: &Viewer) -> bool {
    if category.hidden || path.iter().any(|c| c.hidden) {
        return false;
    }
    let checks = category
        .checks
        .iter()
        .chain(path.iter().flat_map(|c| c.checks.iter()));
    evaluate_all(checks, viewer).is_ok()
}

fn visible_children(
    category: &Category,
    path: &[Arc<Command>],
    children: &[Arc<Command>],
    viewer: &Viewer,
) -> Vec<Arc<Command>> {
    let mut shown: Vec<Arc<Command>> = children
        .iter()
        .filter(|child| {
            let mut full = path.to_vec();
            full.push((*child).clone());
            visible(category, &full, viewer)
        })
        .cloned()
        .collect();
    shown.sort_by(|a, b| a.name.cmp(&b.name));
    shown
}

pub fn render(registry: &CommandRegistry, viewer: &Viewer, query: Option<&str>) -> HelpPage {
    let query = query.map(str::trim).filter(|q| !q.is_empty());
    let Some(query) = query else {
        let categories = registry
            .categories()
            .iter()
            .filter(|category| !category.hidden)
            .map(|category| {
                let commands = registry.commands_in(&category.name);
                let shown = visible_children(category, &[], &commands, viewer);
                (category.clone(), shown)
            })
            .filter(|(_, commands)| !commands.is_empty())
            .collect();
        return HelpPage::Bot { categories };
    };

    if let Some(category) = registry.category(query) {
        if !category.hidden && evaluate_all(category.checks.iter(), viewer).is_ok() {
            let commands = registry.commands_in(&category.name);
            let commands = visible_children(&category, &[], &commands, viewer);
            return HelpPage::Category { category, commands };
        }
    }

    let not_found = || HelpPage::NotFound(format!("No command called \"{}\" found.", query));
    let Some(resolved) = registry.resolve(query) else {
        return not_found();
    };
    if !visible(&resolved.category, &resolved.path, viewer) {
        return not_found();
    }

    let command = resolved.command();
    if !resolved.rest.is_empty() {
        let word = resolved.rest.split_whitespace().next().unwrap_or_default();
        let qualified = resolved.qualified_name();
        return if command.is_group() {
            HelpPage::NotFound(format!(
                "Command \"{}\" has no subcommand named {}",
                qualified, word
            ))
        } else {
            HelpPage::NotFound(format!("Command \"{}\" has no subcommands.", qualified))
        };
    }

    if command.is_group() {
        let subcommands =
            visible_children(&resolved.category, &resolved.path, &command.subcommands, viewer);
        HelpPage::Group {
            path: resolved.path,
            subcommands,
        }
    } else {
        HelpPage::Command {
            path: resolved.path,
        }
    }
}

fn usage(prefix: &str, path: &[Arc<Command>]) -> String {
    let Some(command) = path.last() else {
        return String::new();
    };
    format!(
        "{}{} {}",
        prefix,
        qualified_name(path),
        signature(&command.args)
    )
    .trim_end()
    .to_string()
}

fn short_or_default(command: &Command) -> String {
    match command.short_help() {
        "" => "No description.".to_string(),
        short => short.to_string(),
    }
}

/// Settings shared by every help page.
pub struct HelpStyle<'a> {
    pub prefix: &'a str,
    pub colour: u32,
    pub bot_description: &'a str,
}

impl HelpStyle<'_> {
    fn ending_note(&self) -> String {
        format!(
            "Type {p}help command for more info on a command.\nYou can also type {p}help category for more info on a category.",
            p = self.prefix
        )
    }

    pub fn to_embed(&self, page: &HelpPage) -> Embed {
        let embed = Embed::new().colour(self.colour);
        match page {
            HelpPage::Bot { categories } => {
                let mut embed = embed.title("Help").description(self.bot_description);
                for (category, commands) in categories {
                    let names: Vec<String> =
                        commands.iter().map(|c| format!("`{}`", c.name)).collect();
                    embed = embed.field(&category.name, names.join(", "), false);
                }
                embed.footer(self.ending_note(), None)
            }
            HelpPage::Category { category, commands } => {
                let mut embed = embed.title(format!("{} Commands", category.name));
                if !category.description.is_empty() {
                    embed = embed.description(&category.description);
                }
                for command in commands {
                    embed = embed.field(
                        usage(self.prefix, std::slice::from_ref(command)),
                        short_or_default(command),
                        false,
                    );
                }
                embed.footer(self.ending_note(), None)
            }
            HelpPage::Group { path, subcommands } => {
                let mut embed = embed.title(usage(self.prefix, path));
                if let Some(group) = path.last() {
                    if !group.help.is_empty() {
                        embed = embed.description(&group.help);
                    }
                }
                for sub in subcommands {
                    let mut full = path.clone();
                    full.push(sub.clone());
                    embed = embed.field(usage(self.prefix, &full), short_or_default(sub), false);
                }
                embed.footer(self.ending_note(), None)
            }
            HelpPage::Command { path } => {
                let mut embed = embed.title(usage(self.prefix, path));
                if let Some(command) = path.last() {
                    if !command.help.is_empty() {
                        embed = embed.description(&command.help);
                    }
                    if !command.aliases.is_empty() {
                        embed = embed.field("Aliases", command.aliases.join(", "), false);
                    }
                }
                embed
            }
            HelpPage::NotFound(message) => embed.description(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use serenity::all::{GuildId, Permissions, UserId};

    use super::*;
    use crate::framework::args::ArgSpec;
    use crate::framework::checks::Check;

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry
            .register_module(
                Category::new("Info", "Information commands"),
                vec![
                    Command::new("ping").help("Shows latency."),
                    Command::new("avatar")
                        .aliases(&["av"])
                        .help("Shows an avatar.\n\nDefaults to yours.")
                        .args([ArgSpec::optional("member")]),
                ],
            )
            .unwrap();
        registry
            .register_module(
                Category::new("Mod", "Moderation"),
                vec![
                    Command::new("kick")
                        .check(Check::Permissions(Permissions::KICK_MEMBERS))
                        .args([ArgSpec::required("member"), ArgSpec::rest("reason")]),
                    Command::new("voice")
                        .subcommand(
                            Command::new("mute")
                                .check(Check::Permissions(Permissions::MUTE_MEMBERS))
                                .help("Mute members."),
                        )
                        .subcommand(
                            Command::new("deafen")
                                .check(Check::Permissions(Permissions::DEAFEN_MEMBERS)),
                        ),
                ],
            )
            .unwrap();
        registry
            .register_module(
                Category::new("Admin", "").check(Check::OwnerOnly),
                vec![Command::new("shutdown").hidden()],
            )
            .unwrap();
        registry
    }

    fn viewer(perms: Permissions) -> Viewer {
        Viewer {
            user_id: UserId::new(5),
            guild_id: Some(GuildId::new(1)),
            is_owner: false,
            permissions: Some(perms),
        }
    }

    #[test]
    fn test_bot_listing_hides_unusable_commands() {
        let page = render(&registry(), &viewer(Permissions::empty()), None);
        let HelpPage::Bot { categories } = page else {
            panic!("expected bot page");
        };
        let names: Vec<(&str, Vec<&str>)> = categories
            .iter()
            .map(|(cat, cmds)| {
                (cat.name.as_str(), cmds.iter().map(|c| c.name.as_str()).collect())
            })
            .collect();
        // voice has no checks of its own, kick needs Kick Members, Admin is owner only
        assert_eq!(
            names,
            vec![("Info", vec!["avatar", "ping"]), ("Mod", vec!["voice"])]
        );
    }

    #[test]
    fn test_bot_listing_shows_permitted_commands() {
        let page = render(&registry(), &viewer(Permissions::KICK_MEMBERS), None);
        let embed = HelpStyle {
            prefix: "!",
            colour: 1,
            bot_description: "bot",
        }
        .to_embed(&page);
        assert_eq!(embed.field_value("Mod"), Some("`kick`, `voice`"));
        assert!(embed.field_value("Admin").is_none());
    }

    #[test]
    fn test_group_page_filters_subcommands() {
        let page = render(&registry(), &viewer(Permissions::MUTE_MEMBERS), Some("voice"));
        let HelpPage::Group { subcommands, .. } = &page else {
            panic!("expected group page");
        };
        assert_eq!(subcommands.len(), 1);
        let embed = HelpStyle {
            prefix: "!",
            colour: 1,
            bot_description: "",
        }
        .to_embed(&page);
        assert_eq!(embed.field_value("!voice mute"), Some("Mute members."));
    }

    #[test]
    fn test_command_page_uses_signature() {
        let page = render(&registry(), &viewer(Permissions::empty()), Some("av"));
        let embed = HelpStyle {
            prefix: "?",
            colour: 1,
            bot_description: "",
        }
        .to_embed(&page);
        assert_eq!(embed.title.as_deref(), Some("?avatar [member]"));
        assert_eq!(
            embed.description.as_deref(),
            Some("Shows an avatar.\n\nDefaults to yours.")
        );
        assert_eq!(embed.field_value("Aliases"), Some("av"));
    }

    #[test]
    fn test_category_page_uses_short_help() {
        let page = render(&registry(), &viewer(Permissions::empty()), Some("Info"));
        let embed = HelpStyle {
            prefix: "!",
            colour: 1,
            bot_description: "",
        }
        .to_embed(&page);
        assert_eq!(embed.title.as_deref(), Some("Info Commands"));
        assert_eq!(embed.field_value("!avatar [member]"), Some("Shows an avatar."));
    }

    #[test]
    fn test_hidden_and_forbidden_commands_are_not_found() {
        let registry = registry();
        let v = viewer(Permissions::empty());
        for query in ["shutdown", "kick", "Admin", "nothing"] {
            assert!(
                matches!(render(&registry, &v, Some(query)), HelpPage::NotFound(_)),
                "{} should not be found",
                query
            );
        }
        match render(&registry, &v, Some("voice yell")) {
            HelpPage::NotFound(msg) => {
                assert_eq!(msg, "Command \"voice\" has no subcommand named yell")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
