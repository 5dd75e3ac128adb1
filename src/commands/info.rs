use std::time::Duration;

use chrono::Utc;

use super::converters::{author, find_role, member_or_user};
use super::{join_within, FeatureModule, TIME_FORMAT};
use crate::config::{Config, DISCORD_FIELD_LIMIT};
use crate::error::{CommandResult, Failure};
use crate::framework::{async_handler, ArgSpec, Args, Category, Check, Command, Handler, Invocation};
use crate::gateway::{Embed, Reply};

const SOURCE: &str = "[sneaky source code](https://github.com/euphonicazure/SneakyNinja)";

pub fn module(_config: &Config) -> FeatureModule {
    FeatureModule::new(
        "info",
        Category::new("Info", "Discord information related commands.").check(Check::GuildOnly),
        vec![
            Command::new("hello")
                .aliases(&["hi"])
                .help("Greets you.")
                .handler(Handler::Sync(hello)),
            Command::new("avatar")
                .aliases(&["pfp"])
                .help(
                    "Shows user's avatar.\n\nProviding no argument shows own avatar. IDs can be \
                     provided for fetching users outside the guild.",
                )
                .args([ArgSpec::rest("user")])
                .handler(async_handler!(avatar)),
            Command::new("about")
                .help("About the Bot.")
                .handler(async_handler!(about)),
            Command::new("userinfo")
                .aliases(&["info", "whois"])
                .help(
                    "Show user's info.\n\nProviding no argument shows own info. IDs can be \
                     provided for fetching users outside the guild.",
                )
                .args([ArgSpec::rest("user")])
                .handler(async_handler!(userinfo)),
            Command::new("guildinfo")
                .aliases(&["serverinfo"])
                .help("Shows information regarding the server.")
                .handler(async_handler!(guildinfo)),
            Command::new("roles")
                .aliases(&["role"])
                .help("Shows all server role and some info about them.")
                .handler(async_handler!(roles))
                .subcommand(
                    Command::new("info")
                        .help(
                            "Shows detailed information about a specific role.\n\nProviding \
                             no argument shows own top role info.",
                        )
                        .args([ArgSpec::rest("role")])
                        .handler(async_handler!(role_info)),
                ),
        ],
    )
}

fn hello(_inv: &Invocation, _args: &Args) -> CommandResult<Reply> {
    Ok(Reply::text("Greetings."))
}

async fn target_user(inv: &Invocation, args: &Args) -> CommandResult<super::converters::ResolvedUser> {
    match args.get("user") {
        Some(raw) => member_or_user(inv, raw).await,
        None => author(inv).await,
    }
}

async fn avatar(inv: &Invocation, args: &Args) -> CommandResult {
    let target = target_user(inv, args).await?;
    let embed = Embed::new()
        .colour(target.colour())
        .author(target.user.name.clone(), None)
        .url(target.user.avatar_url.clone())
        .image(target.user.avatar_url.clone());
    inv.send(Reply::embed(embed)).await?;
    Ok(())
}

async fn about(inv: &Invocation, _args: &Args) -> CommandResult {
    let data = &inv.data;
    let bot = data.gateway.bot_profile().await?;
    let uptime = (Utc::now() - data.started_at).num_seconds().max(0) as u64;

    let mut embed = Embed::new()
        .title(bot.user.name.clone())
        .description(data.config.description.clone())
        .colour(data.config.colour)
        .timestamp(Utc::now())
        .thumbnail(bot.user.avatar_url.clone())
        .field(
            "Statistics",
            format!("members: {}\nguilds: {}", bot.members, bot.guilds),
            true,
        )
        .field("Created at", bot.user.created_at.format(TIME_FORMAT).to_string(), true)
        .field(
            "Uptime",
            humantime::format_duration(Duration::from_secs(uptime)).to_string(),
            true,
        )
        .field("Source", SOURCE, true)
        .footer(
            format!("sneaky {} | serenity", env!("CARGO_PKG_VERSION")),
            None,
        );

    if let Some(owner) = data.config.owner_ids.first() {
        if let Ok(owner) = data.gateway.user(serenity::all::UserId::new(*owner)).await {
            embed = embed.author(owner.name, Some(owner.avatar_url));
        }
    }
    inv.send(Reply::embed(embed)).await?;
    Ok(())
}

async fn userinfo(inv: &Invocation, args: &Args) -> CommandResult {
    let target = target_user(inv, args).await?;
    let member = target.member.as_ref();

    let nick = member
        .and_then(|m| m.nick.clone())
        .unwrap_or_else(|| "None".to_string());
    let joined = member
        .and_then(|m| m.joined_at)
        .map(|at| at.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| "None".to_string());
    let roles = member
        .map(|m| {
            m.roles
                .iter()
                .map(|r| format!("<@&{}>", r.id))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "None".to_string());

    let embed = Embed::new()
        .colour(target.colour())
        .author(target.user.name.clone(), None)
        .thumbnail(target.user.avatar_url.clone())
        .field("ID", target.user.id.to_string(), true)
        .field("nickname", nick, true)
        .field("Bot", target.user.bot.to_string(), true)
        .field(
            "Created on",
            target.user.created_at.format(TIME_FORMAT).to_string(),
            false,
        )
        .field("Joined on", joined, false)
        .field("Roles", roles, false);
    inv.send(Reply::embed(embed)).await?;
    Ok(())
}

async fn guildinfo(inv: &Invocation, _args: &Args) -> CommandResult {
    let guild_id = inv.require_guild()?;
    let guild = inv.gateway().guild(guild_id).await?;

    let mut embed = Embed::new()
        .colour(inv.colour())
        .author(guild.name.clone(), None)
        .field("ID", guild.id.to_string(), true)
        .field("Verification", guild.verification_level.clone(), true)
        .field("Members", guild.member_count.to_string(), true)
        .field("Created", guild.created_at.format(TIME_FORMAT).to_string(), true)
        .field(
            "Nitro",
            format!("lvl: {} & user: {}", guild.boost_tier, guild.boosts),
            true,
        )
        .field("Roles", guild.role_count.to_string(), true)
        .field(
            "Channels",
            format!(
                "{} text channels, {} voice channels & {} categories",
                guild.text_channels, guild.voice_channels, guild.categories
            ),
            false,
        );
    if let Some(description) = &guild.description {
        embed = embed.description(description.clone());
    }
    if let Some(icon) = &guild.icon_url {
        embed = embed.thumbnail(icon.clone());
    }
    if let Ok(owner) = inv.gateway().user(guild.owner_id).await {
        embed = embed.footer(format!("Owned by {}", owner.name), Some(owner.avatar_url));
    }
    inv.send(Reply::embed(embed)).await?;
    Ok(())
}

fn hex(colour: u32) -> String {
    format!("#{:06x}", colour)
}

async fn roles(inv: &Invocation, _args: &Args) -> CommandResult {
    let guild_id = inv.require_guild()?;
    let gateway = inv.gateway();
    let guild = gateway.guild(guild_id).await?;
    let roles = gateway.roles(guild_id).await?;

    let mut names = Vec::with_capacity(roles.len());
    let mut colours = Vec::with_capacity(roles.len());
    let mut mentionable = Vec::with_capacity(roles.len());
    for role in &roles {
        names.push(format!("<@&{}> ({})", role.id, role.member_count));
        colours.push(hex(role.colour));
        mentionable.push(role.mentionable.to_string());
    }

    let embed = Embed::new()
        .title(format!("Roles - {}", roles.len()))
        .colour(inv.colour())
        .author(guild.name, guild.icon_url)
        .field("name", join_within(&names, DISCORD_FIELD_LIMIT), true)
        .field("colour", join_within(&colours, DISCORD_FIELD_LIMIT), true)
        .field("mentionable", join_within(&mentionable, DISCORD_FIELD_LIMIT), true);
    inv.send(Reply::embed(embed)).await?;
    Ok(())
}

async fn role_info(inv: &Invocation, args: &Args) -> CommandResult {
    let guild_id = inv.require_guild()?;
    let gateway = inv.gateway();
    let guild = gateway.guild(guild_id).await?;

    let role = match args.get("role") {
        Some(raw) => {
            let roles = gateway.roles(guild_id).await?;
            find_role(&roles, raw)?.clone()
        }
        None => author(inv)
            .await?
            .member
            .and_then(|m| m.roles.into_iter().next())
            .ok_or_else(|| Failure::bad_argument("You don't have any roles."))?,
    };

    let embed = Embed::new()
        .description(format!("<@&{}> - {}", role.id, role.member_count))
        .colour(role.colour)
        .timestamp(role.created_at)
        .author(guild.name, guild.icon_url)
        .field("ID", role.id.to_string(), true)
        .field("Colour", hex(role.colour), true)
        .field("\u{200b}", "\u{200b}", true)
        .field("Managed", role.managed.to_string(), true)
        .field("Mentionable", role.mentionable.to_string(), true)
        .field("Hoisted", role.hoist.to_string(), true)
        .footer("Created", None);
    inv.send(Reply::embed(embed)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::framework::{dispatch, Action, Outcome};
    use crate::testing::{direct_message, harness, member, message, role, USER};

    #[tokio::test]
    async fn test_hello_and_alias() {
        let h = harness();
        h.install("info");

        dispatch(h.data.clone(), message(USER, "!hello")).await;
        dispatch(h.data.clone(), message(USER, "!hi")).await;
        assert_eq!(h.gateway.sent_texts(), vec!["Greetings.", "Greetings."]);
    }

    #[tokio::test]
    async fn test_guild_only() {
        let h = harness();
        h.install("info");

        let outcome = dispatch(h.data.clone(), direct_message(USER, "!hello")).await;
        assert_eq!(outcome, Outcome::Failed(Action::Ignore));
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_userinfo_of_member() {
        let h = harness();
        h.install("info");
        h.gateway
            .add_member(member(77, Some("Ninja"), vec![role(10, "Admin", 0xff0000, 2)]));

        dispatch(h.data.clone(), message(USER, "!whois ninja")).await;
        let embed = h.gateway.sent_embeds().pop().unwrap();
        assert_eq!(embed.field_value("ID"), Some("77"));
        assert_eq!(embed.field_value("nickname"), Some("Ninja"));
        assert_eq!(embed.field_value("Roles"), Some("<@&10>"));
        assert_eq!(embed.colour, Some(0xff0000));
    }

    #[tokio::test]
    async fn test_userinfo_of_unknown_user() {
        let h = harness();
        h.install("info");
        h.gateway.forget_user(123);

        dispatch(h.data.clone(), message(USER, "!userinfo 123")).await;
        assert_eq!(h.gateway.sent_texts(), vec!["This user doesn't exist."]);

        dispatch(h.data.clone(), message(USER, "!userinfo nobody")).await;
        assert_eq!(
            h.gateway.sent_texts().last().unwrap(),
            "No member by this name, here."
        );
    }

    #[tokio::test]
    async fn test_roles_listing_and_info() {
        let h = harness();
        h.install("info");
        h.gateway.add_role(role(11, "Member", 0, 1));
        h.gateway.add_role(role(10, "Admin", 0xff0000, 2));

        dispatch(h.data.clone(), message(USER, "!roles")).await;
        let embed = h.gateway.sent_embeds().pop().unwrap();
        assert_eq!(embed.title.as_deref(), Some("Roles - 2"));
        assert_eq!(embed.field_value("name"), Some("<@&10> (1)\n<@&11> (1)"));
        assert_eq!(embed.field_value("colour"), Some("#ff0000\n#000000"));

        dispatch(h.data.clone(), message(USER, "!role info admin")).await;
        let embed = h.gateway.sent_embeds().pop().unwrap();
        assert_eq!(embed.field_value("ID"), Some("10"));
        assert_eq!(embed.field_value("Colour"), Some("#ff0000"));
    }
}
