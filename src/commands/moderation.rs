use std::time::Duration;

use clap::Parser;
use regex::{Regex, RegexBuilder};
use serenity::all::{Permissions, UserId};
use tracing::info;

use super::converters::{member, member_or_user};
use super::{flag_error, flag_tokens, FeatureModule};
use crate::config::Config;
use crate::error::{CommandResult, Failure};
use crate::framework::args::{parse_channel_mention, parse_user_mention};
use crate::framework::{async_handler, ArgSpec, Args, Category, Check, Command, Invocation};
use crate::gateway::{MessageSummary, Reply, VoiceEdit};
use crate::ratelimit::BucketScope;

const PURGE_LIMIT: i64 = 1000;

pub fn module(_config: &Config) -> FeatureModule {
    let voice = |name: &str, help: &str, permission: Permissions, handler| {
        Command::new(name)
            .help(help)
            .args([ArgSpec::variadic("targets")])
            .check(Check::Permissions(permission))
            .handler(handler)
    };

    FeatureModule::new(
        "mod",
        Category::new("Mod", "Moderation commands.").check(Check::GuildOnly),
        vec![
            Command::new("kick")
                .help("Kicks a member from the server.\n\nBoth Bot and command user must have Kick Member permission.")
                .args([ArgSpec::required("member"), ArgSpec::rest("reason")])
                .check(Check::Permissions(Permissions::KICK_MEMBERS))
                .handler(async_handler!(kick)),
            Command::new("ban")
                .help("Bans a member or a user (by ID) from the server.\n\nBoth the user and the bot must have Ban Member permission.")
                .args([
                    ArgSpec::required("user"),
                    ArgSpec::optional_int("days"),
                    ArgSpec::rest("reason"),
                ])
                .check(Check::Permissions(Permissions::BAN_MEMBERS))
                .handler(async_handler!(ban)),
            Command::new("unban")
                .help("Unbans a user from the server.\n\nBoth the user and the bot must have ban permission.")
                .args([ArgSpec::required("user"), ArgSpec::rest("reason")])
                .check(Check::Permissions(Permissions::BAN_MEMBERS))
                .handler(async_handler!(unban)),
            Command::new("softban")
                .help("Ban and unbans a member immediately to delete their messages upto 7 days.")
                .args([ArgSpec::required("member"), ArgSpec::rest("reason")])
                .check(Check::Permissions(Permissions::KICK_MEMBERS))
                .handler(async_handler!(softban)),
            Command::new("voice")
                .aliases(&["vc"])
                .help("Voice moderation related commands.")
                .cooldown(1, 10.0, BucketScope::Guild)
                .subcommand(voice(
                    "mute",
                    "Voice mutes multiple members.",
                    Permissions::MUTE_MEMBERS,
                    async_handler!(voice_mute),
                ))
                .subcommand(voice(
                    "unmute",
                    "Voice unmutes multiple members.",
                    Permissions::MUTE_MEMBERS,
                    async_handler!(voice_unmute),
                ))
                .subcommand(voice(
                    "deaf",
                    "Voice deafens multiple members.",
                    Permissions::DEAFEN_MEMBERS,
                    async_handler!(voice_deaf),
                ))
                .subcommand(voice(
                    "undeaf",
                    "Voice undeafens multiple members.",
                    Permissions::DEAFEN_MEMBERS,
                    async_handler!(voice_undeaf),
                )),
            Command::new("purge")
                .help(
                    "Purge messages with handy options.\n\n\
                     Both the user and the bot must have Manage Message permission. Additional Options:\n\
                     purges message if message -\n\
                     `-u`, `--user` - author is among user(s).\n\
                     `-c`, `--contains` - content contains provided words.\n\
                     `-b`, `--bot` - author is a bot.\n\
                     `-e`, `--everyone` - actually mentions everyone or here.\n\
                     `-em`, `--embed` - has embed(s).\n\
                     `-ro`, `--reaction-over` - has reactions over provided integer.\n\
                     `-mo`, `--mention-over` - has mentions over provided integer.\n\
                     `-r`, `--regex` - matches the regex pattern.\n\
                     `-ric`, `--regex-ignorecase` - can be used with `-r` to ignorecase.",
                )
                .args([ArgSpec::required("limit"), ArgSpec::rest("flags")])
                .check(Check::Permissions(Permissions::MANAGE_MESSAGES))
                .handler(async_handler!(purge)),
        ],
    )
}

fn default_reason(inv: &Invocation, args: &Args) -> String {
    args.get("reason")
        .map(str::to_string)
        .unwrap_or_else(|| format!("By {} (ID: {})", inv.author().name, inv.author_id()))
}

async fn kick(inv: &Invocation, args: &Args) -> CommandResult {
    let guild = inv.require_guild()?;
    let target = member(inv, args.require("member")?).await?;
    let reason = default_reason(inv, args);

    inv.gateway().kick(guild, target.user.id, &reason).await?;
    info!("Moderation: {} kicked {} in {}", inv.author_id(), target.user.id, guild);
    inv.say(format!("See ya, {}", target.user.name)).await?;
    Ok(())
}

async fn ban(inv: &Invocation, args: &Args) -> CommandResult {
    let guild = inv.require_guild()?;
    let target = member_or_user(inv, args.require("user")?).await?;
    let days = args.parse_as::<i64>("days")?.unwrap_or(0);
    if !(0..=7).contains(&days) {
        return Err(Failure::bad_argument(
            "Minimum 0 days and Maximum 7 days of member message can be deleted",
        ));
    }
    let reason = default_reason(inv, args);

    inv.gateway()
        .ban(guild, target.user.id, days as u8, &reason)
        .await?;
    info!("Moderation: {} banned {} in {}", inv.author_id(), target.user.id, guild);
    inv.say(format!("Ba Bye, {}", target.user.name)).await?;
    Ok(())
}

async fn unban(inv: &Invocation, args: &Args) -> CommandResult {
    let guild = inv.require_guild()?;
    let user = args
        .require("user")?
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(UserId::new)
        .ok_or_else(|| Failure::bad_argument("I need the user's ID to unban."))?;

    let gateway = inv.gateway();
    if !gateway.is_banned(guild, user).await? {
        return Err(Failure::bad_argument("Never banned this user before."));
    }
    gateway.unban(guild, user).await?;
    info!(
        "Moderation: {} unbanned {} in {} ({})",
        inv.author_id(),
        user,
        guild,
        default_reason(inv, args)
    );

    let name = match gateway.user(user).await {
        Ok(profile) => profile.name,
        Err(_) => user.to_string(),
    };
    inv.say(format!("Thought {}'s gone forever.", name)).await?;
    Ok(())
}

async fn softban(inv: &Invocation, args: &Args) -> CommandResult {
    let guild = inv.require_guild()?;
    let target = member(inv, args.require("member")?).await?;
    let reason = default_reason(inv, args);

    let gateway = inv.gateway();
    gateway.ban(guild, target.user.id, 7, &reason).await?;
    gateway.unban(guild, target.user.id).await?;
    inv.say(format!("Forgotten and exiled, {}.", target.user.name))
        .await?;
    Ok(())
}

/// Applies `edit` to every target member or every member of every target
/// voice channel. Stops at the first token that is neither.
async fn voice_patch(inv: &Invocation, args: &Args, edit: VoiceEdit) -> CommandResult<usize> {
    let guild = inv.require_guild()?;
    let gateway = inv.gateway();
    let mut count = 0;

    for raw in args.all("targets") {
        let in_channel = match parse_channel_mention(raw) {
            Some(channel) => gateway.voice_channel_members(guild, channel).await?,
            None => None,
        };
        if let Some(users) = in_channel {
            for user in users {
                gateway.edit_voice_state(guild, user, edit).await?;
                count += 1;
            }
            continue;
        }

        let found = match parse_user_mention(raw) {
            Some(id) => gateway.member(guild, id).await?,
            None => gateway.search_member(guild, raw).await?,
        };
        let Some(found) = found else {
            break;
        };
        gateway.edit_voice_state(guild, found.user.id, edit).await?;
        count += 1;
    }
    Ok(count)
}

async fn voice_mute(inv: &Invocation, args: &Args) -> CommandResult {
    let edit = VoiceEdit {
        mute: Some(true),
        ..Default::default()
    };
    let count = voice_patch(inv, args, edit).await?;
    inv.say(format!(
        "The less men think, the more they talk. Muted: {}",
        count
    ))
    .await?;
    Ok(())
}

async fn voice_unmute(inv: &Invocation, args: &Args) -> CommandResult {
    let edit = VoiceEdit {
        mute: Some(false),
        ..Default::default()
    };
    let count = voice_patch(inv, args, edit).await?;
    inv.say(format!("Unmuted: {}", count)).await?;
    Ok(())
}

async fn voice_deaf(inv: &Invocation, args: &Args) -> CommandResult {
    let edit = VoiceEdit {
        deafen: Some(true),
        ..Default::default()
    };
    let count = voice_patch(inv, args, edit).await?;
    inv.say(format!("Deafened: {}", count)).await?;
    Ok(())
}

async fn voice_undeaf(inv: &Invocation, args: &Args) -> CommandResult {
    let edit = VoiceEdit {
        deafen: Some(false),
        ..Default::default()
    };
    let count = voice_patch(inv, args, edit).await?;
    inv.say(format!("undeafened: {}", count)).await?;
    Ok(())
}

const PURGE_ALIASES: &[(&str, &str)] = &[
    ("-em", "--embed"),
    ("-ro", "--reaction-over"),
    ("-mo", "--mention-over"),
    ("-ric", "--regex-ignorecase"),
];

#[derive(Parser, Debug, Default, PartialEq)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
struct PurgeFlags {
    #[arg(short = 'u', long, num_args = 0..)]
    user: Vec<String>,
    #[arg(short = 'c', long, num_args = 0..)]
    contains: Vec<String>,
    #[arg(short = 'b', long)]
    bot: bool,
    #[arg(short = 'e', long)]
    everyone: bool,
    #[arg(long)]
    embed: bool,
    #[arg(long)]
    reaction_over: Option<usize>,
    #[arg(long)]
    mention_over: Option<usize>,
    #[arg(short = 'r', long)]
    regex: Option<String>,
    #[arg(long)]
    regex_ignorecase: bool,
}

/// Every condition must hold for a message to be purged.
#[derive(Debug, Default)]
struct PurgeFilter {
    users: Vec<UserId>,
    contains: Vec<String>,
    bot: bool,
    everyone: bool,
    embed: bool,
    reaction_over: Option<usize>,
    mention_over: Option<usize>,
    regex: Option<Regex>,
}

impl PurgeFilter {
    fn matches(&self, message: &MessageSummary) -> bool {
        (self.users.is_empty() || self.users.contains(&message.author_id))
            && (self.contains.is_empty()
                || self.contains.iter().any(|word| message.content.contains(word.as_str())))
            && (!self.bot || message.author_bot)
            && (!self.everyone || message.mentions_everyone)
            && (!self.embed || message.embed_count > 0)
            && self.reaction_over.map_or(true, |n| message.reaction_count > n)
            && self.mention_over.map_or(true, |n| message.mention_count > n)
            && self.regex.as_ref().map_or(true, |re| re.is_match(&message.content))
    }
}

fn compile_regex(pattern: &str, ignore_case: bool) -> CommandResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|e| Failure::bad_argument(format!("Invalid regex: {}", e)))
}

async fn purge_filter(inv: &Invocation, raw: Option<&str>) -> CommandResult<PurgeFilter> {
    let Some(raw) = raw else {
        return Ok(PurgeFilter::default());
    };
    let flags = PurgeFlags::try_parse_from(flag_tokens(raw, PURGE_ALIASES)?).map_err(flag_error)?;

    let mut users = Vec::with_capacity(flags.user.len());
    for user in &flags.user {
        users.push(member_or_user(inv, user).await?.user.id);
    }
    let regex = match &flags.regex {
        Some(pattern) => Some(compile_regex(pattern, flags.regex_ignorecase)?),
        None => None,
    };

    Ok(PurgeFilter {
        users,
        contains: flags.contains,
        bot: flags.bot,
        everyone: flags.everyone,
        embed: flags.embed,
        reaction_over: flags.reaction_over.filter(|n| *n > 0),
        mention_over: flags.mention_over.filter(|n| *n > 0),
        regex,
    })
}

async fn purge(inv: &Invocation, args: &Args) -> CommandResult {
    let limit = args.parse_as::<i64>("limit")?.unwrap_or(0);
    if limit > PURGE_LIMIT {
        return Err(Failure::bad_argument("1000 messages at most."));
    }
    let filter = purge_filter(inv, args.get("flags")).await?;

    let gateway = inv.gateway();
    let channel = inv.channel_id();
    gateway.delete_message(channel, inv.message.id).await?;

    let recent = gateway
        .recent_messages(channel, inv.message.id, limit.max(0) as usize)
        .await?;
    let doomed: Vec<_> = recent
        .iter()
        .filter(|m| filter.matches(m))
        .map(|m| m.id)
        .collect();
    let deleted = gateway.delete_messages(channel, &doomed).await?;
    info!("Moderation: purged {} messages in {}", deleted, channel);

    inv.send(
        Reply::text(format!("{} Messages? Wiped out their existence.", deleted))
            .delete_after(Duration::from_secs(3)),
    )
    .await?;
    Ok(())
}
