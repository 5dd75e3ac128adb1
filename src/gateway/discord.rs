use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serenity::all::{
    Cache, ChannelId, ChannelType, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter,
    CreateMessage, EditMember, EditMessage, GetMessages, GuildId, Member, Message, MessageId,
    Permissions, ReactionType, Role, RoleId, ShardManager, Timestamp, User, UserId,
};
use serenity::http::{Http, HttpError};
use tracing::{debug, warn};

use super::{
    snowflake_time, split_bulk_deletable, Author, BotProfile, Embed, Gateway, GatewayError,
    GatewayResult, GuildProfile, IncomingMessage, MemberProfile, MessageSummary, Reply,
    RoleProfile, UserProfile, VoiceEdit,
};

/// Bulk deletes take at most 100 ids per request.
const BULK_DELETE_LIMIT: usize = 100;
const HISTORY_PAGE: usize = 100;

pub struct SerenityGateway {
    http: Arc<Http>,
    cache: Arc<Cache>,
    shard_manager: Option<Arc<ShardManager>>,
    timeout: Duration,
}

impl SerenityGateway {
    pub fn new(
        http: Arc<Http>,
        cache: Arc<Cache>,
        shard_manager: Option<Arc<ShardManager>>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            cache,
            shard_manager,
            timeout,
        }
    }

    fn cache_http(&self) -> (&Arc<Cache>, &Http) {
        (&self.cache, self.http.as_ref())
    }

    async fn timed<T>(
        &self,
        fut: impl Future<Output = Result<T, serenity::Error>> + Send,
    ) -> GatewayResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(GatewayError::from),
            Err(_) => Err(GatewayError::Timeout),
        }
    }

    async fn guild_roles(&self, guild: GuildId) -> GatewayResult<HashMap<RoleId, Role>> {
        let cached = self.cache.guild(guild).map(|g| g.roles.clone());
        if let Some(roles) = cached {
            return Ok(roles);
        }
        self.timed(guild.roles(&self.http)).await
    }

    fn role_member_counts(&self, guild: GuildId) -> HashMap<RoleId, usize> {
        let mut counts = HashMap::new();
        if let Some(cached) = self.cache.guild(guild) {
            for member in cached.members.values() {
                for role in &member.roles {
                    *counts.entry(*role).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    fn member_profile(
        &self,
        member: &Member,
        roles: &HashMap<RoleId, Role>,
        counts: &HashMap<RoleId, usize>,
    ) -> MemberProfile {
        let mut member_roles: Vec<RoleProfile> = member
            .roles
            .iter()
            .filter_map(|id| roles.get(id))
            .map(|role| role_profile(role, counts.get(&role.id).copied().unwrap_or(0)))
            .collect();
        member_roles.sort_by(|a, b| b.position.cmp(&a.position));

        MemberProfile {
            user: user_profile(&member.user),
            nick: member.nick.clone(),
            joined_at: member.joined_at.and_then(to_chrono),
            roles: member_roles,
        }
    }

    async fn to_member_profile(&self, guild: GuildId, member: &Member) -> GatewayResult<MemberProfile> {
        let roles = self.guild_roles(guild).await?;
        let counts = self.role_member_counts(guild);
        Ok(self.member_profile(member, &roles, &counts))
    }
}

impl From<serenity::Error> for GatewayError {
    fn from(err: serenity::Error) -> Self {
        if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &err {
            let message = response.error.message.clone();
            return match response.status_code.as_u16() {
                404 => GatewayError::NotFound(message),
                403 => GatewayError::Forbidden(message),
                status => GatewayError::Http { status, message },
            };
        }
        GatewayError::Other(err.to_string())
    }
}

/// Guild-level permissions from the owner and the member's roles.
pub(crate) fn compute_permissions(
    owner_id: UserId,
    user: UserId,
    everyone: Permissions,
    roles: impl IntoIterator<Item = Permissions>,
) -> Permissions {
    if owner_id == user {
        return Permissions::all();
    }
    let permissions = roles.into_iter().fold(everyone, |acc, p| acc | p);
    if permissions.administrator() {
        Permissions::all()
    } else {
        permissions
    }
}

pub fn incoming_message(message: &Message) -> IncomingMessage {
    IncomingMessage {
        id: message.id,
        channel_id: message.channel_id,
        guild_id: message.guild_id,
        author: Author {
            id: message.author.id,
            name: message.author.name.clone(),
            avatar_url: message.author.face(),
            bot: message.author.bot,
        },
        content: message.content.clone(),
    }
}

fn to_chrono(timestamp: Timestamp) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(timestamp.unix_timestamp(), 0)
}

fn user_profile(user: &User) -> UserProfile {
    UserProfile {
        id: user.id,
        name: user.tag(),
        avatar_url: user.face(),
        bot: user.bot,
        created_at: snowflake_time(user.id.get()),
    }
}

fn role_profile(role: &Role, member_count: usize) -> RoleProfile {
    RoleProfile {
        id: role.id,
        name: role.name.clone(),
        colour: role.colour.0,
        position: role.position,
        hoist: role.hoist,
        mentionable: role.mentionable,
        managed: role.managed,
        member_count,
        created_at: snowflake_time(role.id.get()),
    }
}

fn message_summary(message: &Message) -> MessageSummary {
    MessageSummary {
        id: message.id,
        channel_id: message.channel_id,
        author_id: message.author.id,
        author_bot: message.author.bot,
        content: message.content.clone(),
        mentions_everyone: message.mention_everyone,
        mention_count: message.mentions.len(),
        embed_count: message.embeds.len(),
        reaction_count: message.reactions.len(),
        created_at: to_chrono(message.timestamp).unwrap_or_default(),
    }
}

fn create_embed(embed: Embed) -> CreateEmbed {
    let mut out = CreateEmbed::new();
    if let Some(title) = embed.title {
        out = out.title(title);
    }
    if let Some(description) = embed.description {
        out = out.description(description);
    }
    if let Some(url) = embed.url {
        out = out.url(url);
    }
    if let Some(colour) = embed.colour {
        out = out.colour(colour);
    }
    if let Some(author) = embed.author {
        let mut builder = CreateEmbedAuthor::new(author.name);
        if let Some(url) = author.url {
            builder = builder.url(url);
        }
        if let Some(icon) = author.icon_url {
            builder = builder.icon_url(icon);
        }
        out = out.author(builder);
    }
    for field in embed.fields {
        out = out.field(field.name, field.value, field.inline);
    }
    if let Some(footer) = embed.footer {
        let mut builder = CreateEmbedFooter::new(footer.text);
        if let Some(icon) = footer.icon_url {
            builder = builder.icon_url(icon);
        }
        out = out.footer(builder);
    }
    if let Some(image) = embed.image {
        out = out.image(image);
    }
    if let Some(thumbnail) = embed.thumbnail {
        out = out.thumbnail(thumbnail);
    }
    if let Some(at) = embed.timestamp {
        if let Ok(timestamp) = Timestamp::from_unix_timestamp(at.timestamp()) {
            out = out.timestamp(timestamp);
        }
    }
    out
}

fn create_message(reply: Reply) -> CreateMessage {
    let mut builder = CreateMessage::new();
    if let Some(content) = reply.content {
        builder = builder.content(content);
    }
    if let Some(embed) = reply.embed {
        builder = builder.embed(create_embed(embed));
    }
    builder
}

#[async_trait]
impl Gateway for SerenityGateway {
    async fn send(&self, channel: ChannelId, reply: Reply) -> GatewayResult<MessageId> {
        let message = self
            .timed(channel.send_message(self.cache_http(), create_message(reply)))
            .await?;
        Ok(message.id)
    }

    async fn edit(&self, channel: ChannelId, message: MessageId, reply: Reply) -> GatewayResult<()> {
        let builder = EditMessage::new()
            .content(reply.content.unwrap_or_default())
            .embeds(reply.embed.into_iter().map(create_embed).collect());
        self.timed(channel.edit_message(self.cache_http(), message, builder))
            .await?;
        Ok(())
    }

    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> GatewayResult<MessageSummary> {
        let message = self.timed(channel.message(self.cache_http(), message)).await?;
        Ok(message_summary(&message))
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> GatewayResult<()> {
        self.timed(channel.delete_message(&self.http, message)).await
    }

    async fn react(&self, channel: ChannelId, message: MessageId, emoji: &str) -> GatewayResult<()> {
        let reaction = ReactionType::Unicode(emoji.to_string());
        self.timed(channel.create_reaction(&self.http, message, reaction))
            .await
    }

    async fn direct_message(&self, user: UserId, reply: Reply) -> GatewayResult<MessageId> {
        let message = self
            .timed(user.direct_message(self.cache_http(), create_message(reply)))
            .await?;
        Ok(message.id)
    }

    async fn member_permissions(&self, guild: GuildId, user: UserId) -> GatewayResult<Permissions> {
        let member = self.timed(guild.member(self.cache_http(), user)).await?;
        let everyone_id = RoleId::new(guild.get());

        let cached = self.cache.guild(guild).map(|g| {
            let everyone = g
                .roles
                .get(&everyone_id)
                .map(|r| r.permissions)
                .unwrap_or_else(Permissions::empty);
            let roles: Vec<Permissions> = member
                .roles
                .iter()
                .filter_map(|id| g.roles.get(id).map(|r| r.permissions))
                .collect();
            (g.owner_id, everyone, roles)
        });

        let (owner_id, everyone, roles) = match cached {
            Some(parts) => parts,
            None => {
                debug!("Guild {} not cached, fetching roles for permission check", guild);
                let partial = self.timed(guild.to_partial_guild(self.cache_http())).await?;
                let everyone = partial
                    .roles
                    .get(&everyone_id)
                    .map(|r| r.permissions)
                    .unwrap_or_else(Permissions::empty);
                let roles = member
                    .roles
                    .iter()
                    .filter_map(|id| partial.roles.get(id).map(|r| r.permissions))
                    .collect();
                (partial.owner_id, everyone, roles)
            }
        };

        Ok(compute_permissions(owner_id, user, everyone, roles))
    }

    async fn user(&self, user: UserId) -> GatewayResult<UserProfile> {
        let user = self.timed(user.to_user(self.cache_http())).await?;
        Ok(user_profile(&user))
    }

    async fn member(&self, guild: GuildId, user: UserId) -> GatewayResult<Option<MemberProfile>> {
        match self.timed(guild.member(self.cache_http(), user)).await {
            Ok(member) => Ok(Some(self.to_member_profile(guild, &member).await?)),
            Err(GatewayError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn search_member(&self, guild: GuildId, query: &str) -> GatewayResult<Option<MemberProfile>> {
        let members = self
            .timed(guild.search_members(&self.http, query, Some(1)))
            .await?;
        match members.first() {
            Some(member) => Ok(Some(self.to_member_profile(guild, member).await?)),
            None => Ok(None),
        }
    }

    async fn guild(&self, guild: GuildId) -> GatewayResult<GuildProfile> {
        let partial = self
            .timed(guild.to_partial_guild_with_counts(&self.http))
            .await?;
        let channels = self.timed(guild.channels(&self.http)).await?;

        let count = |kind: ChannelType| channels.values().filter(|c| c.kind == kind).count();
        let member_count = self
            .cache
            .guild(guild)
            .map(|g| g.member_count)
            .or(partial.approximate_member_count)
            .unwrap_or(0);

        Ok(GuildProfile {
            id: partial.id,
            name: partial.name.clone(),
            description: partial.description.clone(),
            icon_url: partial.icon_url(),
            owner_id: partial.owner_id,
            member_count,
            text_channels: count(ChannelType::Text),
            voice_channels: count(ChannelType::Voice),
            categories: count(ChannelType::Category),
            role_count: partial.roles.len(),
            boost_tier: format!("{:?}", partial.premium_tier),
            boosts: partial.premium_subscription_count.unwrap_or(0),
            verification_level: format!("{:?}", partial.verification_level),
            created_at: snowflake_time(partial.id.get()),
        })
    }

    async fn roles(&self, guild: GuildId) -> GatewayResult<Vec<RoleProfile>> {
        let roles = self.guild_roles(guild).await?;
        let counts = self.role_member_counts(guild);
        let mut profiles: Vec<RoleProfile> = roles
            .values()
            .map(|role| role_profile(role, counts.get(&role.id).copied().unwrap_or(0)))
            .collect();
        profiles.sort_by(|a, b| b.position.cmp(&a.position));
        Ok(profiles)
    }

    async fn bot_profile(&self) -> GatewayResult<BotProfile> {
        let current = (*self.cache.current_user()).clone();
        let user = User::from(current);
        let guild_ids = self.cache.guilds();
        let members = guild_ids
            .iter()
            .filter_map(|id| self.cache.guild(*id).map(|g| g.member_count))
            .sum();

        Ok(BotProfile {
            user: user_profile(&user),
            guilds: guild_ids.len(),
            members,
        })
    }

    async fn kick(&self, guild: GuildId, user: UserId, reason: &str) -> GatewayResult<()> {
        self.timed(guild.kick_with_reason(&self.http, user, reason))
            .await
    }

    async fn ban(
        &self,
        guild: GuildId,
        user: UserId,
        delete_days: u8,
        reason: &str,
    ) -> GatewayResult<()> {
        self.timed(guild.ban_with_reason(&self.http, user, delete_days.min(7), reason))
            .await
    }

    async fn unban(&self, guild: GuildId, user: UserId) -> GatewayResult<()> {
        self.timed(guild.unban(&self.http, user)).await
    }

    async fn is_banned(&self, guild: GuildId, user: UserId) -> GatewayResult<bool> {
        let bans = self.timed(guild.bans(&self.http, None, None)).await?;
        Ok(bans.iter().any(|ban| ban.user.id == user))
    }

    async fn edit_voice_state(
        &self,
        guild: GuildId,
        user: UserId,
        edit: VoiceEdit,
    ) -> GatewayResult<()> {
        let mut builder = EditMember::new();
        if let Some(mute) = edit.mute {
            builder = builder.mute(mute);
        }
        if let Some(deafen) = edit.deafen {
            builder = builder.deafen(deafen);
        }
        self.timed(guild.edit_member(self.cache_http(), user, builder))
            .await?;
        Ok(())
    }

    async fn voice_channel_members(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> GatewayResult<Option<Vec<UserId>>> {
        let cached = self.cache.guild(guild).map(|g| {
            let is_voice = g
                .channels
                .get(&channel)
                .map(|c| matches!(c.kind, ChannelType::Voice | ChannelType::Stage))
                .unwrap_or(false);
            let members: Vec<UserId> = g
                .voice_states
                .values()
                .filter(|state| state.channel_id == Some(channel))
                .map(|state| state.user_id)
                .collect();
            (is_voice, members)
        });

        match cached {
            Some((true, members)) => Ok(Some(members)),
            Some((false, _)) => Ok(None),
            None => {
                warn!("Guild {} is not cached, voice states unavailable", guild);
                Err(GatewayError::Other(
                    "Voice states are not available yet, try again shortly.".to_string(),
                ))
            }
        }
    }

    async fn recent_messages(
        &self,
        channel: ChannelId,
        before: MessageId,
        limit: usize,
    ) -> GatewayResult<Vec<MessageSummary>> {
        let mut collected = Vec::with_capacity(limit);
        let mut cursor = before;

        while collected.len() < limit {
            let page = (limit - collected.len()).min(HISTORY_PAGE) as u8;
            let builder = GetMessages::new().before(cursor).limit(page);
            let messages = self
                .timed(channel.messages(self.cache_http(), builder))
                .await?;
            let Some(last) = messages.last() else {
                break;
            };
            cursor = last.id;
            let fetched = messages.len();
            collected.extend(messages.iter().map(message_summary));
            if fetched < page as usize {
                break;
            }
        }

        Ok(collected)
    }

    async fn delete_messages(&self, channel: ChannelId, messages: &[MessageId]) -> GatewayResult<usize> {
        let (recent, old) = split_bulk_deletable(messages, chrono::Utc::now());
        let mut deleted = 0;
        for chunk in recent.chunks(BULK_DELETE_LIMIT) {
            if let [single] = chunk {
                self.timed(channel.delete_message(&self.http, *single))
                    .await?;
            } else {
                self.timed(channel.delete_messages(&self.http, chunk))
                    .await?;
            }
            deleted += chunk.len();
        }
        for message in old {
            self.timed(channel.delete_message(&self.http, message))
                .await?;
            deleted += 1;
        }
        if deleted > 0 {
            debug!("Gateway: deleted {} messages in {}", deleted, channel);
        }
        Ok(deleted)
    }

    async fn shutdown(&self) {
        match &self.shard_manager {
            Some(manager) => manager.shutdown_all().await,
            None => warn!("Shutdown requested but no shard manager is attached"),
        }
    }
}
