//! The chat platform as seen by command handlers.
//!
//! Everything that talks to Discord goes through [`Gateway`], so the
//! dispatcher, the announcer and the handlers can be exercised against an
//! in-memory double in tests. [`discord::SerenityGateway`] is the real thing.

pub mod discord;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, GuildId, MessageId, Permissions, RoleId, UserId};

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Discord returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Discord did not respond in time")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Author of an incoming message.
#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub avatar_url: String,
    pub bot: bool,
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author: Author,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: Option<String>,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
    pub icon_url: Option<String>,
}

/// Platform-neutral rich message body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub colour: Option<u32>,
    pub author: Option<EmbedAuthor>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<EmbedFooter>,
    pub image: Option<String>,
    pub thumbnail: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn colour(mut self, colour: u32) -> Self {
        self.colour = Some(colour);
        self
    }

    pub fn author(mut self, name: impl Into<String>, icon_url: Option<String>) -> Self {
        self.author = Some(EmbedAuthor {
            name: name.into(),
            url: None,
            icon_url,
        });
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>, icon_url: Option<String>) -> Self {
        self.footer = Some(EmbedFooter {
            text: text.into(),
            icon_url,
        });
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(url.into());
        self
    }

    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Outgoing message. Editing with a `Reply` replaces both content and embed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    /// Delete the sent message after this long.
    pub delete_after: Option<Duration>,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embed: Some(embed),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn delete_after(mut self, after: Duration) -> Self {
        self.delete_after = Some(after);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub avatar_url: String,
    pub bot: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleProfile {
    pub id: RoleId,
    pub name: String,
    pub colour: u32,
    pub position: u16,
    pub hoist: bool,
    pub mentionable: bool,
    pub managed: bool,
    pub member_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberProfile {
    pub user: UserProfile,
    pub nick: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
    /// Highest first, @everyone excluded.
    pub roles: Vec<RoleProfile>,
}

impl MemberProfile {
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or(&self.user.name)
    }

    /// Colour of the highest coloured role.
    pub fn colour(&self) -> Option<u32> {
        self.roles.iter().map(|r| r.colour).find(|c| *c != 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuildProfile {
    pub id: GuildId,
    pub name: String,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub owner_id: UserId,
    pub member_count: u64,
    pub text_channels: usize,
    pub voice_channels: usize,
    pub categories: usize,
    pub role_count: usize,
    pub boost_tier: String,
    pub boosts: u64,
    pub verification_level: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotProfile {
    pub user: UserProfile,
    pub guilds: usize,
    pub members: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageSummary {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub author_bot: bool,
    pub content: String,
    pub mentions_everyone: bool,
    pub mention_count: usize,
    pub embed_count: usize,
    pub reaction_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoiceEdit {
    pub mute: Option<bool>,
    pub deafen: Option<bool>,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send(&self, channel: ChannelId, reply: Reply) -> GatewayResult<MessageId>;
    async fn edit(&self, channel: ChannelId, message: MessageId, reply: Reply) -> GatewayResult<()>;
    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> GatewayResult<MessageSummary>;
    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> GatewayResult<()>;
    async fn react(&self, channel: ChannelId, message: MessageId, emoji: &str) -> GatewayResult<()>;
    async fn direct_message(&self, user: UserId, reply: Reply) -> GatewayResult<MessageId>;

    /// Guild-level permissions of a member, owner and administrator expanded.
    async fn member_permissions(&self, guild: GuildId, user: UserId) -> GatewayResult<Permissions>;
    async fn user(&self, user: UserId) -> GatewayResult<UserProfile>;
    async fn member(&self, guild: GuildId, user: UserId) -> GatewayResult<Option<MemberProfile>>;
    /// Looks a member up by name or nickname.
    async fn search_member(&self, guild: GuildId, query: &str) -> GatewayResult<Option<MemberProfile>>;
    async fn guild(&self, guild: GuildId) -> GatewayResult<GuildProfile>;
    async fn roles(&self, guild: GuildId) -> GatewayResult<Vec<RoleProfile>>;
    async fn bot_profile(&self) -> GatewayResult<BotProfile>;

    async fn kick(&self, guild: GuildId, user: UserId, reason: &str) -> GatewayResult<()>;
    async fn ban(&self, guild: GuildId, user: UserId, delete_days: u8, reason: &str)
        -> GatewayResult<()>;
    async fn unban(&self, guild: GuildId, user: UserId) -> GatewayResult<()>;
    async fn is_banned(&self, guild: GuildId, user: UserId) -> GatewayResult<bool>;
    async fn edit_voice_state(&self, guild: GuildId, user: UserId, edit: VoiceEdit)
        -> GatewayResult<()>;
    /// Members connected to a voice channel, `None` if it is not a voice channel.
    async fn voice_channel_members(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> GatewayResult<Option<Vec<UserId>>>;

    /// Newest first, not including `before`.
    async fn recent_messages(
        &self,
        channel: ChannelId,
        before: MessageId,
        limit: usize,
    ) -> GatewayResult<Vec<MessageSummary>>;
    async fn delete_messages(&self, channel: ChannelId, messages: &[MessageId]) -> GatewayResult<usize>;

    async fn shutdown(&self);
}

/// Renders a Discord jump link for a message.
pub fn jump_url(guild: Option<GuildId>, channel: ChannelId, message: MessageId) -> String {
    let guild = guild
        .map(|g| g.to_string())
        .unwrap_or_else(|| "@me".to_string());
    format!("https://discord.com/channels/{}/{}/{}", guild, channel, message)
}

/// Discord snowflakes carry their creation time.
pub fn snowflake_time(id: u64) -> DateTime<Utc> {
    const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;
    let millis = (id >> 22) as i64 + DISCORD_EPOCH_MS;
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Bulk deletion only accepts messages younger than this.
pub const BULK_DELETE_MAX_AGE_DAYS: i64 = 14;

/// Splits `messages` into those that may be bulk deleted at `now` and the
/// older ones, which have to be deleted one at a time.
pub fn split_bulk_deletable(
    messages: &[MessageId],
    now: DateTime<Utc>,
) -> (Vec<MessageId>, Vec<MessageId>) {
    let cutoff = now - chrono::Duration::days(BULK_DELETE_MAX_AGE_DAYS);
    messages
        .iter()
        .copied()
        .partition(|id| snowflake_time(id.get()) > cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_url() {
        let url = jump_url(Some(GuildId::new(1)), ChannelId::new(2), MessageId::new(3));
        assert_eq!(url, "https://discord.com/channels/1/2/3");
        let dm = jump_url(None, ChannelId::new(2), MessageId::new(3));
        assert_eq!(dm, "https://discord.com/channels/@me/2/3");
    }

    #[test]
    fn test_snowflake_time() {
        // Discord's documented example snowflake
        let at = snowflake_time(175928847299117063);
        assert_eq!(at.to_rfc3339(), "2016-04-30T11:18:25.796+00:00");
    }

    #[test]
    fn test_old_messages_are_not_bulk_deleted() {
        let id_at = |at: DateTime<Utc>| {
            MessageId::new(((at.timestamp_millis() - 1_420_070_400_000) as u64) << 22)
        };
        let now = snowflake_time(175928847299117063) + chrono::Duration::days(30);
        let fresh = id_at(now - chrono::Duration::days(1));
        let edge = id_at(now - chrono::Duration::days(13));
        let stale = id_at(now - chrono::Duration::days(15));

        let (bulk, single) = split_bulk_deletable(&[fresh, stale, edge], now);
        assert_eq!(bulk, vec![fresh, edge]);
        assert_eq!(single, vec![stale]);
    }

    #[test]
    fn test_member_colour_skips_uncoloured_roles() {
        let user = UserProfile {
            id: UserId::new(1),
            name: "a".into(),
            avatar_url: String::new(),
            bot: false,
            created_at: Utc::now(),
        };
        let role = |colour| RoleProfile {
            id: RoleId::new(2),
            name: "r".into(),
            colour,
            position: 1,
            hoist: false,
            mentionable: false,
            managed: false,
            member_count: 0,
            created_at: Utc::now(),
        };
        let member = MemberProfile {
            user,
            nick: None,
            joined_at: None,
            roles: vec![role(0), role(0xff0000)],
        };
        assert_eq!(member.colour(), Some(0xff0000));
        assert_eq!(member.display_name(), "a");
    }
}
