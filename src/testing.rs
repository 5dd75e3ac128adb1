//! In-memory gateway and escalation sink used across unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serenity::all::{ChannelId, GuildId, MessageId, Permissions, UserId};

use crate::clock::MockClock;
use crate::config::test_config;
use crate::db::Database;
use crate::escalation::EscalationSink;
use crate::framework::EscalationReport;
use crate::gateway::{
    Author, BotProfile, Gateway, GatewayError, GatewayResult, GuildProfile, IncomingMessage,
    MemberProfile, MessageSummary, Reply, RoleProfile, UserProfile, VoiceEdit,
};
use crate::Data;

pub const OWNER: u64 = 1;
pub const USER: u64 = 42;
pub const GUILD: u64 = 761;
pub const CHANNEL: u64 = 30;
pub const BOT: u64 = 4242;

/// Every state-changing request the code under test made.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send { channel: ChannelId, reply: Reply },
    Edit { channel: ChannelId, message: MessageId, reply: Reply },
    Delete { channel: ChannelId, message: MessageId },
    React { channel: ChannelId, message: MessageId, emoji: String },
    DirectMessage { user: UserId, reply: Reply },
    Kick { guild: GuildId, user: UserId, reason: String },
    Ban { guild: GuildId, user: UserId, delete_days: u8, reason: String },
    Unban { guild: GuildId, user: UserId },
    VoiceEdit { guild: GuildId, user: UserId, edit: VoiceEdit },
    BulkDelete { channel: ChannelId, messages: Vec<MessageId> },
    Shutdown,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    next_id: u64,
    permissions: HashMap<(GuildId, UserId), Permissions>,
    forgotten: HashSet<MessageId>,
    fail_edits: bool,
    edit_delay: Option<Duration>,
    missing_users: HashSet<UserId>,
    members: HashMap<UserId, MemberProfile>,
    roles: Vec<RoleProfile>,
    history: Vec<MessageSummary>,
    voice: HashMap<ChannelId, Vec<UserId>>,
    banned: HashSet<UserId>,
}

pub struct MockGateway {
    state: Mutex<State>,
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

pub fn user_profile(id: u64) -> UserProfile {
    UserProfile {
        id: UserId::new(id),
        name: format!("user{}", id),
        avatar_url: format!("https://cdn.example/avatars/{}.png", id),
        bot: false,
        created_at: at(1_500_000_000),
    }
}

pub fn role(id: u64, name: &str, colour: u32, position: u16) -> RoleProfile {
    RoleProfile {
        id: serenity::all::RoleId::new(id),
        name: name.to_string(),
        colour,
        position,
        hoist: false,
        mentionable: true,
        managed: false,
        member_count: 1,
        created_at: at(1_600_000_000),
    }
}

pub fn member(id: u64, nick: Option<&str>, roles: Vec<RoleProfile>) -> MemberProfile {
    MemberProfile {
        user: user_profile(id),
        nick: nick.map(str::to_string),
        joined_at: Some(at(1_650_000_000)),
        roles,
    }
}

pub fn summary(id: u64, author: u64, content: &str) -> MessageSummary {
    MessageSummary {
        id: MessageId::new(id),
        channel_id: ChannelId::new(CHANNEL),
        author_id: UserId::new(author),
        author_bot: false,
        content: content.to_string(),
        mentions_everyone: false,
        mention_count: 0,
        embed_count: 0,
        reaction_count: 0,
        created_at: at(1_700_000_000),
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Text content of every channel message sent, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Send { reply, .. } => reply.content.clone(),
                _ => None,
            })
            .collect()
    }

    pub fn sent_embeds(&self) -> Vec<crate::gateway::Embed> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Send { reply, .. } => reply.embed.clone(),
                _ => None,
            })
            .collect()
    }

    pub fn set_permissions(&self, user: u64, permissions: Permissions) {
        self.state
            .lock()
            .permissions
            .insert((GuildId::new(GUILD), UserId::new(user)), permissions);
    }

    /// Fetching or editing this message fails with `NotFound` from now on.
    pub fn forget_message(&self, message: MessageId) {
        self.state.lock().forgotten.insert(message);
    }

    /// While set, edits fail and are not recorded.
    pub fn fail_edits(&self, fail: bool) {
        self.state.lock().fail_edits = fail;
    }

    /// Edits sleep this long before they are recorded.
    pub fn delay_edits(&self, delay: Duration) {
        self.state.lock().edit_delay = Some(delay);
    }

    pub fn forget_user(&self, user: u64) {
        self.state.lock().missing_users.insert(UserId::new(user));
    }

    pub fn add_member(&self, member: MemberProfile) {
        self.state.lock().members.insert(member.user.id, member);
    }

    pub fn add_role(&self, role: RoleProfile) {
        self.state.lock().roles.push(role);
    }

    pub fn add_history(&self, message: MessageSummary) {
        self.state.lock().history.push(message);
    }

    pub fn set_voice(&self, channel: u64, users: &[u64]) {
        self.state.lock().voice.insert(
            ChannelId::new(channel),
            users.iter().copied().map(UserId::new).collect(),
        );
    }

    pub fn add_ban(&self, user: u64) {
        self.state.lock().banned.insert(UserId::new(user));
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn send(&self, channel: ChannelId, reply: Reply) -> GatewayResult<MessageId> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = MessageId::new(state.next_id);
        state.calls.push(Call::Send { channel, reply });
        Ok(id)
    }

    async fn edit(&self, channel: ChannelId, message: MessageId, reply: Reply) -> GatewayResult<()> {
        let delay = self.state.lock().edit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if state.fail_edits {
            return Err(GatewayError::Http {
                status: 500,
                message: "Internal Server Error".to_string(),
            });
        }
        if state.forgotten.contains(&message) {
            return Err(GatewayError::NotFound("Unknown Message".to_string()));
        }
        state.calls.push(Call::Edit {
            channel,
            message,
            reply,
        });
        Ok(())
    }

    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> GatewayResult<MessageSummary> {
        let state = self.state.lock();
        if state.forgotten.contains(&message) {
            return Err(GatewayError::NotFound("Unknown Message".to_string()));
        }
        let found = state.history.iter().find(|m| m.id == message).cloned();
        Ok(found.unwrap_or_else(|| MessageSummary {
            channel_id: channel,
            ..summary(message.get(), BOT, "")
        }))
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> GatewayResult<()> {
        self.record(Call::Delete { channel, message });
        Ok(())
    }

    async fn react(&self, channel: ChannelId, message: MessageId, emoji: &str) -> GatewayResult<()> {
        self.record(Call::React {
            channel,
            message,
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn direct_message(&self, user: UserId, reply: Reply) -> GatewayResult<MessageId> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = MessageId::new(state.next_id);
        state.calls.push(Call::DirectMessage { user, reply });
        Ok(id)
    }

    async fn member_permissions(&self, guild: GuildId, user: UserId) -> GatewayResult<Permissions> {
        Ok(self
            .state
            .lock()
            .permissions
            .get(&(guild, user))
            .copied()
            .unwrap_or_else(Permissions::empty))
    }

    async fn user(&self, user: UserId) -> GatewayResult<UserProfile> {
        if self.state.lock().missing_users.contains(&user) {
            return Err(GatewayError::NotFound("Unknown User".to_string()));
        }
        Ok(user_profile(user.get()))
    }

    async fn member(&self, _guild: GuildId, user: UserId) -> GatewayResult<Option<MemberProfile>> {
        Ok(self.state.lock().members.get(&user).cloned())
    }

    async fn search_member(&self, _guild: GuildId, query: &str) -> GatewayResult<Option<MemberProfile>> {
        let query = query.to_lowercase();
        Ok(self
            .state
            .lock()
            .members
            .values()
            .find(|m| {
                m.user.name.to_lowercase() == query
                    || m.nick.as_deref().map(str::to_lowercase).as_deref() == Some(query.as_str())
            })
            .cloned())
    }

    async fn guild(&self, guild: GuildId) -> GatewayResult<GuildProfile> {
        let state = self.state.lock();
        Ok(GuildProfile {
            id: guild,
            name: "Test Guild".to_string(),
            description: None,
            icon_url: None,
            owner_id: UserId::new(OWNER),
            member_count: state.members.len() as u64,
            text_channels: 3,
            voice_channels: state.voice.len(),
            categories: 1,
            role_count: state.roles.len(),
            boost_tier: "None".to_string(),
            boosts: 0,
            verification_level: "Low".to_string(),
            created_at: at(1_600_000_000),
        })
    }

    async fn roles(&self, _guild: GuildId) -> GatewayResult<Vec<RoleProfile>> {
        let mut roles = self.state.lock().roles.clone();
        roles.sort_by(|a, b| b.position.cmp(&a.position));
        Ok(roles)
    }

    async fn bot_profile(&self) -> GatewayResult<BotProfile> {
        let mut user = user_profile(BOT);
        user.name = "Sneaky".to_string();
        user.bot = true;
        Ok(BotProfile {
            user,
            guilds: 2,
            members: 40,
        })
    }

    async fn kick(&self, guild: GuildId, user: UserId, reason: &str) -> GatewayResult<()> {
        self.record(Call::Kick {
            guild,
            user,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn ban(
        &self,
        guild: GuildId,
        user: UserId,
        delete_days: u8,
        reason: &str,
    ) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.banned.insert(user);
        state.calls.push(Call::Ban {
            guild,
            user,
            delete_days,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn unban(&self, guild: GuildId, user: UserId) -> GatewayResult<()> {
        let mut state = self.state.lock();
        if !state.banned.remove(&user) {
            return Err(GatewayError::NotFound("Unknown Ban".to_string()));
        }
        state.calls.push(Call::Unban { guild, user });
        Ok(())
    }

    async fn is_banned(&self, _guild: GuildId, user: UserId) -> GatewayResult<bool> {
        Ok(self.state.lock().banned.contains(&user))
    }

    async fn edit_voice_state(
        &self,
        guild: GuildId,
        user: UserId,
        edit: VoiceEdit,
    ) -> GatewayResult<()> {
        self.record(Call::VoiceEdit { guild, user, edit });
        Ok(())
    }

    async fn voice_channel_members(
        &self,
        _guild: GuildId,
        channel: ChannelId,
    ) -> GatewayResult<Option<Vec<UserId>>> {
        Ok(self.state.lock().voice.get(&channel).cloned())
    }

    async fn recent_messages(
        &self,
        channel: ChannelId,
        before: MessageId,
        limit: usize,
    ) -> GatewayResult<Vec<MessageSummary>> {
        let mut messages: Vec<MessageSummary> = self
            .state
            .lock()
            .history
            .iter()
            .filter(|m| m.channel_id == channel && m.id < before)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn delete_messages(&self, channel: ChannelId, messages: &[MessageId]) -> GatewayResult<usize> {
        let mut state = self.state.lock();
        state.history.retain(|m| !messages.contains(&m.id));
        state.calls.push(Call::BulkDelete {
            channel,
            messages: messages.to_vec(),
        });
        Ok(messages.len())
    }

    async fn shutdown(&self) {
        self.record(Call::Shutdown);
    }
}

#[derive(Default)]
pub struct MockSink {
    reports: Mutex<Vec<EscalationReport>>,
}

impl MockSink {
    pub fn reports(&self) -> Vec<EscalationReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl EscalationSink for MockSink {
    async fn deliver(&self, report: &EscalationReport) -> anyhow::Result<()> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

pub struct Harness {
    pub data: Arc<Data>,
    pub gateway: Arc<MockGateway>,
    pub sink: Arc<MockSink>,
    pub clock: MockClock,
}

pub fn harness() -> Harness {
    let config = test_config();
    let gateway = Arc::new(MockGateway::new());
    let sink = Arc::new(MockSink::default());
    let clock = MockClock::new();

    let db = Database::new(&config).unwrap();
    db.execute_init().unwrap();
    let data = Data::new(
        config,
        db,
        gateway.clone(),
        sink.clone(),
        Arc::new(clock.clone()),
        UserId::new(BOT),
    )
    .unwrap();

    Harness {
        data: Arc::new(data),
        gateway,
        sink,
        clock,
    }
}

impl Harness {
    /// Registers a feature module the way `load` does, without its hooks.
    pub fn install(&self, module: &str) {
        let module = crate::commands::build_module(module, &self.data.config).unwrap();
        self.data
            .registry
            .write()
            .register_module(module.category, module.commands)
            .unwrap();
    }
}

static NEXT_MESSAGE: AtomicU64 = AtomicU64::new(1_000_000);

/// A guild message from `author` in the test channel.
pub fn message(author: u64, content: &str) -> IncomingMessage {
    IncomingMessage {
        id: MessageId::new(NEXT_MESSAGE.fetch_add(1, Ordering::Relaxed)),
        channel_id: ChannelId::new(CHANNEL),
        guild_id: Some(GuildId::new(GUILD)),
        author: Author {
            id: UserId::new(author),
            name: format!("user{}", author),
            avatar_url: format!("https://cdn.example/avatars/{}.png", author),
            bot: false,
        },
        content: content.to_string(),
    }
}

pub fn direct_message(author: u64, content: &str) -> IncomingMessage {
    IncomingMessage {
        guild_id: None,
        ..message(author, content)
    }
}
