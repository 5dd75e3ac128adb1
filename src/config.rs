use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub prefix: String,
    pub owner_ids: Vec<u64>,
    /// Operator channel for escalation reports; owners are DMed when unset.
    pub log_channel_id: Option<u64>,
    pub database_url: String,
    pub status_message: String,
    pub description: String,
    pub colour: u32,
    pub creator_id: Option<u64>,

    // Global cooldown shared by every command
    pub global_cooldown_rate: u32,
    pub global_cooldown_per_secs: f64,

    // Timeout settings
    pub http_timeout_secs: u64,
    pub gateway_timeout_secs: u64,

    // Routine announcer settings
    pub school_guild_id: Option<u64>,
    pub announcer_interval: Duration,
}

const DEFAULT_DESCRIPTION: &str =
    "Greetings, I can provide various info and of course, help you run server";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let prefix = env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string());
        if prefix.trim().is_empty() {
            anyhow::bail!("COMMAND_PREFIX must not be empty");
        }

        let global_cooldown_rate: u32 = env::var("GLOBAL_COOLDOWN_RATE")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);
        if global_cooldown_rate == 0 {
            anyhow::bail!("GLOBAL_COOLDOWN_RATE must be at least 1");
        }
        let global_cooldown_per_secs: f64 = env::var("GLOBAL_COOLDOWN_PER_SECS")
            .unwrap_or_else(|_| "6.0".to_string())
            .parse()
            .unwrap_or(6.0);
        if !global_cooldown_per_secs.is_finite() || global_cooldown_per_secs <= 0.0 {
            anyhow::bail!(
                "GLOBAL_COOLDOWN_PER_SECS must be a positive number of seconds, got {}",
                global_cooldown_per_secs
            );
        }
        let announcer_interval = env::var("ANNOUNCER_INTERVAL")
            .ok()
            .and_then(|v| humantime::parse_duration(v.trim()).ok())
            .unwrap_or(Duration::from_secs(6 * 60 * 60));
        if announcer_interval.is_zero() {
            anyhow::bail!("ANNOUNCER_INTERVAL must be longer than zero");
        }

        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            prefix,
            owner_ids: parse_id_list(&env::var("OWNER_IDS").unwrap_or_default())?,
            log_channel_id: env::var("LOG_CHANNEL_ID").ok().and_then(|id| id.parse().ok()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/sneaky.db".to_string()),
            status_message: env::var("STATUS_MESSAGE").unwrap_or_else(|_| "!help".to_string()),
            description: env::var("BOT_DESCRIPTION")
                .unwrap_or_else(|_| DEFAULT_DESCRIPTION.to_string()),
            colour: env::var("BOT_COLOUR")
                .ok()
                .and_then(|c| u32::from_str_radix(c.trim_start_matches('#'), 16).ok())
                .unwrap_or(0x04f2a6),
            creator_id: env::var("CREATOR_ID").ok().and_then(|id| id.parse().ok()),
            global_cooldown_rate,
            global_cooldown_per_secs,
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            gateway_timeout_secs: env::var("GATEWAY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .unwrap_or(15),
            school_guild_id: env::var("SCHOOL_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            announcer_interval,
        })
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owner_ids.contains(&user_id)
    }
}

fn parse_id_list(raw: &str) -> anyhow::Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| anyhow::anyhow!("'{}' is not a valid user id", s))
        })
        .collect()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("prefix", &self.prefix)
            .field("owner_ids", &self.owner_ids)
            .field("log_channel_id", &self.log_channel_id)
            .field("database_url", &self.database_url)
            .field("status_message", &self.status_message)
            .field("colour", &format_args!("{:#08x}", self.colour))
            .field("creator_id", &self.creator_id)
            .field("global_cooldown_rate", &self.global_cooldown_rate)
            .field("global_cooldown_per_secs", &self.global_cooldown_per_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("gateway_timeout_secs", &self.gateway_timeout_secs)
            .field("school_guild_id", &self.school_guild_id)
            .field("announcer_interval", &self.announcer_interval)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
/// Embed field values are capped at 1024 characters
pub const DISCORD_FIELD_LIMIT: usize = 1024;

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        discord_token: "test".to_string(),
        prefix: "!".to_string(),
        owner_ids: vec![1],
        log_channel_id: Some(900),
        database_url: ":memory:".to_string(),
        status_message: "test".to_string(),
        description: "test bot".to_string(),
        colour: 0x04f2a6,
        creator_id: Some(1),
        global_cooldown_rate: 5,
        global_cooldown_per_secs: 6.0,
        http_timeout_secs: 5,
        gateway_timeout_secs: 5,
        school_guild_id: Some(761),
        announcer_interval: Duration::from_secs(6 * 60 * 60),
    }
}
