//! Token-bucket rate limiting.
//!
//! One [`RateLimiter`] backs the global per-user cooldown shared by every
//! command; commands may carry an independent [`Cooldown`] of their own.

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serenity::all::{ChannelId, GuildId, UserId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: f64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// `capacity` tokens per `window`, refilled continuously.
pub struct RateLimiter<K> {
    capacity: f64,
    window: f64,
    buckets: DashMap<K, Bucket>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity: f64::from(capacity.max(1)),
            window: window.as_secs_f64().max(f64::EPSILON),
            buckets: DashMap::new(),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Refills the key's bucket up to `now` and tries to take one token.
    /// The refill is recorded even when the call is denied.
    pub fn check(&self, key: K, now: Instant) -> RateDecision {
        let mut bucket = self.buckets.entry(key).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        self.refill(&mut bucket, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateDecision::Allowed
        } else {
            let tokens = bucket.tokens.max(0.0);
            RateDecision::Denied {
                retry_after: (1.0 - tokens) * (self.window / self.capacity),
            }
        }
    }

    /// Tokens the key would have at `now`, without touching its bucket.
    pub fn tokens(&self, key: &K, now: Instant) -> f64 {
        match self.buckets.get(key) {
            Some(bucket) => {
                let mut copy = *bucket;
                self.refill(&mut copy, now);
                copy.tokens
            }
            None => self.capacity,
        }
    }

    /// Forgets buckets idle for a whole window; they would be full again anyway.
    pub fn prune(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        let window = Duration::from_secs_f64(self.window);
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < window);
        before - self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.capacity / self.window)
            .clamp(0.0, self.capacity);
        bucket.last_refill = now;
    }
}

/// Which identity a per-command cooldown is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketScope {
    User,
    /// Falls back to the user outside of guilds.
    Guild,
    Channel,
}

pub struct Cooldown {
    pub rate: u32,
    pub per: Duration,
    pub scope: BucketScope,
    limiter: RateLimiter<u64>,
}

impl Cooldown {
    pub fn new(rate: u32, per: Duration, scope: BucketScope) -> Self {
        Self {
            rate,
            per,
            scope,
            limiter: RateLimiter::new(rate, per),
        }
    }

    pub fn check(
        &self,
        user: UserId,
        guild: Option<GuildId>,
        channel: ChannelId,
        now: Instant,
    ) -> RateDecision {
        let key = match self.scope {
            BucketScope::User => user.get(),
            BucketScope::Guild => guild.map(|g| g.get()).unwrap_or_else(|| user.get()),
            BucketScope::Channel => channel.get(),
        };
        self.limiter.check(key, now)
    }

    pub fn prune(&self, now: Instant) -> usize {
        self.limiter.prune(now)
    }
}

impl std::fmt::Debug for Cooldown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cooldown")
            .field("rate", &self.rate)
            .field("per", &self.per)
            .field("scope", &self.scope)
            .finish()
    }
}
