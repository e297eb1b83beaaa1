//! Command classification.
//!
//! Maps a verb to the routing category the gateway dispatches on. The
//! built-in tables cover the Redis 3.2 command set and are disjoint: every
//! verb is in at most one of [`READ_VERBS`], [`WRITE_VERBS`] and
//! [`BLACKLISTED_VERBS`]. Verbs in none of them are [`Classification::Unknown`].
//!
//! A [`Resolver`] decides the classification for a session. The default
//! resolver never fails; custom resolvers may return an error, which is
//! replied to the client and ends the session.

use crate::core::error::{GatewayError, GatewayResult};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Routing category of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Classification {
    /// Not in any table.
    Unknown = 0,
    /// Does not modify the keyspace.
    Read = 1,
    /// Modifies the keyspace; goes through the log.
    Write = 2,
    /// Refused by policy.
    Blacklisted = 3,
    /// Reserved for custom resolvers; routed like any other class.
    Silenced = 4,
    /// Reserved for custom resolvers; routed like any other class.
    Internal = 5,
}

impl Classification {
    /// Lowercase name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Read => "read",
            Self::Write => "write",
            Self::Blacklisted => "blacklisted",
            Self::Silenced => "silenced",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verbs that only read.
pub const READ_VERBS: &[&str] = &[
    "BITCOUNT", "BITPOS", "GET", "GETBIT", "GETRANGE", "MGET", "STRLEN",
    "SCARD", "SDIFF", "SINTER", "SISMEMBER", "SMEMBERS", "SRANDMEMBER", "SUNION", "SSCAN",
    "ZCARD", "ZCOUNT", "ZLEXCOUNT", "ZRANGE", "ZRANGEBYLEX", "ZREVRANGEBYLEX",
    "ZRANGEBYSCORE", "ZRANK", "ZREVRANGE", "ZREVRANGEBYSCORE", "ZREVRANK", "ZSCORE", "ZSCAN",
    "HEXISTS", "HGET", "HGETALL", "HKEYS", "HLEN", "HMGET", "HVALS", "HSTRLEN", "HSCAN",
    "LINDEX", "LLEN", "LRANGE",
    "GEOHASH", "GEOPOS", "GEODIST", "GEORADIUS", "GEORADIUSBYMEMBER",
    "DUMP", "EXISTS", "KEYS", "PTTL", "RANDOMKEY", "SORT", "TTL", "TYPE", "SCAN",
    "ECHO", "PING", "TIME",
];

/// Verbs that modify the keyspace.
pub const WRITE_VERBS: &[&str] = &[
    "GEOADD",
    "HDEL", "HINCRBY", "HINCRBYFLOAT", "HMSET", "HSET", "HSETNX",
    "PFADD", "PFMERGE",
    "DEL", "EXPIRE", "EXPIREAT", "PERSIST", "PEXPIRE", "PEXPIREAT", "RENAME", "RENAMENX",
    "RESTORE",
    "LINSERT", "LPOP", "LPUSH", "LPUSHX", "LREM", "LSET", "LTRIM", "RPOP", "RPOPLPUSH",
    "RPUSH", "RPUSHX",
    "SADD", "SDIFFSTORE", "SINTERSTORE", "SMOVE", "SPOP", "SREM", "SUNIONSTORE",
    "ZADD", "ZINCRBY", "ZINTERSTORE", "ZREM", "ZREMRANGEBYLEX", "ZREMRANGEBYRANK",
    "ZREMRANGEBYSCORE", "ZUNIONSTORE",
    "APPEND", "BITFIELD", "BITOP", "DECR", "DECRBY", "INCR", "INCRBY", "INCRBYFLOAT",
    "MSET", "MSETNX", "PSETEX", "SET", "SETBIT", "SETEX", "SETNX", "SETRANGE",
];

/// Verbs refused by policy: connection state, blocking, pub/sub, scripting,
/// transactions and server administration.
pub const BLACKLISTED_VERBS: &[&str] = &[
    "AUTH",
    "CLUSTER", "READONLY", "READWRITE",
    "MIGRATE", "MOVE", "OBJECT", "WAIT",
    "BLPOP", "BRPOP", "BRPOPLPUSH",
    "PUNSUBSCRIBE", "PUBSUB", "PUBLISH", "SUBSCRIBE", "UNSUBSCRIBE",
    "EVAL", "EVALSHA", "SCRIPT",
    "CLIENT", "COMMAND", "DBSIZE", "DEBUG", "BGWRITEAOF", "BGSAVE", "CONFIG", "FLUSHALL",
    "FLUSHDB", "INFO", "LASTSAVE", "MONITOR", "ROLE", "SAVE", "SHUTDOWN", "SLAVEOF",
    "SLOWLOG", "SYNC",
    "GETSET",
    "DISCARD", "EXEC", "MULTI", "UNWATCH", "WATCH",
];

static TABLE: LazyLock<HashMap<&'static str, Classification>> = LazyLock::new(|| {
    let mut table = HashMap::with_capacity(
        READ_VERBS.len() + WRITE_VERBS.len() + BLACKLISTED_VERBS.len(),
    );
    for (verbs, class) in [
        (READ_VERBS, Classification::Read),
        (WRITE_VERBS, Classification::Write),
        (BLACKLISTED_VERBS, Classification::Blacklisted),
    ] {
        for verb in verbs {
            table.insert(*verb, class);
        }
    }
    table
});

/// Classify a verb with the built-in tables.
///
/// Lowercase input is normalized first, so `get` and `GET` classify the same.
pub fn classify(verb: &str) -> Classification {
    let lookup = |v: &str| TABLE.get(v).copied().unwrap_or(Classification::Unknown);
    if verb.bytes().any(|b| b.is_ascii_lowercase()) {
        lookup(&verb.to_ascii_uppercase())
    } else {
        lookup(verb)
    }
}

/// Decides the classification of an uppercase verb.
pub trait Resolver: Send + Sync {
    /// Resolve a verb. An error is replied to the client and ends the session.
    fn resolve(&self, verb: &str) -> GatewayResult<Classification>;
}

impl<F> Resolver for F
where
    F: Fn(&str) -> GatewayResult<Classification> + Send + Sync,
{
    fn resolve(&self, verb: &str) -> GatewayResult<Classification> {
        self(verb)
    }
}

/// Built-in tables; never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl Resolver for DefaultResolver {
    fn resolve(&self, verb: &str) -> GatewayResult<Classification> {
        Ok(classify(verb))
    }
}

/// Built-in tables, but blacklisted verbs resolve to `Err(Blacklisted)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictResolver;

impl Resolver for StrictResolver {
    fn resolve(&self, verb: &str) -> GatewayResult<Classification> {
        match classify(verb) {
            Classification::Blacklisted => Err(GatewayError::Blacklisted),
            class => Ok(class),
        }
    }
}

/// The resolver a new gateway starts with.
pub fn default_resolver() -> Arc<dyn Resolver> {
    Arc::new(DefaultResolver)
}

/// Resolver that refuses blacklisted verbs before dispatch.
pub fn strict_resolver() -> Arc<dyn Resolver> {
    Arc::new(StrictResolver)
}
