//! In-process key-value store.
//!
//! Supports the string subset the gateway exercises locally: PING, ECHO,
//! GET, SET, DEL, EXISTS and INCR. Anything else gets the same
//! `unknown command` reply a real store would send.

use super::{Backend, BackendFuture};
use crate::protocol::{Command, RespValue};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<HashMap<Bytes, Bytes>>,
}

impl MemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys stored.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Direct read, bypassing the command path.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.data.read().get(key).cloned()
    }

    /// Apply a command synchronously.
    pub fn apply(&self, cmd: &Command) -> RespValue {
        let args = cmd.args();
        match cmd.verb() {
            "PING" => match args {
                [] => RespValue::simple_string("PONG"),
                [msg] => RespValue::BulkString(msg.clone()),
                _ => wrong_arity("ping"),
            },
            "ECHO" => match args {
                [msg] => RespValue::BulkString(msg.clone()),
                _ => wrong_arity("echo"),
            },
            "GET" => match args {
                [key] => self
                    .data
                    .read()
                    .get(key)
                    .cloned()
                    .map_or(RespValue::Null, RespValue::BulkString),
                _ => wrong_arity("get"),
            },
            "SET" => match args {
                [key, value] => {
                    self.data.write().insert(key.clone(), value.clone());
                    RespValue::ok()
                }
                _ => wrong_arity("set"),
            },
            "DEL" if !args.is_empty() => {
                let mut data = self.data.write();
                let removed = args.iter().filter(|k| data.remove(*k).is_some()).count();
                RespValue::Integer(removed as i64)
            }
            "DEL" => wrong_arity("del"),
            "EXISTS" if !args.is_empty() => {
                let data = self.data.read();
                let found = args.iter().filter(|k| data.contains_key(*k)).count();
                RespValue::Integer(found as i64)
            }
            "EXISTS" => wrong_arity("exists"),
            "INCR" => match args {
                [key] => self.incr(key),
                _ => wrong_arity("incr"),
            },
            other => RespValue::err(format!(
                "unknown command '{}'",
                other.to_ascii_lowercase()
            )),
        }
    }

    fn incr(&self, key: &Bytes) -> RespValue {
        let mut data = self.data.write();
        let current = match data.get(key) {
            None => 0,
            Some(raw) => match std::str::from_utf8(raw).ok().and_then(|s| s.parse::<i64>().ok()) {
                Some(n) => n,
                None => return RespValue::err("value is not an integer or out of range"),
            },
        };
        let Some(next) = current.checked_add(1) else {
            return RespValue::err("increment or decrement would overflow");
        };
        data.insert(key.clone(), Bytes::from(next.to_string()));
        RespValue::Integer(next)
    }
}

fn wrong_arity(name: &str) -> RespValue {
    RespValue::err(format!("wrong number of arguments for '{}' command", name))
}

impl Backend for MemoryBackend {
    fn execute(&self, cmd: Command) -> BackendFuture<'_> {
        Box::pin(async move { Ok(self.apply(&cmd)) })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
