//  src/db/redis.rs

use std::time::Instant;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};

use crate::utils::errors::ApiError;

/// Thin, cheap-to-clone handle.
#[derive(Clone)]
pub struct RedisPool {
    manager: ConnectionManager,
}

impl RedisPool {
    /// Build once at start-up and share.
    pub async fn new(url: &str) -> Result<Self, ApiError> {
        let client = Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }

    pub async fn ping(&self) -> Result<(), ApiError> {
        let mut con = self.manager.clone();
        redis::cmd("PING").query_async::<_, String>(&mut con).await?;
        Ok(())
    }

    // ─── Helpers ──────────────────────────────────────────────────────────────
    /// `ttl_secs == 0` stores without expiry.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), ApiError> {
        let mut con = self.manager.clone();
        let payload = serde_json::to_string(value)?;

        let started = Instant::now();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(payload);
        if ttl_secs > 0 {
            cmd.arg("EX").arg(ttl_secs);
        }
        cmd.query_async::<_, ()>(&mut con).await?;
        log::debug!("redis SET {key} took {:?}", started.elapsed());
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ApiError> {
        let mut con = self.manager.clone();
        let started = Instant::now();
        let raw: Option<String> = con.get(key).await?;
        log::debug!("redis GET {key} took {:?}", started.elapsed());

        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }
}
