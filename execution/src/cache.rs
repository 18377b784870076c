//! Redis-backed [`FastCache`].
//!
//! Values are JSON with a TTL. A failed command drops the connection so the next call
//! reconnects; callers treat every error as a miss.

use anyhow::{Context, Result};
use fairreel_types::{
    pf::{PfSession, PfSessionState},
    slot::FreeSpinsSession,
};
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::{config::ValidatedServiceConfig, state::FastCache};

pub struct RedisCache {
    client: redis::Client,
    connection: Mutex<Option<redis::aio::ConnectionManager>>,
    prefix: String,
    ttl: Duration,
}

impl RedisCache {
    /// Entries expire after the service's `cache_ttl`.
    pub fn new(
        url: &str,
        prefix: String,
        config: &ValidatedServiceConfig,
    ) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            prefix,
            ttl: config.cache_ttl,
        })
    }

    fn session_key(&self, id: Uuid) -> String {
        format!("{}pf:session:{id}", self.prefix)
    }

    fn player_key(&self, player_id: Uuid) -> String {
        format!("{}pf:player:{player_id}", self.prefix)
    }

    fn free_spins_key(&self, id: Uuid) -> String {
        format!("{}free_spins:{id}", self.prefix)
    }

    async fn ensure_connection(
        &self,
    ) -> Result<MutexGuard<'_, Option<redis::aio::ConnectionManager>>> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            let manager = self
                .client
                .get_connection_manager()
                .await
                .context("redis connection failed")?;
            *guard = Some(manager);
        }
        Ok(guard)
    }

    async fn get_raw(&self, key: String) -> Result<Option<String>> {
        let mut guard = self.ensure_connection().await?;
        let Some(conn) = guard.as_mut() else {
            return Ok(None);
        };
        let result: redis::RedisResult<Option<String>> = conn.get(&key).await;
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                *guard = None;
                Err(err).with_context(|| format!("redis get {key}"))
            }
        }
    }

    async fn set_raw(&self, key: String, value: String) -> Result<()> {
        let mut guard = self.ensure_connection().await?;
        let Some(conn) = guard.as_mut() else {
            return Ok(());
        };
        let ttl = self.ttl.as_secs().max(1);
        let result: redis::RedisResult<()> = conn.set_ex(&key, value, ttl).await;
        if let Err(err) = result {
            *guard = None;
            return Err(err).with_context(|| format!("redis set {key}"));
        }
        Ok(())
    }

    async fn del_raw(&self, key: String) -> Result<()> {
        let mut guard = self.ensure_connection().await?;
        let Some(conn) = guard.as_mut() else {
            return Ok(());
        };
        let result: redis::RedisResult<()> = conn.del(&key).await;
        if let Err(err) = result {
            *guard = None;
            return Err(err).with_context(|| format!("redis del {key}"));
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: String) -> Result<Option<T>> {
        match self.get_raw(key).await? {
            Some(value) => Ok(Some(
                serde_json::from_str(&value).context("corrupt cache entry")?,
            )),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize>(&self, key: String, value: &T) -> Result<()> {
        let value = serde_json::to_string(value)?;
        self.set_raw(key, value).await
    }
}

impl FastCache for RedisCache {
    async fn get_session(&self, id: Uuid) -> Result<Option<PfSessionState>> {
        self.get_json(self.session_key(id)).await
    }

    async fn get_player_session(&self, player_id: Uuid) -> Result<Option<PfSessionState>> {
        let Some(id) = self.get_raw(self.player_key(player_id)).await? else {
            return Ok(None);
        };
        let id: Uuid = id.parse().context("corrupt player session pointer")?;
        self.get_session(id).await
    }

    async fn put_session(&self, state: &PfSessionState) -> Result<()> {
        let session = &state.session;
        self.set_json(self.session_key(session.id), state).await?;
        self.set_raw(self.player_key(session.player_id), session.id.to_string())
            .await
    }

    async fn evict_session(&self, session: &PfSession) -> Result<()> {
        self.del_raw(self.session_key(session.id)).await?;
        // Only drop the pointer if it still targets this session.
        if let Some(current) = self.get_raw(self.player_key(session.player_id)).await? {
            if current == session.id.to_string() {
                self.del_raw(self.player_key(session.player_id)).await?;
            }
        }
        Ok(())
    }

    async fn get_free_spins(&self, id: Uuid) -> Result<Option<FreeSpinsSession>> {
        self.get_json(self.free_spins_key(id)).await
    }

    async fn put_free_spins(&self, session: &FreeSpinsSession) -> Result<()> {
        self.set_json(self.free_spins_key(session.id), session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::test_service_config;

    #[test]
    fn test_keys_are_prefixed() {
        let config = test_service_config();
        let cache = RedisCache::new("redis://127.0.0.1:6379", "fairreel:".to_string(), &config)
            .unwrap();
        assert_eq!(cache.ttl, config.cache_ttl);
        assert_eq!(cache.ttl, Duration::from_secs(60));
        let id = Uuid::nil();
        assert_eq!(
            cache.session_key(id),
            format!("fairreel:pf:session:{id}")
        );
        assert_eq!(cache.player_key(id), format!("fairreel:pf:player:{id}"));
        assert_eq!(cache.free_spins_key(id), format!("fairreel:free_spins:{id}"));
    }
}
