use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store not initialized")]
    NotInitialized,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Short-lived key/value store backing OTPs, signup drafts, password-reset
/// tokens and session revocation markers. Keys are namespaced strings,
/// values JSON blobs, lifetime handled by redis TTL.
#[derive(Clone)]
pub struct CacheStore {
    conn: ConnectionManager,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

static STORE: OnceLock<CacheStore> = OnceLock::new();

/// Connect the process-wide cache store. Called once from main.
pub async fn init_store(redis_url: &str) -> Result<CacheStore, CacheError> {
    let client = redis::Client::open(redis_url)?;
    let conn = ConnectionManager::new(client).await?;
    info!("Connected to cache store");
    let store = CacheStore { conn };
    let _ = STORE.set(store.clone());
    Ok(store)
}

pub fn store() -> Result<CacheStore, CacheError> {
    STORE.get().cloned().ok_or(CacheError::NotInitialized)
}

impl CacheStore {
    pub async fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, CacheError> {
        let data: Option<String> = self.conn.get(key).await?;
        match data {
            Some(json) => {
                debug!("cache hit: {}", key);
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => {
                debug!("cache miss: {}", key);
                Ok(None)
            }
        }
    }

    pub async fn set<T: Serialize>(
        &mut self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        self.conn.set_ex::<_, _, ()>(key, json, ttl.as_secs()).await?;
        Ok(())
    }

    /// Entries are explicitly deleted after consumption (one-shot tokens).
    pub async fn delete(&mut self, key: &str) -> Result<(), CacheError> {
        self.conn.del::<_, ()>(key).await?;
        Ok(())
    }

    pub async fn exists(&mut self, key: &str) -> Result<bool, CacheError> {
        Ok(self.conn.exists(key).await?)
    }
}

/// Key namespaces. Kept in one place so flows that write and flows that
/// consume agree on the exact key shape.
pub struct CacheKeys;

impl CacheKeys {
    pub fn signup_draft(email: &str) -> String {
        format!("signup:{}", email.to_lowercase())
    }

    pub fn signup_otp(email: &str) -> String {
        format!("otp:signup:{}", email.to_lowercase())
    }

    pub fn password_reset(token_digest: &str) -> String {
        format!("pwreset:{}", token_digest)
    }

    pub fn revoked_session(jti: &str) -> String {
        format!("session:revoked:{}", jti)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_and_case_folded() {
        assert_eq!(CacheKeys::signup_draft("User@Example.com"), "signup:user@example.com");
        assert_eq!(CacheKeys::signup_otp("a@b.c"), "otp:signup:a@b.c");
        assert!(CacheKeys::password_reset("abc").starts_with("pwreset:"));
    }
}
