use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Serialize, de::DeserializeOwned};

/// JSON values in Redis under a service-wide key namespace. Every failure is
/// logged and treated as a miss so the cache can never fail a request.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    namespace: &'static str,
}

impl RedisCache {
    pub async fn new(redis_url: &str, namespace: &'static str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self { conn, namespace })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let output: Result<Option<String>, _> = conn.get(&key).await;

        match output {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => {
                    tracing::debug!("Cache hit: {key}");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!("Cache deserialize error for {key}: {e}");
                    None
                }
            },
            Ok(None) => {
                tracing::debug!("Cache miss: {key}");
                None
            }
            Err(e) => {
                tracing::warn!("Cache get error for {key}: {e}");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) {
        let key = self.key(key);
        let mut conn = self.conn.clone();

        match serde_json::to_string(value) {
            Ok(json) => {
                let output: Result<(), _> = conn.set_ex(&key, &json, ttl_seconds).await;
                if let Err(e) = output {
                    tracing::warn!("Cache set error for {key}: {e}");
                }
            }
            Err(e) => {
                tracing::warn!("Cache serialize error for {key}: {e}");
            }
        }
    }
}
