use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod storage;

pub use storage::MemorySessionStorage;

/// Session data structure for storage backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    /// Session data as JSON object
    pub data: Value,
    /// Session creation timestamp (Unix seconds)
    pub created_at: u64,
    /// Last accessed timestamp (Unix seconds)
    pub last_accessed: u64,
}

impl Default for SessionData {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionData {
    pub fn new() -> Self {
        let now = unix_timestamp();
        Self {
            data: Value::Object(Map::new()),
            created_at: now,
            last_accessed: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed = unix_timestamp();
    }

    pub fn is_expired(&self, idle_timeout_secs: u64) -> bool {
        unix_timestamp().saturating_sub(self.last_accessed) > idle_timeout_secs
    }
}

/// Get current Unix timestamp in seconds
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Abstract session storage backend
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Session data by id; `None` when missing or expired
    async fn get(&self, session_id: &str) -> Result<Option<SessionData>>;

    /// Store session data, expiring after `ttl` of inactivity
    async fn set(&self, session_id: &str, data: &SessionData, ttl: Duration) -> Result<()>;

    async fn delete(&self, session_id: &str) -> Result<()>;

    async fn exists(&self, session_id: &str) -> Result<bool>;

    /// Returns the number of sessions removed
    async fn cleanup_expired(&self) -> Result<usize>;

    /// Generate a new cryptographically secure session ID
    fn generate_id(&self) -> String {
        use rand::distributions::Alphanumeric;
        use rand::{thread_rng, Rng};

        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }

    fn backend_name(&self) -> &'static str;
}

/// One client's session for the duration of a request
///
/// Data is held as a JSON object so it can be handed to templates without
/// conversion. Writes mark the session dirty; nothing reaches the storage
/// backend until [`SessionStore::save`] runs.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    data: Arc<RwLock<Value>>,
    created_at: u64,
    dirty: Arc<Mutex<bool>>,
}

impl Session {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            data: Arc::new(RwLock::new(Value::Object(Map::new()))),
            created_at: unix_timestamp(),
            dirty: Arc::new(Mutex::new(false)),
        }
    }

    pub fn from_data(id: &str, session_data: SessionData) -> Self {
        let data = match session_data.data {
            Value::Object(map) => Value::Object(map),
            _ => Value::Object(Map::new()),
        };

        Self {
            id: id.to_string(),
            data: Arc::new(RwLock::new(data)),
            created_at: session_data.created_at,
            dirty: Arc::new(Mutex::new(false)),
        }
    }

    pub fn to_data(&self) -> Result<SessionData> {
        let data = self
            .data
            .read()
            .map_err(|_| Error::session("Failed to acquire read lock for session data"))?
            .clone();

        Ok(SessionData {
            data,
            created_at: self.created_at,
            last_accessed: unix_timestamp(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set a session value
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        {
            let mut data = self
                .data
                .write()
                .map_err(|_| Error::session("Failed to acquire write lock for session data"))?;
            if let Value::Object(ref mut map) = *data {
                map.insert(key.to_string(), value);
            }
        }
        self.mark_dirty()
    }

    /// Get a session value, `None` when absent or of another shape
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_value(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        let data = self.data.read().ok()?;
        data.get(key).cloned()
    }

    /// Remove a value, returning it
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = {
            let mut data = self.data.write().ok()?;
            match *data {
                Value::Object(ref mut map) => map.remove(key),
                _ => None,
            }
        };

        if removed.is_some() {
            let _ = self.mark_dirty();
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data
            .read()
            .map(|data| data.get(key).is_some())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut data) = self.data.write() {
            *data = Value::Object(Map::new());
        }
        let _ = self.mark_dirty();
    }

    pub fn to_value(&self) -> Value {
        self.data
            .read()
            .map(|data| data.clone())
            .unwrap_or_else(|_| Value::Object(Map::new()))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.lock().map(|d| *d).unwrap_or(false)
    }

    pub fn mark_clean(&self) {
        if let Ok(mut dirty) = self.dirty.lock() {
            *dirty = false;
        }
    }

    fn mark_dirty(&self) -> Result<()> {
        *self
            .dirty
            .lock()
            .map_err(|_| Error::session("Failed to acquire lock for dirty flag"))? = true;
        Ok(())
    }
}

/// Injected handle over a storage backend
///
/// Cheap to clone; every request that touches sessions gets one through
/// the session middleware.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    session_timeout: Duration,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self::with_timeout(storage, Duration::from_secs(30 * 60))
    }

    pub fn with_timeout(storage: Arc<dyn SessionStorage>, session_timeout: Duration) -> Self {
        Self {
            storage,
            session_timeout,
        }
    }

    /// In-memory store, mainly for development and tests
    pub fn memory() -> Self {
        Self::new(Arc::new(MemorySessionStorage::new()))
    }

    pub fn timeout(&self) -> Duration {
        self.session_timeout
    }

    pub fn backend_name(&self) -> &'static str {
        self.storage.backend_name()
    }

    /// Load the session named by the cookie, or start a fresh one
    ///
    /// A storage failure is logged and treated as an empty session under
    /// the same id.
    pub async fn load(&self, session_id: Option<&str>) -> Session {
        let Some(id) = session_id.filter(|id| !id.is_empty()) else {
            return self.create();
        };

        match self.storage.get(id).await {
            Ok(Some(data)) => Session::from_data(id, data),
            Ok(None) => {
                log::debug!("Session {} not found or expired, starting a new one", id);
                self.create()
            }
            Err(e) => {
                log::warn!("Session {} could not be read, continuing empty: {}", id, e);
                Session::new(id)
            }
        }
    }

    pub fn create(&self) -> Session {
        Session::new(&self.storage.generate_id())
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        let data = session.to_data()?;
        self.storage
            .set(session.id(), &data, self.session_timeout)
            .await?;
        session.mark_clean();
        Ok(())
    }

    pub async fn destroy(&self, session_id: &str) -> Result<()> {
        self.storage.delete(session_id).await
    }

    pub async fn cleanup_expired(&self) -> Result<usize> {
        self.storage.cleanup_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStorage;

    #[async_trait]
    impl SessionStorage for BrokenStorage {
        async fn get(&self, _session_id: &str) -> Result<Option<SessionData>> {
            Err(Error::session("backend unavailable"))
        }

        async fn set(&self, _id: &str, _data: &SessionData, _ttl: Duration) -> Result<()> {
            Err(Error::session("backend unavailable"))
        }

        async fn delete(&self, _session_id: &str) -> Result<()> {
            Ok(())
        }

        async fn exists(&self, _session_id: &str) -> Result<bool> {
            Ok(false)
        }

        async fn cleanup_expired(&self) -> Result<usize> {
            Ok(0)
        }

        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    #[test]
    fn test_set_get_remove_tracks_dirty() {
        let session = Session::new("abc");
        assert!(!session.is_dirty());

        session.set("count", 3).unwrap();
        assert!(session.is_dirty());
        assert_eq!(session.get::<i32>("count"), Some(3));
        assert_eq!(session.get::<String>("count"), None);

        session.mark_clean();
        assert_eq!(session.remove("count"), Some(Value::from(3)));
        assert!(session.is_dirty());
        assert!(!session.contains("count"));
        assert_eq!(session.remove("count"), None);
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let store = SessionStore::memory();
        let session = store.load(None).await;
        assert_eq!(session.id().len(), 32);

        session.set("user", "sam").unwrap();
        store.save(&session).await.unwrap();
        assert!(!session.is_dirty());

        let reloaded = store.load(Some(session.id())).await;
        assert_eq!(reloaded.id(), session.id());
        assert_eq!(reloaded.get::<String>("user"), Some("sam".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_id_gets_fresh_session() {
        let store = SessionStore::memory();
        let session = store.load(Some("forged-id")).await;
        assert_ne!(session.id(), "forged-id");
    }

    #[tokio::test]
    async fn test_read_failure_is_empty_session() {
        let store = SessionStore::new(Arc::new(BrokenStorage));
        let session = store.load(Some("abc")).await;
        assert_eq!(session.id(), "abc");
        assert_eq!(session.get_value("anything"), None);

        assert!(store.save(&session).await.is_err());
    }
}
