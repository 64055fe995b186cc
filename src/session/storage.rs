use crate::error::Result;
use crate::session::{unix_timestamp, SessionData, SessionStorage};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// In-memory session storage on DashMap
///
/// Suitable for single-process deployments and tests. Idle sessions expire
/// on read; a background task sweeps the rest when a tokio runtime is
/// available at construction time.
#[derive(Clone)]
pub struct MemorySessionStorage {
    sessions: Arc<DashMap<String, SessionData>>,
    session_timeout: Duration,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::with_timeout(
            Duration::from_secs(30 * 60), // 30 minutes timeout
            Duration::from_secs(5 * 60),  // 5 minutes cleanup interval
        )
    }

    pub fn with_timeout(session_timeout: Duration, cleanup_interval: Duration) -> Self {
        let storage = Self {
            sessions: Arc::new(DashMap::new()),
            session_timeout,
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => storage.start_cleanup_task(&handle, cleanup_interval),
            Err(_) => log::debug!("No tokio runtime, memory session cleanup runs on demand only"),
        }

        storage
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn remove_expired(sessions: &DashMap<String, SessionData>, timeout_secs: u64) -> usize {
        let expired_ids: Vec<String> = sessions
            .iter()
            .filter(|entry| entry.value().is_expired(timeout_secs))
            .map(|entry| entry.key().clone())
            .collect();

        expired_ids
            .into_iter()
            .filter(|id| sessions.remove(id).is_some())
            .count()
    }

    fn start_cleanup_task(&self, handle: &tokio::runtime::Handle, cleanup_interval: Duration) {
        // weak reference so the task ends once the storage is dropped
        let sessions = Arc::downgrade(&self.sessions);
        let timeout_secs = self.session_timeout.as_secs();

        handle.spawn(async move {
            let mut ticker = interval(cleanup_interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(sessions) = sessions.upgrade() else {
                    break;
                };

                let cleaned_up = Self::remove_expired(&sessions, timeout_secs);
                if cleaned_up > 0 {
                    log::info!("Memory storage cleaned up {} expired sessions", cleaned_up);
                }
            }
        });
    }
}

impl Default for MemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn get(&self, session_id: &str) -> Result<Option<SessionData>> {
        let Some(mut session_data) = self.sessions.get_mut(session_id) else {
            log::debug!("MemoryStorage: Session {} not found", session_id);
            return Ok(None);
        };

        if session_data.is_expired(self.session_timeout.as_secs()) {
            drop(session_data);
            self.sessions.remove(session_id);
            log::debug!("MemoryStorage: Session {} expired and removed", session_id);
            return Ok(None);
        }

        session_data.touch();
        Ok(Some(session_data.clone()))
    }

    async fn set(&self, session_id: &str, data: &SessionData, _ttl: Duration) -> Result<()> {
        log::debug!("MemoryStorage: Storing session {}", session_id);
        self.sessions.insert(session_id.to_string(), data.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|data| !data.is_expired(self.session_timeout.as_secs()))
            .unwrap_or(false))
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let cleaned_up = Self::remove_expired(&self.sessions, self.session_timeout.as_secs());
        if cleaned_up > 0 {
            log::info!("Manual cleanup removed {} expired sessions", cleaned_up);
        }
        Ok(cleaned_up)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
