//! Process-local [`SessionStore`] backed by a `Mutex<HashMap>`.
//!
//! Suitable for a single server process. Sessions do not survive a restart
//! and are not shared between processes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AssessmentError, Clock, SessionStore, SystemClock};

pub struct InMemorySessionStore<T> {
    sessions: Mutex<HashMap<String, T>>,
    clock: Arc<dyn Clock>,
}

impl<T> InMemorySessionStore<T> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, T>>, AssessmentError> {
        self.sessions
            .lock()
            .map_err(|_| AssessmentError::Store("session table lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for InMemorySessionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> SessionStore<T> for InMemorySessionStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn put(&self, session_id: &str, session: T) -> Result<(), AssessmentError> {
        self.lock()?.insert(session_id.to_string(), session);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<T>, AssessmentError> {
        Ok(self.lock()?.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, AssessmentError> {
        Ok(self.lock()?.remove(session_id).is_some())
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
