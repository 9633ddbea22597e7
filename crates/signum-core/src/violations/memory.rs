//! Process-local [`ViolationLog`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Block, Violation, ViolationKey, ViolationLog};
use crate::session::{AssessmentError, Clock, SystemClock};

#[derive(Default)]
struct Entry {
    violations: Vec<Violation>,
    block: Option<Block>,
}

pub struct InMemoryViolationLog {
    entries: Mutex<HashMap<ViolationKey, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryViolationLog {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ViolationKey, Entry>>, AssessmentError> {
        self.entries
            .lock()
            .map_err(|_| AssessmentError::Store("violation log lock poisoned".to_string()))
    }
}

impl Default for InMemoryViolationLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ViolationLog for InMemoryViolationLog {
    async fn record(&self, key: &ViolationKey, violation: Violation) -> Result<usize, AssessmentError> {
        let mut entries = self.lock()?;
        let entry = entries.entry(key.clone()).or_default();
        entry.violations.push(violation);
        Ok(entry.violations.len())
    }

    async fn violations(&self, key: &ViolationKey) -> Result<Vec<Violation>, AssessmentError> {
        Ok(self
            .lock()?
            .get(key)
            .map(|e| e.violations.clone())
            .unwrap_or_default())
    }

    async fn set_block(&self, key: &ViolationKey, block: Block) -> Result<(), AssessmentError> {
        self.lock()?.entry(key.clone()).or_default().block = Some(block);
        Ok(())
    }

    async fn block(&self, key: &ViolationKey) -> Result<Option<Block>, AssessmentError> {
        Ok(self.lock()?.get(key).and_then(|e| e.block))
    }

    async fn clear(&self, key: &ViolationKey) -> Result<usize, AssessmentError> {
        Ok(self
            .lock()?
            .remove(key)
            .map(|e| e.violations.len())
            .unwrap_or(0))
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
