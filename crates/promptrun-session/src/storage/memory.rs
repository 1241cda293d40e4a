//! In-memory history storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use promptrun_core::{Exchange, HistoryStore, SessionId, traits::StorageError};

/// In-memory storage implementation.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, Vec<Exchange>>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of sessions with at least one exchange.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn session_count(&self) -> Result<usize, StorageError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .len())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(&self, session: &SessionId, exchange: &Exchange) -> Result<(), StorageError> {
        self.sessions
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .entry(session.clone())
            .or_default()
            .push(exchange.clone());

        Ok(())
    }

    async fn recent(&self, session: &SessionId, n: usize) -> Result<Vec<Exchange>, StorageError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        Ok(sessions
            .get(session)
            .map(|exchanges| {
                let keep_from = exchanges.len().saturating_sub(n);
                exchanges[keep_from..].to_vec()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recent_window() {
        let store = MemoryStore::new();
        let session = SessionId::new("s");
        for i in 0..5 {
            store
                .append(&session, &Exchange::new(i.to_string(), "", ""))
                .await
                .unwrap();
        }

        let recent = store.recent(&session, 2).await.unwrap();
        let prompts: Vec<_> = recent.iter().map(|e| e.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["3", "4"]);
        assert!(store.recent(&session, 0).await.unwrap().is_empty());
        assert!(store.recent(&SessionId::new("other"), 3).await.unwrap().is_empty());
        assert_eq!(store.session_count().unwrap(), 1);
    }
}
