//! Number Store
//!
//! Key/value storage adapter injected into the demo workflow.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::execution::BoxError;

/// Storage for computed numbers, keyed by instance id.
#[async_trait]
pub trait NumberStore: Send + Sync {
    async fn put_number(&self, key: &str, value: i64) -> Result<(), BoxError>;

    async fn get_number(&self, key: &str) -> Option<i64>;
}

/// In-memory [`NumberStore`].
#[derive(Debug, Default)]
pub struct MemoryNumberStore {
    numbers: RwLock<HashMap<String, i64>>,
}

impl MemoryNumberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.numbers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NumberStore for MemoryNumberStore {
    async fn put_number(&self, key: &str, value: i64) -> Result<(), BoxError> {
        self.numbers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get_number(&self, key: &str) -> Option<i64> {
        self.numbers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryNumberStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get_number("a").await, None);

        store.put_number("a", 8).await.unwrap();
        store.put_number("a", 27).await.unwrap();
        assert_eq!(store.get_number("a").await, Some(27));
        assert_eq!(store.len(), 1);
    }
}
