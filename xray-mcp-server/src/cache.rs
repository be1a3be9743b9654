//! Project metadata cache
//!
//! Keeps the issue types of each project for a configurable TTL so that
//! creating several tests, plans or executions in a row resolves the Xray
//! issue type with a single create-metadata call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Metadata cache with TTL management
#[derive(Debug)]
pub struct MetadataCache {
    /// Issue types per project key
    project_issue_types: RwLock<HashMap<String, CacheEntry<Vec<IssueTypeInfo>>>>,

    ttl: Duration,
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    created_at: Instant,
}

/// Issue type available in a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTypeInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subtask: bool,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

impl MetadataCache {
    /// Create a new metadata cache with the given TTL
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            project_issue_types: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Start background cleanup task
    pub fn start_cleanup_task(self: Arc<Self>) -> JoinHandle<()> {
        // Cleanup twice as often as TTL, never in a busy loop
        let cleanup_interval = (self.ttl / 2).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);
            loop {
                interval.tick().await;
                self.cleanup_expired();
            }
        })
    }

    fn cleanup_expired(&self) {
        let mut entries = self
            .project_issue_types
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(self.ttl));
        let cleaned = before - entries.len();

        if cleaned > 0 {
            debug!("Cleaned {} expired cache entries", cleaned);
        }
    }

    /// Get issue types for a project
    pub fn get_project_issue_types(&self, project_key: &str) -> Option<Vec<IssueTypeInfo>> {
        let entries = self
            .project_issue_types
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(project_key)?;

        if entry.is_expired(self.ttl) {
            None
        } else {
            Some(entry.value.clone())
        }
    }

    /// Set issue types for a project
    pub fn set_project_issue_types(&self, project_key: String, issue_types: Vec<IssueTypeInfo>) {
        self.project_issue_types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(project_key, CacheEntry::new(issue_types));
    }

    /// Get cache statistics
    pub fn get_stats(&self) -> CacheStats {
        let project_issue_types_count = self
            .project_issue_types
            .read()
            .map(|m| m.len())
            .unwrap_or(0);

        CacheStats {
            project_issue_types_count,
            ttl_seconds: self.ttl.as_secs(),
        }
    }

    /// Clear all cache entries
    pub fn clear_all(&self) {
        info!("Clearing all cache entries");
        self.project_issue_types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub project_issue_types_count: usize,
    pub ttl_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue_type(id: &str, name: &str) -> IssueTypeInfo {
        IssueTypeInfo {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            subtask: false,
        }
    }

    #[test]
    fn test_cache_entry_expiration() {
        let entry = CacheEntry::new("test_value".to_string());

        // Should not be expired immediately
        assert!(!entry.is_expired(Duration::from_secs(1)));

        // Should be expired with zero TTL
        std::thread::sleep(Duration::from_millis(5));
        assert!(entry.is_expired(Duration::from_secs(0)));
    }

    #[test]
    fn test_issue_type_cache() {
        let cache = MetadataCache::new(300);
        assert!(cache.get_project_issue_types("XT").is_none());

        cache.set_project_issue_types(
            "XT".to_string(),
            vec![issue_type("10001", "Test"), issue_type("10002", "Test Plan")],
        );

        let types = cache.get_project_issue_types("XT").unwrap();
        assert_eq!(types.len(), 2);
        assert_eq!(types[1].name, "Test Plan");
        assert!(cache.get_project_issue_types("OTHER").is_none());
    }

    #[test]
    fn test_cache_stats_and_clear() {
        let cache = MetadataCache::new(300);
        assert_eq!(cache.get_stats().project_issue_types_count, 0);
        assert_eq!(cache.get_stats().ttl_seconds, 300);

        cache.set_project_issue_types("XT".to_string(), vec![issue_type("1", "Test")]);
        assert_eq!(cache.get_stats().project_issue_types_count, 1);

        cache.clear_all();
        assert_eq!(cache.get_stats().project_issue_types_count, 0);
    }

    #[tokio::test]
    async fn test_cache_expiration() {
        let cache = Arc::new(MetadataCache::new(1)); // 1 second TTL

        cache.set_project_issue_types("XT".to_string(), vec![issue_type("1", "Test")]);
        assert!(cache.get_project_issue_types("XT").is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(cache.get_project_issue_types("XT").is_none());
        cache.cleanup_expired();
        assert_eq!(cache.get_stats().project_issue_types_count, 0);
    }
}
