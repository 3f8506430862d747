use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use governor::DefaultDirectRateLimiter;
use parking_lot::RwLock;
use serde::Serialize;

use super::config::{ResilienceConfig, ResilienceSettings};
use super::middleware::circuit_breaker::{CircuitBreaker, CircuitState};
use super::middleware::rate_limit::direct_limiter;

// ---------------------------------------------------------------------------
// ResilienceState
// ---------------------------------------------------------------------------

/// Limiter and breaker owned by one named operation.
pub struct ResilienceState {
    pub operation: Arc<str>,
    pub config: ResilienceConfig,
    pub limiter: Arc<DefaultDirectRateLimiter>,
    pub breaker: Arc<CircuitBreaker>,
}

impl ResilienceState {
    fn new(operation: &str, config: ResilienceConfig) -> Self {
        Self {
            operation: Arc::from(operation),
            limiter: Arc::new(direct_limiter(&config)),
            breaker: Arc::new(CircuitBreaker::new(operation, &config)),
            config,
        }
    }
}

/// Breaker state of one operation at the time of a [`ResilienceRegistry::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationSnapshot {
    pub operation: String,
    pub state: CircuitState,
}

// ---------------------------------------------------------------------------
// ResilienceRegistry
// ---------------------------------------------------------------------------

/// Process-wide map of operation name to [`ResilienceState`].
///
/// Owned by the composition root and handed to whoever builds resilient
/// endpoints. State is created on first use from the registry's settings and
/// then shared by every endpoint built for the same operation name.
pub struct ResilienceRegistry {
    settings: ResilienceSettings,
    states: DashMap<String, Arc<ResilienceState>>,
    /// Creation order, for deterministic snapshots.
    order: RwLock<Vec<String>>,
}

impl ResilienceRegistry {
    #[must_use]
    pub fn new(settings: ResilienceSettings) -> Self {
        Self {
            settings,
            states: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Returns the state for `operation`, creating it on first use.
    ///
    /// The `order` lock is never taken while a map shard is held.
    pub fn state(&self, operation: &str) -> Arc<ResilienceState> {
        if let Some(existing) = self.states.get(operation) {
            return Arc::clone(existing.value());
        }
        let created = match self.states.entry(operation.to_string()) {
            Entry::Occupied(entry) => return Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let state = Arc::new(ResilienceState::new(
                    operation,
                    self.settings.for_operation(operation),
                ));
                entry.insert(Arc::clone(&state));
                state
            }
        };
        self.order.write().push(operation.to_string());
        created
    }

    /// Returns the state for `operation` if it has been created.
    #[must_use]
    pub fn get(&self, operation: &str) -> Option<Arc<ResilienceState>> {
        self.states.get(operation).map(|s| Arc::clone(s.value()))
    }

    /// Breaker states of every known operation, in creation order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<OperationSnapshot> {
        let names = self.order.read().clone();
        names
            .iter()
            .filter_map(|name| self.get(name))
            .map(|state| OperationSnapshot {
                operation: state.operation.to_string(),
                state: state.breaker.state(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Default for ResilienceRegistry {
    fn default() -> Self {
        Self::new(ResilienceSettings::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_shares_state() {
        let registry = ResilienceRegistry::default();
        let a = registry.state("books.find");
        let b = registry.state("books.find");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a.breaker, &b.breaker));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_are_isolated() {
        let registry = ResilienceRegistry::default();
        let books = registry.state("books.find");
        let albums = registry.state("albums.find");
        assert!(!Arc::ptr_eq(&books.breaker, &albums.breaker));
        assert!(registry.get("books.status").is_none());
    }

    #[test]
    fn applies_per_operation_settings() {
        let settings = ResilienceSettings::from_json(
            r#"{"operations": {"albums.status": {"breakerFailureThreshold": 2}}}"#,
        )
        .unwrap();
        let registry = ResilienceRegistry::new(settings);
        assert_eq!(registry.state("albums.status").config.breaker_failure_threshold, 2);
        assert_eq!(registry.state("albums.find").config.breaker_failure_threshold, 5);
    }

    #[tokio::test]
    async fn snapshot_lists_in_creation_order() {
        let registry = ResilienceRegistry::default();
        registry.state("albums.find");
        registry.state("books.find");
        registry.state("albums.find");

        let states = registry.state("books.find");
        for _ in 0..5 {
            states.breaker.try_acquire().unwrap().failure();
        }

        let snapshot = registry.snapshot();
        assert_eq!(
            snapshot,
            vec![
                OperationSnapshot {
                    operation: "albums.find".to_string(),
                    state: CircuitState::Closed,
                },
                OperationSnapshot {
                    operation: "books.find".to_string(),
                    state: CircuitState::Open,
                },
            ]
        );
    }

    #[test]
    fn concurrent_creation_and_snapshot_make_progress() {
        let registry = Arc::new(ResilienceRegistry::default());
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        for t in 0..2 {
            let registry = Arc::clone(&registry);
            let done = done_tx.clone();
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    registry.state(&format!("op{t}.{i}"));
                }
                done.send(()).unwrap();
            });
        }
        for _ in 0..2 {
            let registry = Arc::clone(&registry);
            let done = done_tx.clone();
            std::thread::spawn(move || {
                for _ in 0..2_000 {
                    registry.snapshot();
                }
                done.send(()).unwrap();
            });
        }
        drop(done_tx);

        for _ in 0..4 {
            done_rx
                .recv_timeout(std::time::Duration::from_secs(10))
                .expect("registry threads stalled");
        }
        assert_eq!(registry.len(), 4_000);
        assert_eq!(registry.snapshot().len(), 4_000);
    }
}
