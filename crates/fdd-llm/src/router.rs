//! Model routing: complexity-tiered primary selection, fallback chains,
//! the process-wide concurrency gate, and per-backend circuit breakers.

use fdd_core::catalog::{complexity_for, Complexity};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::backend::{BackendId, ModelBackend};

/// Explicit retry policy for transient backend errors: exponential
/// backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base · 2^(n-1),
    /// capped, with up to one second of clock-derived jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let scaled = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent));
        let capped = scaled.min(self.max_delay);

        let jitter_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::from(d.subsec_nanos()) % 1000)
            .unwrap_or(0);
        capped + Duration::from_millis(jitter_ms)
    }
}

/// Circuit-breaker tuning: how many consecutive failures open the
/// breaker, and how long it stays open.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cool_off: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cool_off: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Routes sections to model backends and gates concurrency.
pub struct ModelRouter {
    backends: Vec<Arc<dyn ModelBackend>>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    retry: RetryPolicy,
    breaker_config: CircuitBreakerConfig,
    health: Mutex<HashMap<BackendId, bool>>,
    breakers: Mutex<HashMap<BackendId, BreakerState>>,
}

impl ModelRouter {
    pub fn new(backends: Vec<Arc<dyn ModelBackend>>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            backends,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            retry: RetryPolicy::default(),
            breaker_config: CircuitBreakerConfig::default(),
            health: Mutex::new(HashMap::new()),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Primary backend for an item, by complexity tier: simple tabular
    /// items go to the free local model, everything else to the large
    /// hosted model.
    pub fn primary_for(item_no: u8) -> BackendId {
        match complexity_for(item_no) {
            Complexity::Simple => BackendId::Ollama,
            Complexity::Complex | Complexity::Medium => BackendId::Gemini,
        }
    }

    fn chain_order(primary: BackendId) -> [BackendId; 3] {
        match primary {
            BackendId::Ollama => [BackendId::Ollama, BackendId::Gemini, BackendId::OpenAi],
            BackendId::Gemini => [BackendId::Gemini, BackendId::Ollama, BackendId::OpenAi],
            BackendId::OpenAi => [BackendId::OpenAi, BackendId::Gemini, BackendId::Ollama],
        }
    }

    /// Mark a backend healthy or unhealthy; unhealthy backends drop out
    /// of fallback chains until flipped back.
    pub fn set_health(&self, id: BackendId, healthy: bool) {
        self.health.lock().expect("health lock").insert(id, healthy);
    }

    fn is_healthy(&self, id: BackendId) -> bool {
        *self.health.lock().expect("health lock").get(&id).unwrap_or(&true)
    }

    /// Record a successful call: closes the backend's breaker.
    pub fn record_success(&self, id: BackendId) {
        let mut breakers = self.breakers.lock().expect("breaker lock");
        breakers.insert(id, BreakerState::default());
    }

    /// Record a failed call; enough consecutive failures open the breaker
    /// for the cool-off window.
    pub fn record_failure(&self, id: BackendId) {
        let mut breakers = self.breakers.lock().expect("breaker lock");
        let state = breakers.entry(id).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.breaker_config.failure_threshold {
            state.open_until = Some(Instant::now() + self.breaker_config.cool_off);
            warn!(backend = %id, failures = state.consecutive_failures, "circuit breaker opened");
        }
    }

    fn breaker_open(&self, id: BackendId) -> bool {
        let mut breakers = self.breakers.lock().expect("breaker lock");
        let Some(state) = breakers.get_mut(&id) else {
            return false;
        };
        match state.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                // Cool-off elapsed: allow a probe attempt.
                state.open_until = None;
                state.consecutive_failures = 0;
                false
            }
            None => false,
        }
    }

    /// Ordered fallback chain for an item: the primary (or an explicit
    /// preference) followed by the alternates, with unavailable,
    /// unhealthy, and cooling-off backends filtered out.
    pub fn fallback_chain(
        &self,
        item_no: u8,
        preference: Option<BackendId>,
    ) -> Vec<Arc<dyn ModelBackend>> {
        let primary = preference.unwrap_or_else(|| Self::primary_for(item_no));
        let mut chain = Vec::with_capacity(3);
        for id in Self::chain_order(primary) {
            let Some(backend) = self.backends.iter().find(|b| b.id() == id) else {
                continue;
            };
            if !backend.is_available() {
                debug!(backend = %id, "skipping backend without credentials");
                continue;
            }
            if !self.is_healthy(id) {
                debug!(backend = %id, "skipping unhealthy backend");
                continue;
            }
            if self.breaker_open(id) {
                debug!(backend = %id, "skipping backend in cool-off");
                continue;
            }
            chain.push(Arc::clone(backend));
        }
        chain
    }

    /// Acquire one slot of the process-wide extraction gate. Waiters are
    /// served in FIFO order; the permit releases on drop.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("extraction semaphore closed")
    }

    /// Permits currently available (for tests and status reporting).
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockBackend;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn router_with_all() -> ModelRouter {
        ModelRouter::new(
            vec![
                Arc::new(MockBackend::new(BackendId::Ollama, "llama3.2")),
                Arc::new(MockBackend::new(BackendId::Gemini, "gemini-1.5-pro")),
                Arc::new(MockBackend::new(BackendId::OpenAi, "gpt-4-turbo-preview")),
            ],
            5,
        )
    }

    #[test]
    fn primary_follows_complexity_tiers() {
        assert_eq!(ModelRouter::primary_for(5), BackendId::Ollama);
        assert_eq!(ModelRouter::primary_for(6), BackendId::Ollama);
        assert_eq!(ModelRouter::primary_for(7), BackendId::Ollama);
        assert_eq!(ModelRouter::primary_for(19), BackendId::Gemini);
        assert_eq!(ModelRouter::primary_for(21), BackendId::Gemini);
        assert_eq!(ModelRouter::primary_for(20), BackendId::Gemini);
        assert_eq!(ModelRouter::primary_for(2), BackendId::Gemini);
    }

    #[test]
    fn chain_starts_with_primary() {
        let router = router_with_all();
        let chain = router.fallback_chain(5, None);
        let ids: Vec<BackendId> = chain.iter().map(|b| b.id()).collect();
        assert_eq!(ids, vec![BackendId::Ollama, BackendId::Gemini, BackendId::OpenAi]);

        let chain = router.fallback_chain(19, None);
        let ids: Vec<BackendId> = chain.iter().map(|b| b.id()).collect();
        assert_eq!(ids, vec![BackendId::Gemini, BackendId::Ollama, BackendId::OpenAi]);
    }

    #[test]
    fn preference_overrides_primary() {
        let router = router_with_all();
        let chain = router.fallback_chain(5, Some(BackendId::OpenAi));
        assert_eq!(chain[0].id(), BackendId::OpenAi);
    }

    #[test]
    fn unavailable_backends_are_skipped() {
        let router = ModelRouter::new(
            vec![
                Arc::new(MockBackend::new(BackendId::Ollama, "llama3.2")),
                Arc::new(MockBackend::new(BackendId::Gemini, "gemini-1.5-pro").unavailable()),
                Arc::new(MockBackend::new(BackendId::OpenAi, "gpt-4-turbo-preview")),
            ],
            5,
        );
        let chain = router.fallback_chain(19, None);
        let ids: Vec<BackendId> = chain.iter().map(|b| b.id()).collect();
        assert_eq!(ids, vec![BackendId::Ollama, BackendId::OpenAi]);
    }

    #[test]
    fn unhealthy_backends_are_skipped_until_restored() {
        let router = router_with_all();
        router.set_health(BackendId::Gemini, false);
        let ids: Vec<BackendId> = router
            .fallback_chain(19, None)
            .iter()
            .map(|b| b.id())
            .collect();
        assert!(!ids.contains(&BackendId::Gemini));

        router.set_health(BackendId::Gemini, true);
        let ids: Vec<BackendId> = router
            .fallback_chain(19, None)
            .iter()
            .map(|b| b.id())
            .collect();
        assert!(ids.contains(&BackendId::Gemini));
    }

    #[test]
    fn breaker_opens_after_consecutive_failures_and_recovers() {
        let router = router_with_all().with_breaker_config(CircuitBreakerConfig {
            failure_threshold: 2,
            cool_off: Duration::from_millis(0),
        });

        router.record_failure(BackendId::Ollama);
        assert!(router.fallback_chain(5, None).iter().any(|b| b.id() == BackendId::Ollama));

        router.record_failure(BackendId::Ollama);
        // Zero cool-off: the breaker opens and immediately half-opens on
        // the next check, so the backend stays reachable as a probe.
        assert!(router.fallback_chain(5, None).iter().any(|b| b.id() == BackendId::Ollama));

        router.record_success(BackendId::Ollama);
        assert!(router.fallback_chain(5, None).iter().any(|b| b.id() == BackendId::Ollama));
    }

    #[test]
    fn breaker_blocks_during_cool_off() {
        let router = router_with_all().with_breaker_config(CircuitBreakerConfig {
            failure_threshold: 1,
            cool_off: Duration::from_secs(3600),
        });
        router.record_failure(BackendId::Gemini);
        let ids: Vec<BackendId> = router
            .fallback_chain(19, None)
            .iter()
            .map(|b| b.id())
            .collect();
        assert_eq!(ids, vec![BackendId::Ollama, BackendId::OpenAi]);
    }

    #[test]
    fn retry_delays_grow_and_cap() {
        let policy = RetryPolicy::default();
        let first = policy.delay_for(1);
        let second = policy.delay_for(2);
        let tenth = policy.delay_for(10);

        assert!(first >= Duration::from_secs(4) && first < Duration::from_secs(6));
        assert!(second >= Duration::from_secs(8) && second < Duration::from_secs(10));
        assert!(tenth >= Duration::from_secs(60) && tenth < Duration::from_secs(62));
    }

    #[tokio::test]
    async fn semaphore_bounds_in_flight_calls() {
        let router = Arc::new(ModelRouter::new(
            vec![Arc::new(
                MockBackend::new(BackendId::Ollama, "llama3.2").with_default_response(json!({})),
            )],
            2,
        ));

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let router = Arc::clone(&router);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = router.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2, "peak was {}", peak.load(Ordering::SeqCst));
        assert_eq!(router.available_permits(), 2);
    }
}
