//! Named circuit breakers.
//!
//! Breakers are created on first use from `[breakers.<name>]`, falling back
//! to `[breakers.default]`, and live for the life of the registry.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::BreakersConfig;
use crate::resilience::circuit_breaker::{
    BreakerSnapshot, BreakerState, CircuitBreaker, TransitionCallback,
};

pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: BreakersConfig,
    on_state_change: Option<TransitionCallback>,
}

impl BreakerRegistry {
    pub fn new(config: BreakersConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
            on_state_change: None,
        }
    }

    /// Callback attached to every breaker this registry creates.
    pub fn with_callback(mut self, callback: TransitionCallback) -> Self {
        self.on_state_change = Some(callback);
        self
    }

    /// The breaker for `name`, created on first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return breaker.clone();
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self.config.for_name(name);
                let breaker = CircuitBreaker::from_config(name, config);
                if let Some(callback) = &self.on_state_change {
                    breaker.set_on_state_change(callback.clone());
                }
                tracing::debug!(
                    breaker = %name,
                    failure_threshold = config.failure_threshold,
                    reset_timeout_ms = config.reset_timeout_ms,
                    "Circuit breaker created"
                );
                Arc::new(breaker)
            })
            .clone()
    }

    pub fn snapshots(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    /// Breakers currently reporting Open.
    pub fn open_count(&self) -> usize {
        self.breakers
            .iter()
            .filter(|entry| entry.value().state() == BreakerState::Open)
            .count()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
