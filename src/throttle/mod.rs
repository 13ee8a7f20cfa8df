//! Per-engine request throttling
//!
//! This module bounds collection concurrency and enforces inter-request
//! delay independently for every engine:
//! - In-flight requests per engine are capped by a semaphore
//! - Successive request starts for one engine are spaced by its delay
//! - Slots release on drop, so a failed fetch never leaks capacity
//!
//! Engines never contend with each other; each has its own budget.

use crate::config::EngineConfig;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Errors produced by the throttle
#[derive(Debug, Error)]
pub enum ThrottleError {
    /// The engine is unknown, disabled, or has a zero concurrency budget
    #[error("Engine {0:?} is not admissible (unknown, disabled, or zero concurrency)")]
    EngineUnavailable(String),
}

/// Runtime budget for one engine
///
/// Invariants: permits taken never exceed `concurrency`; two dispatch stamps
/// are never closer than `delay`. The stamp is only written while holding
/// the dispatch lock, after the required gap has elapsed.
struct EngineBudget {
    concurrency: u32,
    delay: Duration,
    semaphore: Arc<Semaphore>,
    last_dispatch: tokio::sync::Mutex<Option<Instant>>,
}

/// A granted admission for one request
///
/// Holds the engine's semaphore permit for the lifetime of the guarded
/// request. Dropping the slot releases the in-flight count whether the
/// request succeeded or failed; the dispatch stamp is never reset.
pub struct EngineSlot {
    engine: String,
    _permit: OwnedSemaphorePermit,
}

impl EngineSlot {
    /// The engine this slot was granted for
    pub fn engine(&self) -> &str {
        &self.engine
    }
}

/// Concurrency limiter and delay enforcer across all configured engines
pub struct EngineThrottle {
    budgets: HashMap<String, EngineBudget>,
}

impl EngineThrottle {
    /// Builds budgets for every collectable engine in the configuration
    ///
    /// Engines that are disabled or have `concurrency = 0` get no budget and
    /// are refused at admission time.
    pub fn new(engines: &BTreeMap<String, EngineConfig>) -> Self {
        let budgets = engines
            .iter()
            .filter(|(_, cfg)| cfg.is_collectable())
            .map(|(name, cfg)| {
                (
                    name.clone(),
                    EngineBudget {
                        concurrency: cfg.concurrency,
                        delay: Duration::from_millis(cfg.delay_ms),
                        semaphore: Arc::new(Semaphore::new(cfg.concurrency as usize)),
                        last_dispatch: tokio::sync::Mutex::new(None),
                    },
                )
            })
            .collect();

        Self { budgets }
    }

    /// Admits one request for `engine`, waiting for capacity and spacing
    ///
    /// Blocks (without busy-waiting) until the engine has a free in-flight
    /// slot and its delay has elapsed since the previous dispatch start.
    /// On admission the in-flight count is taken and the dispatch time
    /// stamped atomically with respect to other admissions for the engine.
    pub async fn admit(&self, engine: &str) -> Result<EngineSlot, ThrottleError> {
        let budget = self
            .budgets
            .get(engine)
            .ok_or_else(|| ThrottleError::EngineUnavailable(engine.to_string()))?;

        let permit = budget
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ThrottleError::EngineUnavailable(engine.to_string()))?;

        loop {
            let mut last = budget.last_dispatch.lock().await;
            let now = Instant::now();

            let wait = match *last {
                Some(prev) => budget.delay.saturating_sub(now.duration_since(prev)),
                None => Duration::ZERO,
            };

            if wait.is_zero() {
                *last = Some(now);
                break;
            }

            // Another admission stamped too recently; sleep outside the lock
            // and re-check, since a third task may stamp in the meantime.
            drop(last);
            tokio::time::sleep(wait).await;
        }

        tracing::trace!("Admitted request for engine {}", engine);

        Ok(EngineSlot {
            engine: engine.to_string(),
            _permit: permit,
        })
    }

    /// Whether the engine has an admission budget at all
    pub fn is_admissible(&self, engine: &str) -> bool {
        self.budgets.contains_key(engine)
    }

    /// Current in-flight count for an engine (0 for unknown engines)
    pub fn in_flight(&self, engine: &str) -> usize {
        self.budgets
            .get(engine)
            .map(|b| b.concurrency as usize - b.semaphore.available_permits())
            .unwrap_or(0)
    }
}
