//! Event Waits
//!
//! Per-event-type suspension points backing `step.wait_for_event`. Each
//! pending wait owns a slot with its own [`SuspensionGate`]. Exactly one of
//! `send_event` or `trigger_timeout` resolves a slot, and the single waiter
//! consumes it on wake-up.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::error::StepError;
use super::gate::SuspensionGate;
use crate::workflow::config::WorkflowDuration;

/// Errors from delivering an event to an instance.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Instance does not have a pending wait for event type '{0}'")]
    NoPendingWait(String),

    #[error("Failed to serialize payload for event '{event_type}': {source}")]
    Serialize {
        event_type: String,
        source: serde_json::Error,
    },
}

/// Options for `wait_for_event`.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitOptions {
    pub event_type: String,
    pub timeout: Option<WorkflowDuration>,
}

impl WaitOptions {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: WorkflowDuration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// An event delivered to a waiting workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepEvent<T> {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: T,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct EventWaitSlot {
    gate: Arc<SuspensionGate>,
    payload: Option<Value>,
    timed_out: bool,
}

impl EventWaitSlot {
    fn is_resolved(&self) -> bool {
        self.payload.is_some() || self.timed_out
    }
}

#[derive(Debug, Default)]
struct WaitState {
    slots: HashMap<String, EventWaitSlot>,
    early_timeouts: HashSet<String>,
    terminated: bool,
}

/// Event wait bookkeeping for one instance.
#[derive(Debug, Default)]
pub struct EventWaits {
    state: Mutex<WaitState>,
    enforce_timeouts: bool,
}

impl EventWaits {
    pub fn new(enforce_timeouts: bool) -> Self {
        Self {
            state: Mutex::new(WaitState::default()),
            enforce_timeouts,
        }
    }

    /// Suspends until the event is delivered, times out, or the instance is
    /// terminated.
    pub async fn wait(&self, options: &WaitOptions) -> Result<StepEvent<Value>, StepError> {
        let event_type = options.event_type.as_str();
        let pending = self.register(options)?;

        info!("Waiting for event '{}'", event_type);
        match options.timeout.filter(|_| self.enforce_timeouts) {
            Some(timeout) => {
                if tokio::time::timeout(timeout.to_std(), pending.gate.wait_if_armed())
                    .await
                    .is_err()
                {
                    debug!("Event '{}' timed out after {}", event_type, timeout);
                    self.trigger_timeout(event_type);
                }
            }
            None => pending.gate.wait_if_armed().await,
        }

        self.consume(options)
    }

    /// Delivers a payload to the pending wait for `event_type`.
    pub fn send(&self, event_type: &str, payload: Value) -> Result<(), EventError> {
        let mut state = self.lock();
        let slot = state
            .slots
            .get_mut(event_type)
            .filter(|slot| !slot.is_resolved())
            .ok_or_else(|| EventError::NoPendingWait(event_type.to_string()))?;

        slot.payload = Some(payload);
        slot.gate.disarm();
        info!("Delivered event '{}'", event_type);
        Ok(())
    }

    /// Times out the pending wait for `event_type`, or the next one if none
    /// is registered yet.
    pub fn trigger_timeout(&self, event_type: &str) {
        let mut state = self.lock();
        match state.slots.get_mut(event_type) {
            Some(slot) if slot.is_resolved() => {
                debug!("Event '{}' already resolved; timeout ignored", event_type);
            }
            Some(slot) => {
                slot.timed_out = true;
                slot.gate.disarm();
            }
            None => {
                debug!("No wait for '{}' yet; remembering timeout", event_type);
                state.early_timeouts.insert(event_type.to_string());
            }
        }
    }

    /// Releases every pending wait; they fail with `Terminated`.
    pub fn terminate(&self) {
        let mut state = self.lock();
        state.terminated = true;
        for (event_type, slot) in &state.slots {
            warn!("Releasing wait for '{}' due to termination", event_type);
            slot.gate.disarm();
        }
    }

    /// Event types with an unresolved pending wait.
    pub fn pending(&self) -> Vec<String> {
        let state = self.lock();
        let mut pending: Vec<String> = state
            .slots
            .iter()
            .filter(|(_, slot)| !slot.is_resolved())
            .map(|(event_type, _)| event_type.clone())
            .collect();
        pending.sort();
        pending
    }

    fn register(&self, options: &WaitOptions) -> Result<PendingWait<'_>, StepError> {
        let event_type = options.event_type.as_str();
        let mut state = self.lock();

        if state.terminated {
            return Err(StepError::Terminated);
        }
        if state.early_timeouts.remove(event_type) {
            return Err(timeout_error(options));
        }
        if state.slots.contains_key(event_type) {
            return Err(StepError::Validation(format!(
                "A wait for event '{}' is already pending",
                event_type
            )));
        }

        let gate = Arc::new(SuspensionGate::new(true));
        state.slots.insert(
            event_type.to_string(),
            EventWaitSlot {
                gate: Arc::clone(&gate),
                payload: None,
                timed_out: false,
            },
        );
        Ok(PendingWait {
            waits: self,
            event_type: event_type.to_string(),
            gate,
        })
    }

    fn consume(&self, options: &WaitOptions) -> Result<StepEvent<Value>, StepError> {
        let event_type = options.event_type.as_str();
        let slot = self.lock().slots.remove(event_type);

        match slot {
            Some(slot) if slot.timed_out => Err(timeout_error(options)),
            Some(EventWaitSlot {
                payload: Some(payload),
                ..
            }) => Ok(StepEvent {
                event_type: event_type.to_string(),
                payload,
                timestamp: Utc::now(),
            }),
            _ => Err(StepError::Terminated),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WaitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A registered wait. Dropping it before the slot is consumed (a cancelled
/// wait future) removes the slot so the event type can be waited on again.
struct PendingWait<'a> {
    waits: &'a EventWaits,
    event_type: String,
    gate: Arc<SuspensionGate>,
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        let mut state = self.waits.lock();
        let owned = state
            .slots
            .get(&self.event_type)
            .is_some_and(|slot| Arc::ptr_eq(&slot.gate, &self.gate));
        if owned {
            debug!("Wait for '{}' dropped before resolution", self.event_type);
            state.slots.remove(&self.event_type);
        }
    }
}

fn timeout_error(options: &WaitOptions) -> StepError {
    StepError::Timeout {
        event_type: options.event_type.clone(),
        timeout: options
            .timeout
            .map(|timeout| timeout.to_string())
            .unwrap_or_else(|| "0".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn until_pending(waits: &EventWaits, event_type: &str) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !waits.pending().iter().any(|pending| pending == event_type) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("wait should register");
    }

    #[tokio::test]
    async fn test_send_event_resolves_wait() {
        let waits = Arc::new(EventWaits::new(false));
        let waiter = {
            let waits = Arc::clone(&waits);
            tokio::spawn(async move { waits.wait(&WaitOptions::new("weather")).await })
        };
        until_pending(&waits, "weather").await;

        waits.send("weather", json!(143)).unwrap();

        let event = waiter.await.unwrap().unwrap();
        assert_eq!(event.event_type, "weather");
        assert_eq!(event.payload, json!(143));
        assert!(waits.pending().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_timeout_fails_wait() {
        let waits = Arc::new(EventWaits::new(false));
        let waiter = {
            let waits = Arc::clone(&waits);
            tokio::spawn(async move {
                let options = WaitOptions::new("weather").with_timeout(WorkflowDuration::seconds(10));
                waits.wait(&options).await
            })
        };
        until_pending(&waits, "weather").await;

        waits.trigger_timeout("weather");

        let error = waiter.await.unwrap().unwrap_err();
        assert!(matches!(error, StepError::Timeout { .. }));
        assert!(error.to_string().contains("weather"));
        assert!(error.to_string().contains("10 seconds"));
    }

    #[tokio::test]
    async fn test_early_timeout_is_remembered() {
        let waits = EventWaits::new(false);
        waits.trigger_timeout("weather");

        let error = waits.wait(&WaitOptions::new("weather")).await.unwrap_err();
        assert!(matches!(error, StepError::Timeout { .. }));
    }

    #[test]
    fn test_send_without_wait_is_error() {
        let waits = EventWaits::new(false);
        let error = waits.send("weather", json!(1)).unwrap_err();
        assert!(matches!(error, EventError::NoPendingWait(ref t) if t == "weather"));
    }

    #[tokio::test]
    async fn test_only_one_resolution_wins() {
        let waits = Arc::new(EventWaits::new(false));
        let waiter = {
            let waits = Arc::clone(&waits);
            tokio::spawn(async move { waits.wait(&WaitOptions::new("weather")).await })
        };
        until_pending(&waits, "weather").await;

        waits.send("weather", json!("sunny")).unwrap();
        waits.trigger_timeout("weather");
        assert!(waits.send("weather", json!("rain")).is_err());

        let event = waiter.await.unwrap().unwrap();
        assert_eq!(event.payload, json!("sunny"));
    }

    #[tokio::test]
    async fn test_duplicate_wait_rejected() {
        let waits = Arc::new(EventWaits::new(false));
        let _waiter = {
            let waits = Arc::clone(&waits);
            tokio::spawn(async move { waits.wait(&WaitOptions::new("weather")).await })
        };
        until_pending(&waits, "weather").await;

        let error = waits.wait(&WaitOptions::new("weather")).await.unwrap_err();
        assert!(matches!(error, StepError::Validation(_)));
    }

    #[tokio::test]
    async fn test_fresh_slot_per_wait() {
        let waits = Arc::new(EventWaits::new(false));
        for payload in [1, 2] {
            let waiter = {
                let waits = Arc::clone(&waits);
                tokio::spawn(async move { waits.wait(&WaitOptions::new("tick")).await })
            };
            until_pending(&waits, "tick").await;
            waits.send("tick", json!(payload)).unwrap();
            assert_eq!(waiter.await.unwrap().unwrap().payload, json!(payload));
        }
    }

    #[tokio::test]
    async fn test_terminate_releases_waiters() {
        let waits = Arc::new(EventWaits::new(false));
        let waiter = {
            let waits = Arc::clone(&waits);
            tokio::spawn(async move { waits.wait(&WaitOptions::new("weather")).await })
        };
        until_pending(&waits, "weather").await;

        waits.terminate();

        let error = waiter.await.unwrap().unwrap_err();
        assert!(matches!(error, StepError::Terminated));
        assert!(matches!(
            waits.wait(&WaitOptions::new("other")).await,
            Err(StepError::Terminated)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_wait_frees_slot() {
        let waits = Arc::new(EventWaits::new(false));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), waits.wait(&WaitOptions::new("weather")))
                .await;
        assert!(cancelled.is_err());
        assert!(waits.pending().is_empty());
        assert!(matches!(
            waits.send("weather", json!(1)),
            Err(EventError::NoPendingWait(_))
        ));

        let waiter = {
            let waits = Arc::clone(&waits);
            tokio::spawn(async move { waits.wait(&WaitOptions::new("weather")).await })
        };
        until_pending(&waits, "weather").await;
        waits.send("weather", json!(143)).unwrap();

        assert_eq!(waiter.await.unwrap().unwrap().payload, json!(143));
        assert!(waits.pending().is_empty());
    }

    #[tokio::test]
    async fn test_enforced_timeout_fires() {
        let waits = EventWaits::new(true);
        let options = WaitOptions::new("weather").with_timeout(WorkflowDuration::millis(20));

        let error = waits.wait(&options).await.unwrap_err();
        assert!(matches!(error, StepError::Timeout { .. }));
        assert!(waits.pending().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_ignored_when_not_enforced() {
        let waits = Arc::new(EventWaits::new(false));
        let waiter = {
            let waits = Arc::clone(&waits);
            tokio::spawn(async move {
                let options = WaitOptions::new("weather").with_timeout(WorkflowDuration::millis(1));
                waits.wait(&options).await
            })
        };
        until_pending(&waits, "weather").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        waits.send("weather", json!(7)).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap().payload, json!(7));
    }
}
