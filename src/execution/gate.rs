//! Suspension Gate
//!
//! A cooperative, re-armable latch. While the gate is armed every caller of
//! [`SuspensionGate::wait_if_armed`] is parked until the next disarm, which
//! releases all of them at once.
//!
//! Each arming cycle owns its own `watch` channel. Disarming publishes `true`
//! on the current channel and re-arming swaps in a fresh one, so a waiter that
//! subscribed before the disarm always observes its release, even if the gate
//! is armed again before the waiter is polled.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

/// Re-armable latch used for pause/resume, event waits and completion.
#[derive(Debug)]
pub struct SuspensionGate {
    state: Mutex<GateState>,
}

#[derive(Debug)]
struct GateState {
    armed: bool,
    release: watch::Sender<bool>,
}

impl SuspensionGate {
    /// Creates a gate, optionally already armed.
    pub fn new(armed: bool) -> Self {
        Self {
            state: Mutex::new(GateState {
                armed,
                release: watch::channel(false).0,
            }),
        }
    }

    /// Arms the gate. Does nothing if it is already armed.
    pub fn arm(&self) {
        let mut state = self.lock();
        if !state.armed {
            state.armed = true;
            state.release = watch::channel(false).0;
        }
    }

    /// Disarms the gate, waking every waiter of the current cycle.
    pub fn disarm(&self) {
        let mut state = self.lock();
        if state.armed {
            state.armed = false;
            state.release.send_replace(true);
        }
    }

    /// Returns true when the gate lets callers through.
    pub fn is_active(&self) -> bool {
        !self.lock().armed
    }

    /// Waits until the gate is disarmed. Returns immediately when it is not
    /// armed.
    pub async fn wait_if_armed(&self) {
        let mut release = {
            let state = self.lock();
            if !state.armed {
                return;
            }
            state.release.subscribe()
        };

        // The sender for this cycle is only replaced after it has published
        // `true`, so an error here still means the cycle was released.
        let _ = release.wait_for(|released| *released).await;
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SuspensionGate {
    fn default() -> Self {
        Self::new(false)
    }
}
