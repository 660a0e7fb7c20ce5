//! Scripted supervisor for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use super::types::{Supervisor, SupervisorError};

/// Pauses `start` of one unit until released.
pub struct StartGate {
    pub unit: String,
    /// Signalled when `start(unit)` is entered.
    pub entered: Arc<Notify>,
    /// `start(unit)` waits for this.
    pub release: Arc<Notify>,
}

#[derive(Default)]
pub struct MockSupervisor {
    active: Mutex<HashSet<String>>,
    /// unit -> number of upcoming starts that return Ok but never go active
    stuck_starts: Mutex<HashMap<String, usize>>,
    failing_starts: Mutex<HashSet<String>>,
    failing_reloads: Mutex<HashSet<String>>,
    gate: Mutex<Option<StartGate>>,
    pub starts: Mutex<Vec<String>>,
    pub stops: Mutex<Vec<String>>,
    pub reloads: Mutex<Vec<String>>,
}

impl MockSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active(self, unit: &str) -> Self {
        self.active.lock().unwrap().insert(unit.to_string());
        self
    }

    /// `start(unit)` succeeds but the unit never becomes active.
    pub fn never_active(self, unit: &str) -> Self {
        self.stuck_starts
            .lock()
            .unwrap()
            .insert(unit.to_string(), usize::MAX);
        self
    }

    /// The first `n` starts of `unit` never become active.
    pub fn stuck_for(self, unit: &str, n: usize) -> Self {
        self.stuck_starts.lock().unwrap().insert(unit.to_string(), n);
        self
    }

    pub fn failing_start(self, unit: &str) -> Self {
        self.failing_starts.lock().unwrap().insert(unit.to_string());
        self
    }

    pub fn failing_reload(self, unit: &str) -> Self {
        self.failing_reloads.lock().unwrap().insert(unit.to_string());
        self
    }

    pub fn gated(self, gate: StartGate) -> Self {
        *self.gate.lock().unwrap() = Some(gate);
        self
    }

    pub fn start_count(&self, unit: &str) -> usize {
        self.starts.lock().unwrap().iter().filter(|u| *u == unit).count()
    }

    pub fn was_stopped(&self, unit: &str) -> bool {
        self.stops.lock().unwrap().iter().any(|u| u == unit)
    }

    pub fn active(&self, unit: &str) -> bool {
        self.active.lock().unwrap().contains(unit)
    }
}

#[async_trait]
impl Supervisor for MockSupervisor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(&self, unit: &str, _timeout: Duration) -> Result<(), SupervisorError> {
        self.starts.lock().unwrap().push(unit.to_string());

        let waiter = {
            let gate = self.gate.lock().unwrap();
            gate.as_ref()
                .filter(|g| g.unit == unit)
                .map(|g| (g.entered.clone(), g.release.clone()))
        };
        if let Some((entered, release)) = waiter {
            entered.notify_one();
            release.notified().await;
        }

        if self.failing_starts.lock().unwrap().contains(unit) {
            return Err(SupervisorError::Failed(format!("{} failed to start", unit)));
        }
        {
            let mut stuck = self.stuck_starts.lock().unwrap();
            if let Some(remaining) = stuck.get_mut(unit) {
                if *remaining > 0 {
                    *remaining = remaining.saturating_sub(1);
                    return Ok(());
                }
            }
        }
        self.active.lock().unwrap().insert(unit.to_string());
        Ok(())
    }

    async fn stop(&self, unit: &str, _timeout: Duration) -> Result<(), SupervisorError> {
        self.stops.lock().unwrap().push(unit.to_string());
        self.active.lock().unwrap().remove(unit);
        Ok(())
    }

    async fn reload(&self, unit: &str, _timeout: Duration) -> Result<(), SupervisorError> {
        self.reloads.lock().unwrap().push(unit.to_string());
        if self.failing_reloads.lock().unwrap().contains(unit) {
            return Err(SupervisorError::Failed(format!("{} reload failed", unit)));
        }
        Ok(())
    }

    async fn is_active(&self, unit: &str) -> Result<bool, SupervisorError> {
        Ok(self.active.lock().unwrap().contains(unit))
    }
}
