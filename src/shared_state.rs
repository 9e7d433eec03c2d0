use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Notify};

use crate::config::Config;
use crate::error::ReadingError;
use crate::models::power::{PowerSnapshot, RefreshStatus};

const STATE_UNAVAILABLE: &str = "unavailable";
const STATE_UNKNOWN: &str = "unknown";

/// Named sensor states, as raw strings ("unknown", "unavailable", "512.3").
/// Every change is announced with the sensor id.
#[derive(Clone, Debug)]
pub struct SensorRegistry {
    states: Arc<RwLock<HashMap<String, String>>>,
    changes: broadcast::Sender<String>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    /// Store a state. Returns true (and notifies) only if it changed.
    pub fn set(&self, id: &str, state: impl Into<String>) -> bool {
        let state = state.into();
        let changed = if let Ok(mut map) = self.states.write() {
            match map.get(id) {
                Some(old) if *old == state => false,
                _ => {
                    map.insert(id.to_string(), state);
                    true
                }
            }
        } else {
            false
        };
        if changed {
            // No subscribers is fine
            let _ = self.changes.send(id.to_string());
        }
        changed
    }

    pub fn mark_unavailable(&self, id: &str) -> bool {
        self.set(id, STATE_UNAVAILABLE)
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.states.read().ok().and_then(|map| map.get(id).cloned())
    }

    pub fn all(&self) -> HashMap<String, String> {
        if let Ok(map) = self.states.read() {
            map.clone()
        } else {
            HashMap::new()
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }

    /// Numeric value of a sensor, or why there is none.
    pub fn read_number(&self, id: &str) -> Result<f64, ReadingError> {
        match self.get(id) {
            None => Err(ReadingError::Missing(id.to_string())),
            Some(state) => parse_state(id, &state),
        }
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn parse_state(id: &str, state: &str) -> Result<f64, ReadingError> {
    match state.trim() {
        STATE_UNAVAILABLE => Err(ReadingError::Unavailable(id.to_string())),
        STATE_UNKNOWN => Err(ReadingError::Unknown(id.to_string())),
        raw => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(ReadingError::Invalid {
                sensor: id.to_string(),
                value: state.to_string(),
            }),
        },
    }
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sensors: SensorRegistry,
    /// Last successful estimate; kept across failed refreshes
    snapshot: Arc<RwLock<Option<PowerSnapshot>>>,
    status: Arc<RwLock<RefreshStatus>>,
    /// Single-permit trigger: bursts of requests coalesce into one refresh
    refresh_requested: Arc<Notify>,
    updates: broadcast::Sender<PowerSnapshot>,
    mqtt_connected: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let (updates, _) = broadcast::channel(16);
        Self {
            config: Arc::new(config),
            sensors: SensorRegistry::new(),
            snapshot: Arc::new(RwLock::new(None)),
            status: Arc::new(RwLock::new(RefreshStatus::default())),
            refresh_requested: Arc::new(Notify::new()),
            updates,
            mqtt_connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_snapshot(&self, snapshot: PowerSnapshot) {
        if let Ok(mut status) = self.status.write() {
            status.last_update_success = true;
            status.last_attempt = Some(snapshot.computed_at);
            status.last_error = None;
        }
        if let Ok(mut slot) = self.snapshot.write() {
            *slot = Some(snapshot.clone());
        }
        let _ = self.updates.send(snapshot);
    }

    /// Record a failed refresh. The previous snapshot stays in place.
    pub fn record_failure(&self, error: &str, at: DateTime<Utc>) {
        if let Ok(mut status) = self.status.write() {
            status.last_update_success = false;
            status.last_attempt = Some(at);
            status.last_error = Some(error.to_string());
        }
    }

    pub fn snapshot(&self) -> Option<PowerSnapshot> {
        self.snapshot.read().ok().and_then(|s| s.clone())
    }

    pub fn status(&self) -> RefreshStatus {
        self.status.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn request_refresh(&self) {
        self.refresh_requested.notify_one();
    }

    pub fn refresh_trigger(&self) -> Arc<Notify> {
        self.refresh_requested.clone()
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<PowerSnapshot> {
        self.updates.subscribe()
    }

    pub fn is_mqtt_connected(&self) -> bool {
        self.mqtt_connected.load(Ordering::Relaxed)
    }

    pub fn set_mqtt_connected(&self, value: bool) {
        self.mqtt_connected.store(value, Ordering::Relaxed);
    }
}
