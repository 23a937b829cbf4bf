//! Process-wide scheduler configuration
//!
//! Read once at startup; runtime changes are not supported.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Upper bound on concurrently executing jobs across the system
    pub max_workers: usize,
    /// Upper bound on tenants with pending or running work
    pub max_active_users: usize,
    /// Bounded mailbox size per event-bus subscriber
    pub event_mailbox_size: usize,
    /// Sliding window for the dashboard job-latency average, in seconds
    pub latency_window_seconds: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_workers: 10,
            max_active_users: 3,
            event_mailbox_size: 64,
            latency_window_seconds: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SchedulerSettings::default();
        assert_eq!(settings.max_workers, 10);
        assert_eq!(settings.max_active_users, 3);
        assert_eq!(settings.event_mailbox_size, 64);
        assert_eq!(settings.latency_window_seconds, 60);
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let settings: SchedulerSettings =
            serde_json::from_str(r#"{"max_workers": 2}"#).unwrap();
        assert_eq!(settings.max_workers, 2);
        assert_eq!(settings.max_active_users, 3);
    }
}
