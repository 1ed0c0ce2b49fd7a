use crate::config::ThrottleConfig;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
struct Attempts {
    count: u32,
    window_ends: Instant,
}

impl Attempts {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.window_ends
    }
}

/// Failed login counter keyed by email and client address.
///
/// The window opens on the first failure and lasts `decay_seconds`; once
/// `max_attempts` failures are recorded inside it, the key is locked out
/// until the window closes.
#[derive(Clone)]
pub struct LoginThrottle {
    attempts: Arc<DashMap<String, Attempts>>,
    max_attempts: u32,
    decay: Duration,
    last_cleanup: Arc<std::sync::Mutex<Instant>>,
}

impl LoginThrottle {
    pub fn new(config: &ThrottleConfig) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            max_attempts: config.max_attempts,
            decay: Duration::from_secs(config.decay_seconds),
            last_cleanup: Arc::new(std::sync::Mutex::new(Instant::now())),
        }
    }

    pub fn key(email: &str, ip: Option<IpAddr>) -> String {
        let ip = ip.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string());
        format!("{}|{ip}", email.trim().to_lowercase())
    }

    /// Seconds until the key may try again, if it is locked out.
    pub fn lockout_remaining(&self, key: &str) -> Option<u64> {
        self.maybe_cleanup();

        let entry = self.attempts.get(key)?;
        if entry.is_expired() || entry.count < self.max_attempts {
            return None;
        }
        let remaining = entry.window_ends.saturating_duration_since(Instant::now());
        Some(remaining.as_secs().max(1))
    }

    /// Record a failed attempt.
    pub fn hit(&self, key: &str) -> u32 {
        let mut entry = self.attempts.entry(key.to_string()).or_insert(Attempts {
            count: 0,
            window_ends: Instant::now() + self.decay,
        });
        if entry.is_expired() {
            *entry = Attempts {
                count: 0,
                window_ends: Instant::now() + self.decay,
            };
        }
        entry.count += 1;
        entry.count
    }

    pub fn clear(&self, key: &str) {
        self.attempts.remove(key);
    }

    fn maybe_cleanup(&self) {
        const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

        if let Ok(mut last_cleanup) = self.last_cleanup.try_lock()
            && last_cleanup.elapsed() >= CLEANUP_INTERVAL
        {
            *last_cleanup = Instant::now();
            drop(last_cleanup);
            self.attempts.retain(|_, entry| !entry.is_expired());
        }
    }
}
