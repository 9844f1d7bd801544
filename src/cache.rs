use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::models::Thermostat;

/// Source of "now" for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One complete thermostat list and when it was fetched. Replaced as a whole,
/// never edited in place.
#[derive(Debug, Clone)]
pub struct CachedThermostatSet {
    pub thermostats: Arc<Vec<Thermostat>>,
    pub fetched_at: DateTime<Utc>,
}

/// Time-to-live cache in front of the thermostat list endpoint.
pub struct ResponseCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    snapshot: Option<CachedThermostatSet>,
    stale: bool,
}

impl ResponseCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            snapshot: None,
            stale: false,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Last successful fetch, fresh or not.
    pub fn snapshot(&self) -> Option<&CachedThermostatSet> {
        self.snapshot.as_ref()
    }

    /// Time left before the snapshot expires, if it can still be served.
    /// An empty list is never served from cache.
    pub fn remaining(&self) -> Option<Duration> {
        if self.stale {
            return None;
        }
        let snapshot = self.snapshot.as_ref()?;
        if snapshot.thermostats.is_empty() {
            return None;
        }
        let age = self
            .clock
            .now()
            .signed_duration_since(snapshot.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.ttl.checked_sub(age).filter(|left| !left.is_zero())
    }

    pub fn fresh(&self) -> Option<Arc<Vec<Thermostat>>> {
        self.remaining()?;
        self.snapshot.as_ref().map(|s| Arc::clone(&s.thermostats))
    }

    /// Swap in a newly fetched list.
    pub fn replace(&mut self, thermostats: Vec<Thermostat>) -> Arc<Vec<Thermostat>> {
        let now = self.clock.now();
        let fetched_at = match &self.snapshot {
            Some(previous) if previous.fetched_at > now => previous.fetched_at,
            _ => now,
        };
        let thermostats = Arc::new(thermostats);
        self.snapshot = Some(CachedThermostatSet {
            thermostats: Arc::clone(&thermostats),
            fetched_at,
        });
        self.stale = false;
        thermostats
    }

    /// Force the next read to go to the API.
    pub fn invalidate(&mut self) {
        debug!("Thermostat cache invalidated");
        self.stale = true;
    }

    /// Serve from cache when fresh, otherwise run `fetch` and keep its result.
    /// A failed fetch leaves the previous snapshot in place.
    pub async fn get_or_fetch<F, Fut>(
        &mut self,
        force_refresh: bool,
        fetch: F,
    ) -> Result<Arc<Vec<Thermostat>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Thermostat>>>,
    {
        if !force_refresh {
            if let (Some(left), Some(snapshot)) = (self.remaining(), &self.snapshot) {
                info!(
                    "Returning cached thermostat information; {}s until cache expiration",
                    left.as_secs()
                );
                return Ok(Arc::clone(&snapshot.thermostats));
            }
        }

        info!("Getting thermostats via ecobee API");
        match fetch().await {
            Ok(thermostats) => Ok(self.replace(thermostats)),
            Err(e) => {
                warn!("Thermostat fetch failed; keeping previous snapshot: {}", e);
                Err(e)
            }
        }
    }
}
