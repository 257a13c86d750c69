//! Runtime configuration.

use std::time::Duration;

/// Remote services and derivation tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Base URL of the geometric service (buffer, intersection, viewshed, ...).
    pub base_url: String,
    /// Base URL of the photon-style geocoder.
    pub geocoder_url: String,
    pub timeout: Duration,
    /// Padding added around the boundary extent for raster computations.
    pub region_padding: f64,
    /// Observer height for viewshed requests.
    pub viewshed_height1: f64,
    /// Target height for viewshed requests.
    pub viewshed_height2: f64,
    /// Uncertainty of the zero-distance buffer normalizing raster output.
    pub normalize_uncertainty: f64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8008".to_string(),
            geocoder_url: "https://photon.komoot.io/api/".to_string(),
            timeout: Duration::from_secs(60),
            region_padding: 0.1,
            viewshed_height1: 1.0,
            viewshed_height2: 1.0,
            normalize_uncertainty: 2.5,
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by `CHOUCAS_SERVICE_URL`, `CHOUCAS_GEOCODER_URL`
    /// and `CHOUCAS_TIMEOUT_MS`. Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(url) = lookup("CHOUCAS_SERVICE_URL") {
            cfg.base_url = url;
        }
        if let Some(url) = lookup("CHOUCAS_GEOCODER_URL") {
            cfg.geocoder_url = url;
        }
        if let Some(ms) = lookup("CHOUCAS_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            cfg.timeout = Duration::from_millis(ms);
        }
        cfg
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Number of prior-state snapshots kept for diagnostic replay.
    pub trace_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { trace_capacity: 256 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Max queued operator events before new ones are dropped.
    pub capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Everything a session is configured with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionConfig {
    pub service: ServiceConfig,
    pub store: StoreConfig,
    pub feed: FeedConfig,
}
