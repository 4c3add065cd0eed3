//! Server configuration.
//!
//! Everything is read from environment variables at start-up, with defaults
//! suitable for the public gateway. Invalid values fail start-up with a
//! [`ConfigError`] instead of being silently replaced.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::availability::DEFAULT_FAILURE_THRESHOLD;

const DEFAULT_OJP_ENDPOINT: &str = "https://api.opentransportdata.swiss/ojp2020";
const DEFAULT_GTFS_RT_ENDPOINT: &str = "https://api.opentransportdata.swiss/la/gtfs-rt";
const DEFAULT_SIRI_SX_ENDPOINT: &str = "https://api.opentransportdata.swiss/la/siri-sx-unplanned";
const DEFAULT_TRAFFIC_LIGHTS_BASE: &str =
    "https://api.opentransportdata.swiss/TDP/Rest_OcitC/Read/v1";
const DEFAULT_TRAFFIC_SITUATIONS_ENDPOINT: &str =
    "https://api.opentransportdata.swiss/TDP/Soap_Datex2/TrafficSituations/Pull";

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Full server configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bearer token for every upstream feed
    pub api_key: String,
    pub ojp_endpoint: String,
    pub gtfs_rt_endpoint: String,
    pub siri_sx_endpoint: String,
    pub traffic_lights_base: String,
    pub traffic_situations_endpoint: String,

    pub bind_addr: SocketAddr,
    /// Allowed CORS origins; `None` allows any origin
    pub cors_origins: Option<Vec<String>>,
    /// Timezone for the prediction clock (peak windows are local time)
    pub timezone: Tz,

    /// Timeout for each upstream request
    pub upstream_timeout: Duration,
    /// Overall deadline for a trip-planning request
    pub request_deadline: Duration,

    pub cache_ttl_routes: Duration,
    pub cache_ttl_disruptions: Duration,
    pub cache_ttl_traffic: Duration,
    pub cache_ttl_delays: Duration,

    pub poll_interval_disruptions: Duration,
    pub poll_interval_traffic: Duration,
    pub poll_interval_delays: Duration,

    /// Consecutive failures before a source is marked unavailable
    pub availability_threshold: u32,
    pub heartbeat_interval: Duration,
    /// Maximum concurrent event stream subscribers
    pub max_subscribers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            ojp_endpoint: DEFAULT_OJP_ENDPOINT.to_string(),
            gtfs_rt_endpoint: DEFAULT_GTFS_RT_ENDPOINT.to_string(),
            siri_sx_endpoint: DEFAULT_SIRI_SX_ENDPOINT.to_string(),
            traffic_lights_base: DEFAULT_TRAFFIC_LIGHTS_BASE.to_string(),
            traffic_situations_endpoint: DEFAULT_TRAFFIC_SITUATIONS_ENDPOINT.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            cors_origins: None,
            timezone: chrono_tz::Europe::Zurich,
            upstream_timeout: Duration::from_secs(5),
            request_deadline: Duration::from_secs(10),
            cache_ttl_routes: Duration::from_secs(300),
            cache_ttl_disruptions: Duration::from_secs(30),
            cache_ttl_traffic: Duration::from_secs(120),
            cache_ttl_delays: Duration::from_secs(60),
            poll_interval_disruptions: Duration::from_secs(30),
            poll_interval_traffic: Duration::from_secs(60),
            poll_interval_delays: Duration::from_secs(30),
            availability_threshold: DEFAULT_FAILURE_THRESHOLD,
            heartbeat_interval: Duration::from_secs(15),
            max_subscribers: 256,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(key) = env("OTD_API_KEY") {
            config.api_key = key;
        }
        for (var, slot) in [
            ("OJP_ENDPOINT", &mut config.ojp_endpoint),
            ("GTFS_RT_ENDPOINT", &mut config.gtfs_rt_endpoint),
            ("SIRI_SX_ENDPOINT", &mut config.siri_sx_endpoint),
            ("TRAFFIC_LIGHTS_BASE", &mut config.traffic_lights_base),
            ("TRAFFIC_SITUATIONS_ENDPOINT", &mut config.traffic_situations_endpoint),
        ] {
            if let Some(url) = env(var) {
                *slot = url;
            }
        }

        if let Some(value) = env("BIND_ADDR") {
            config.bind_addr = parse("BIND_ADDR", &value)?;
        }
        if let Some(value) = env("CORS_ORIGINS") {
            config.cors_origins = parse_origins(&value);
        }
        if let Some(value) = env("LOCAL_TIMEZONE") {
            config.timezone = parse("LOCAL_TIMEZONE", &value)?;
        }

        for (var, slot) in [
            ("UPSTREAM_TIMEOUT_SECS", &mut config.upstream_timeout),
            ("REQUEST_DEADLINE_SECS", &mut config.request_deadline),
            ("CACHE_TTL_ROUTES", &mut config.cache_ttl_routes),
            ("CACHE_TTL_DISRUPTIONS", &mut config.cache_ttl_disruptions),
            ("CACHE_TTL_TRAFFIC", &mut config.cache_ttl_traffic),
            ("CACHE_TTL_DELAYS", &mut config.cache_ttl_delays),
            ("POLL_INTERVAL_DISRUPTIONS", &mut config.poll_interval_disruptions),
            ("POLL_INTERVAL_TRAFFIC", &mut config.poll_interval_traffic),
            ("POLL_INTERVAL_DELAYS", &mut config.poll_interval_delays),
            ("HEARTBEAT_INTERVAL_SECS", &mut config.heartbeat_interval),
        ] {
            if let Some(value) = env(var) {
                *slot = parse_secs(var, &value)?;
            }
        }

        if let Some(value) = env("AVAILABILITY_THRESHOLD") {
            config.availability_threshold = parse("AVAILABILITY_THRESHOLD", &value)?;
        }
        if let Some(value) = env("MAX_SUBSCRIBERS") {
            config.max_subscribers = parse("MAX_SUBSCRIBERS", &value)?;
        }

        Ok(config)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_max_subscribers(mut self, n: usize) -> Self {
        self.max_subscribers = n;
        self
    }

    pub fn with_availability_threshold(mut self, n: u32) -> Self {
        self.availability_threshold = n;
        self
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Positive whole seconds.
fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match parse::<u64>(var, value)? {
        0 => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be at least 1 second".to_string(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

/// Comma-separated origins; `*` allows any.
fn parse_origins(value: &str) -> Option<Vec<String>> {
    let origins: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        None
    } else {
        Some(origins)
    }
}
