//! Harvester contract and supporting machinery.
//!
//! A [`Harvester`] fetches raw metadata records from one source for a
//! resolved time window. The window is validated up front (strictly
//! `start < end`); a harvester may shift it via
//! [`shift_range`](Harvester::shift_range), and any divergence is logged
//! rather than silently applied.
//!
//! Raw datum bytes are canonical: JSON documents are re-serialized with
//! sorted keys before hashing, so the same logical record always gets the
//! same sha-256 regardless of key order upstream.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::error::HarvestError;

/// One bound of a harvest window: an absolute instant or an offset back
/// from "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowBound {
    Absolute(DateTime<Utc>),
    DaysAgo(i64),
}

impl WindowBound {
    fn resolve(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            WindowBound::Absolute(instant) => instant,
            WindowBound::DaysAgo(days) => now - Duration::days(days),
        }
    }
}

/// A resolved, validated harvest time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl HarvestWindow {
    /// Resolve both bounds against `now` and require strictly
    /// `start < end`. Equal bounds are an error, not an empty harvest.
    pub fn resolve(
        start: WindowBound,
        end: WindowBound,
        now: DateTime<Utc>,
    ) -> Result<Self, HarvestError> {
        let start = start.resolve(now);
        let end = end.resolve(now);
        if start >= end {
            return Err(HarvestError::DateRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(HarvestWindow { start, end })
    }
}

/// One raw record fetched from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Source-unique identifier for the record.
    pub identifier: String,
    /// Canonical datum bytes.
    pub datum: Vec<u8>,
    /// When the source says the record last changed.
    pub datestamp: Option<DateTime<Utc>>,
}

impl FetchResult {
    pub fn from_bytes(
        identifier: impl Into<String>,
        datum: Vec<u8>,
        datestamp: Option<DateTime<Utc>>,
    ) -> Self {
        FetchResult {
            identifier: identifier.into(),
            datum,
            datestamp,
        }
    }

    pub fn from_string(
        identifier: impl Into<String>,
        datum: impl Into<String>,
        datestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self::from_bytes(identifier, datum.into().into_bytes(), datestamp)
    }

    /// Canonicalize a JSON datum with recursively sorted object keys.
    pub fn from_json(
        identifier: impl Into<String>,
        datum: &Value,
        datestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self::from_bytes(identifier, canonical_json_bytes(datum), datestamp)
    }

    /// Content address of the datum.
    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.datum);
        hex::encode(hasher.finalize())
    }
}

fn sort_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, sort_json(v))).collect();
            serde_json::to_value(sorted).unwrap_or(Value::Null)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_json).collect()),
        other => other.clone(),
    }
}

/// Deterministic JSON encoding: object keys sorted at every level.
pub fn canonical_json_bytes(value: &Value) -> Vec<u8> {
    sort_json(value).to_string().into_bytes()
}

/// A source of raw metadata records.
#[async_trait]
pub trait Harvester: Send + Sync {
    /// Label identifying the source, used to tag everything downstream.
    fn source_label(&self) -> &str;

    /// Let the harvester adjust the requested window (e.g. widen to whole
    /// days for sources with date-granular endpoints). Divergence from the
    /// requested window is logged by [`run_harvest`].
    fn shift_range(&self, window: HarvestWindow) -> HarvestWindow {
        window
    }

    /// Fetch all records changed within the window.
    async fn fetch(&self, window: &HarvestWindow) -> Result<Vec<FetchResult>>;
}

/// Sources with datestamps drifting slightly past the requested window are
/// tolerated up to this much; beyond it the harvest fails loudly.
const DATESTAMP_TOLERANCE_HOURS: i64 = 24;

/// Run one harvest: shift the window, fetch, and validate datestamps.
pub async fn run_harvest(
    harvester: &dyn Harvester,
    window: HarvestWindow,
) -> Result<Vec<FetchResult>, HarvestError> {
    let shifted = harvester.shift_range(window);
    if shifted != window {
        warn!(
            source = harvester.source_label(),
            requested_start = %window.start,
            requested_end = %window.end,
            shifted_start = %shifted.start,
            shifted_end = %shifted.end,
            "harvester shifted the requested window"
        );
    }
    let results = harvester.fetch(&shifted).await?;
    let tolerance = Duration::hours(DATESTAMP_TOLERANCE_HOURS);
    for result in &results {
        if let Some(datestamp) = result.datestamp {
            if datestamp < shifted.start - tolerance || datestamp > shifted.end + tolerance {
                return Err(HarvestError::DatestampOutOfRange {
                    datestamp: datestamp.to_rfc3339(),
                    start: shifted.start.to_rfc3339(),
                    end: shifted.end.to_rfc3339(),
                });
            }
            if datestamp < shifted.start || datestamp > shifted.end {
                warn!(
                    source = harvester.source_label(),
                    identifier = %result.identifier,
                    datestamp = %datestamp,
                    "datestamp slightly outside the harvested window"
                );
            }
        }
    }
    Ok(results)
}

/// Rate-limited HTTP client for harvesters backed by remote endpoints.
///
/// Every request takes a [`RateLimiter`] permit first, so a harvester can
/// fan out fetches without tracking the source's request budget itself.
pub struct SourceClient {
    http: reqwest::Client,
    limiter: RateLimiter,
}

impl SourceClient {
    pub fn new(config: &crate::config::HarvestConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(SourceClient {
            http,
            limiter: RateLimiter::new(config.rate_allowance, config.rate_period_secs),
        })
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.limiter.acquire().await;
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    pub async fn get_json(&self, url: &str) -> Result<Value> {
        self.limiter.acquire().await;
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

struct RateState {
    allowance: f64,
    last_check: Instant,
}

/// Token-bucket rate limiter: `permits` requests per `period_secs`, with
/// waiters served in arrival order (the bucket lock is held while
/// sleeping).
pub struct RateLimiter {
    permits: f64,
    period_secs: f64,
    state: Mutex<RateState>,
}

impl RateLimiter {
    pub fn new(permits: u32, period_secs: u64) -> Self {
        RateLimiter {
            permits: f64::from(permits.max(1)),
            period_secs: period_secs.max(1) as f64,
            state: Mutex::new(RateState {
                allowance: f64::from(permits.max(1)),
                last_check: Instant::now(),
            }),
        }
    }

    /// Take one permit, sleeping until the bucket refills if necessary.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_check).as_secs_f64();
        state.last_check = now;
        let rate = self.permits / self.period_secs;
        state.allowance = (state.allowance + elapsed * rate).min(self.permits);
        if state.allowance < 1.0 {
            let wait_secs = (1.0 - state.allowance) / rate;
            tokio::time::sleep(std::time::Duration::from_secs_f64(wait_secs)).await;
            state.last_check = Instant::now();
            state.allowance = 0.0;
        } else {
            state.allowance -= 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text)
            .unwrap()
            .with_timezone(&Utc)
    }

    struct StubHarvester {
        results: Vec<FetchResult>,
        shift_days: i64,
    }

    #[async_trait]
    impl Harvester for StubHarvester {
        fn source_label(&self) -> &str {
            "stub.source"
        }

        fn shift_range(&self, window: HarvestWindow) -> HarvestWindow {
            HarvestWindow {
                start: window.start - Duration::days(self.shift_days),
                end: window.end,
            }
        }

        async fn fetch(&self, _window: &HarvestWindow) -> Result<Vec<FetchResult>> {
            Ok(self.results.clone())
        }
    }

    #[test]
    fn test_window_equal_bounds_rejected() {
        let now = at("2024-06-01T00:00:00Z");
        let bound = WindowBound::Absolute(at("2024-05-01T00:00:00Z"));
        let result = HarvestWindow::resolve(bound, bound, now);
        assert!(matches!(result, Err(HarvestError::DateRange { .. })));
    }

    #[test]
    fn test_window_reversed_bounds_rejected() {
        let now = at("2024-06-01T00:00:00Z");
        let result = HarvestWindow::resolve(
            WindowBound::Absolute(at("2024-05-02T00:00:00Z")),
            WindowBound::Absolute(at("2024-05-01T00:00:00Z")),
            now,
        );
        assert!(matches!(result, Err(HarvestError::DateRange { .. })));
    }

    #[test]
    fn test_window_relative_bounds() {
        let now = at("2024-06-01T00:00:00Z");
        let window =
            HarvestWindow::resolve(WindowBound::DaysAgo(7), WindowBound::DaysAgo(0), now).unwrap();
        assert_eq!(window.start, at("2024-05-25T00:00:00Z"));
        assert_eq!(window.end, now);
    }

    #[test]
    fn test_canonical_json_sorts_keys_recursively() {
        let a = json!({"b": {"z": 1, "a": 2}, "a": [{"y": 1, "x": 2}]});
        let b = json!({"a": [{"x": 2, "y": 1}], "b": {"a": 2, "z": 1}});
        assert_eq!(canonical_json_bytes(&a), canonical_json_bytes(&b));
        let one = FetchResult::from_json("id", &a, None);
        let two = FetchResult::from_json("id", &b, None);
        assert_eq!(one.sha256(), two.sha256());
    }

    #[tokio::test]
    async fn test_run_harvest_rejects_far_out_of_range_datestamp() {
        let window = HarvestWindow {
            start: at("2024-05-01T00:00:00Z"),
            end: at("2024-05-02T00:00:00Z"),
        };
        let harvester = StubHarvester {
            shift_days: 0,
            results: vec![FetchResult::from_string(
                "r1",
                "{}",
                Some(at("2024-05-10T00:00:00Z")),
            )],
        };
        let result = run_harvest(&harvester, window).await;
        assert!(matches!(
            result,
            Err(HarvestError::DatestampOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_harvest_tolerates_slight_drift() {
        let window = HarvestWindow {
            start: at("2024-05-01T00:00:00Z"),
            end: at("2024-05-02T00:00:00Z"),
        };
        let harvester = StubHarvester {
            shift_days: 0,
            results: vec![FetchResult::from_string(
                "r1",
                "{}",
                Some(at("2024-05-02T12:00:00Z")),
            )],
        };
        let results = run_harvest(&harvester, window).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_run_harvest_applies_shift_range() {
        let window = HarvestWindow {
            start: at("2024-05-01T00:00:00Z"),
            end: at("2024-05-02T00:00:00Z"),
        };
        // record datestamped within the widened window passes validation
        let harvester = StubHarvester {
            shift_days: 3,
            results: vec![FetchResult::from_string(
                "r1",
                "{}",
                Some(at("2024-04-29T00:00:00Z")),
            )],
        };
        assert!(run_harvest(&harvester, window).await.is_ok());
    }

    #[test]
    fn test_source_client_builds_from_config() {
        let config = crate::config::HarvestConfig::default();
        assert!(SourceClient::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_rate_limiter_delays_after_burst() {
        tokio::time::pause();
        let limiter = RateLimiter::new(2, 10);
        let started = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        // third permit requires a refill wait (auto-advanced while paused)
        limiter.acquire().await;
        assert!(started.elapsed() >= std::time::Duration::from_secs(4));
    }
}
