//! # Application State Management
//!
//! State shared by every HTTP handler and every WebSocket actor.
//!
//! ## What is shared:
//! - **Configuration**: Loaded once at startup and never mutated afterwards
//! - **Finalization pipeline**: The storage rules plus the transcoder and
//!   transcription engines; every connection finalizes through the same one
//! - **Metrics**: Request counters, open connections and recording outcomes
//!
//! Per-connection recording state is *not* here. Each WebSocket actor owns
//! its own session, so connections never contend on a lock for it.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - Every actix worker thread gets a clone of `AppState`; cloning only bumps
//!   reference counts
//!
//! ### RwLock
//! - Metrics are read by `/api/v1/metrics` and written by middleware and
//!   actors. Writes are a handful of integer updates, so `std::sync::RwLock`
//!   is held only briefly and never across an `.await`
//! - A poisoned lock still holds valid counters, so it is recovered with
//!   `PoisonError::into_inner` instead of panicking

use crate::audio::pipeline::FinalizePipeline;
use crate::config::AppConfig;
use crate::protocol::ServerEvent;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// The main application state that's shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Immutable after startup
    pub config: Arc<AppConfig>,

    /// Shared by every connection
    pub pipeline: Arc<FinalizePipeline>,

    /// Constantly updated by middleware and WebSocket actors
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters collected since server start.
///
/// ## Why these metrics matter:
/// - **request_count / error_count**: HTTP load and reliability
/// - **active_sessions**: Open WebSocket connections, bounded by
///   `performance.max_concurrent_sessions`
/// - **rejected_sessions**: Upgrades refused because the cap was reached
/// - **recordings_saved / ingest_errors**: Outcomes sent to clients
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub active_sessions: u32,
    pub rejected_sessions: u64,
    pub recordings_saved: u64,
    pub ingest_errors: u64,

    /// Key: endpoint name (e.g., "GET /health")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific HTTP endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Arc<FinalizePipeline>) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn read_metrics(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_metrics(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by the metrics middleware for every request.
    pub fn increment_request_count(&self) {
        self.write_metrics().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.write_metrics().error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// The first time an endpoint is seen it gets a zeroed [`EndpointMetric`]
    /// through `entry().or_default()`.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write_metrics();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Reserve a slot for a new WebSocket connection.
    ///
    /// Check and increment happen under one write lock, so concurrent upgrades
    /// can never push `active_sessions` past `max_sessions`. Returns `false`
    /// (and counts the rejection) when the cap is reached.
    pub fn try_open_session(&self, max_sessions: usize) -> bool {
        let mut metrics = self.write_metrics();
        if metrics.active_sessions as usize >= max_sessions {
            metrics.rejected_sessions += 1;
            return false;
        }
        metrics.active_sessions += 1;
        true
    }

    /// Release a slot taken by [`try_open_session`](Self::try_open_session).
    ///
    /// Guards against underflow in case a connection is released twice.
    pub fn close_session(&self) {
        let mut metrics = self.write_metrics();
        metrics.active_sessions = metrics.active_sessions.saturating_sub(1);
    }

    /// Count an event that is about to be sent to a client.
    pub fn record_ingest_event(&self, event: &ServerEvent) {
        match event {
            ServerEvent::AudioSaved(_) => self.write_metrics().recordings_saved += 1,
            ServerEvent::Error(_) => self.write_metrics().ingest_errors += 1,
            ServerEvent::Pong(_) | ServerEvent::ReadyForAudio => {}
        }
    }

    /// Get a consistent copy of the metrics without holding the lock while
    /// a response is serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.read_metrics().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average = Total Duration ÷ Number of Requests
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate between 0.0 and 1.0
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
