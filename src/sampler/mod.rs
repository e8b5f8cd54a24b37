//! Throttled location sampling on top of a continuous position source.

pub mod line_source;
pub mod source;

pub use line_source::LineSource;
pub use source::{FixSink, PermissionQuery, PermissionState, PositionSource, WatchId, WatchOptions};

use crate::error::{PositioningError, PositioningErrorCode};
use crate::models::{LocationPoint, RawFix, SourceError};
use chrono::DateTime;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

pub type PointCallback = Arc<dyn Fn(LocationPoint) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(PositioningError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerOptions {
    pub watch: WatchOptions,
    /// Minimum spacing between two emitted points, on the device clock.
    pub throttle: Duration,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            watch: WatchOptions::default(),
            throttle: Duration::from_secs(30),
        }
    }
}

/// Minimum-interval filter keyed on device-reported instants.
#[derive(Debug, Clone)]
pub struct Throttle {
    window_ms: i64,
    last_emitted: Option<i64>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as i64,
            last_emitted: None,
        }
    }

    /// Returns true when a fix taken at `t` (epoch ms) may be emitted.
    pub fn admit(&mut self, t: i64) -> bool {
        let due = match self.last_emitted {
            None => true,
            Some(last) => t - last >= self.window_ms,
        };
        if due {
            self.last_emitted = Some(t);
        }
        due
    }
}

#[derive(Default)]
struct WatchState {
    watch_id: Option<WatchId>,
    generation: u64,
    throttle: Option<Throttle>,
    on_point: Option<PointCallback>,
    on_error: Option<ErrorCallback>,
}

pub struct Sampler {
    source: Option<Arc<dyn PositionSource>>,
    permissions: Option<Arc<dyn PermissionQuery>>,
    options: SamplerOptions,
    state: Arc<Mutex<WatchState>>,
}

impl Sampler {
    pub fn new(
        source: Option<Arc<dyn PositionSource>>,
        permissions: Option<Arc<dyn PermissionQuery>>,
        options: SamplerOptions,
    ) -> Self {
        Self {
            source,
            permissions,
            options,
            state: Arc::new(Mutex::new(WatchState::default())),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.source.is_some()
    }

    /// Queries permission without prompting the user.
    pub async fn check_permission(&self) -> PermissionState {
        if !self.is_supported() {
            return PermissionState::Unavailable;
        }
        let Some(permissions) = &self.permissions else {
            return PermissionState::Prompt;
        };
        match permissions.query().await {
            Ok(state) => state,
            Err(e) => {
                debug!("Permission query failed, treating as prompt: {}", e);
                PermissionState::Prompt
            }
        }
    }

    /// Forces the permission prompt through a one-shot position request.
    ///
    /// Only an explicit denial maps to `Denied`; a fix that fails for any
    /// other reason still proves the permission was granted.
    pub async fn request_permission(&self) -> PermissionState {
        let Some(source) = &self.source else {
            return PermissionState::Unavailable;
        };
        match source.current_position(self.options.watch).await {
            Ok(_) => PermissionState::Granted,
            Err(e) if e.code == SourceError::PERMISSION_DENIED => PermissionState::Denied,
            Err(e) => {
                debug!("One-shot position failed without denial: {}", e.message);
                PermissionState::Granted
            }
        }
    }

    pub fn start(&self, on_point: PointCallback, on_error: Option<ErrorCallback>) {
        let Some(source) = &self.source else {
            if let Some(on_error) = on_error {
                on_error(PositioningError::new(
                    PositioningErrorCode::NotSupported,
                    "Geolocation is not supported on this device",
                ));
            }
            return;
        };

        self.stop();

        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.throttle = Some(Throttle::new(self.options.throttle));
            state.on_point = Some(on_point);
            state.on_error = on_error;
            state.generation
        };

        let shared = Arc::clone(&self.state);
        let sink: FixSink = Arc::new(move |report| dispatch(&shared, generation, report));
        let id = source.watch(sink, self.options.watch);

        let mut state = self.lock();
        if state.generation == generation {
            state.watch_id = Some(id);
        } else {
            drop(state);
            source.clear_watch(id);
        }
    }

    pub fn stop(&self) {
        let watch_id = {
            let mut state = self.lock();
            state.generation += 1;
            state.throttle = None;
            state.on_point = None;
            state.on_error = None;
            state.watch_id.take()
        };
        if let (Some(id), Some(source)) = (watch_id, &self.source) {
            source.clear_watch(id);
        }
    }

    pub fn is_watching(&self) -> bool {
        self.lock().watch_id.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch(state: &Mutex<WatchState>, generation: u64, report: Result<RawFix, SourceError>) {
    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.generation != generation {
        return;
    }

    match report.map_err(positioning_error).and_then(normalize) {
        Ok(point) => {
            let ts = point.timestamp.timestamp_millis();
            let admitted = guard.throttle.as_mut().is_some_and(|t| t.admit(ts));
            if !admitted {
                debug!("Throttled fix at {}", ts);
                return;
            }
            let callback = guard.on_point.clone();
            drop(guard);
            if let Some(cb) = callback {
                cb(point);
            }
        }
        Err(err) => {
            warn!("Positioning error: {}", err);
            let callback = guard.on_error.clone();
            drop(guard);
            if let Some(cb) = callback {
                cb(err);
            }
        }
    }
}

/// Maps a source error code onto the positioning taxonomy.
pub fn positioning_error(err: SourceError) -> PositioningError {
    match err.code {
        SourceError::PERMISSION_DENIED => PositioningError::new(
            PositioningErrorCode::PermissionDenied,
            "Location permission denied",
        ),
        SourceError::POSITION_UNAVAILABLE => PositioningError::new(
            PositioningErrorCode::PositionUnavailable,
            "Position unavailable",
        ),
        SourceError::TIMEOUT => PositioningError::new(
            PositioningErrorCode::Timeout,
            "Timed out while acquiring position",
        ),
        _ => PositioningError::new(PositioningErrorCode::PositionUnavailable, err.message),
    }
}

/// Converts a raw fix into a live point.
pub fn normalize(fix: RawFix) -> Result<LocationPoint, PositioningError> {
    let timestamp = DateTime::from_timestamp_millis(fix.timestamp).ok_or_else(|| {
        PositioningError::new(
            PositioningErrorCode::PositionUnavailable,
            format!("Invalid fix timestamp: {}", fix.timestamp),
        )
    })?;

    Ok(LocationPoint {
        timestamp,
        latitude: fix.latitude,
        longitude: fix.longitude,
        accuracy: fix.accuracy,
        heading: fix.heading,
        speed: fix.speed,
        is_offline_buffer: false,
    })
}
