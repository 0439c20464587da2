//! # Marker cross-validation
//!
//! The fast minute-marker detector occasionally fires on interference
//! bursts. The marker correlator holds each fast marker up against the
//! display path's slow spectral frames: a marker is confirmed only when
//! the slow path also saw above-threshold 1000 Hz energy within half a
//! second of the pulse. Only confirmed markers reach the sync detector.
//!
//! The slow path is advisory. Until its first frame arrives the
//! correlator passes fast markers through unchecked, so a deployment
//! without the display path keeps working.

use arraydeque::{ArrayDeque, Wrapping};

#[cfg(not(test))]
use log::debug;

#[cfg(test)]
use std::println as debug;

use crate::events::{ConfirmedMarker, MarkerEvent, SlowMarkerFrame};

/// Slack around the fast marker's extent when matching slow frames (ms)
const SLOW_MATCH_WINDOW_MS: f32 = 500.0;

/// Slow frames retained for matching
const SLOW_RING_LEN: usize = 16;

/// Confirms fast markers against slow spectral evidence
#[derive(Debug, Default)]
pub struct MarkerCorrelator {
    slow_frames: ArrayDeque<[SlowMarkerFrame; SLOW_RING_LEN], Wrapping>,
    have_slow_source: bool,
    confirmed: u32,
    rejected: u32,
}

impl MarkerCorrelator {
    /// Create with an empty slow-frame ring
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one advisory frame from the slow path
    pub fn slow_frame(&mut self, frame: SlowMarkerFrame) {
        self.have_slow_source = true;
        self.slow_frames.push_back(frame);
    }

    /// Cross-validate a fast marker
    ///
    /// Returns the confirmed marker, or `None` when the slow path was
    /// watching and saw nothing.
    pub fn fast_event(&mut self, marker: &MarkerEvent) -> Option<ConfirmedMarker> {
        let leading_edge_ms = marker.timestamp_ms - marker.duration_ms;

        let confirmed = if self.have_slow_source {
            let lo = leading_edge_ms - SLOW_MATCH_WINDOW_MS;
            let hi = marker.timestamp_ms + SLOW_MATCH_WINDOW_MS;
            self.slow_frames
                .iter()
                .any(|f| f.above_threshold && f.timestamp_ms >= lo && f.timestamp_ms <= hi)
        } else {
            true
        };

        if confirmed {
            self.confirmed += 1;
            Some(ConfirmedMarker {
                timestamp_ms: marker.timestamp_ms,
                leading_edge_ms,
                duration_ms: marker.duration_ms,
            })
        } else {
            self.rejected += 1;
            debug!(
                "marker-corr: rejected fast marker at {:.1} ms, no slow confirmation",
                marker.timestamp_ms
            );
            None
        }
    }

    /// Confirmed marker count
    pub fn confirmed_count(&self) -> u32 {
        self.confirmed
    }

    /// Rejected marker count
    pub fn rejected_count(&self) -> u32 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker_at(ts: f32) -> MarkerEvent {
        MarkerEvent {
            marker_number: 1,
            timestamp_ms: ts,
            duration_ms: 800.0,
            peak_energy: 10.0,
            baseline: 0.1,
            since_last_sec: 60.0,
        }
    }

    fn slow(ts: f32, above: bool) -> SlowMarkerFrame {
        SlowMarkerFrame {
            timestamp_ms: ts,
            energy: if above { 1.0 } else { 0.01 },
            snr_db: if above { 10.0 } else { 0.0 },
            above_threshold: above,
        }
    }

    #[test]
    fn test_pass_through_without_slow_source() {
        let mut corr = MarkerCorrelator::new();
        let out = corr.fast_event(&marker_at(60_000.0));
        let confirmed = out.expect("marker should pass through");
        assert_eq!(confirmed.leading_edge_ms, 59_200.0);
        assert_eq!(corr.confirmed_count(), 1);
    }

    #[test]
    fn test_confirmed_by_slow_frame() {
        let mut corr = MarkerCorrelator::new();
        corr.slow_frame(slow(59_000.0, false));
        corr.slow_frame(slow(59_600.0, true));

        assert!(corr.fast_event(&marker_at(60_000.0)).is_some());
    }

    #[test]
    fn test_rejected_when_slow_path_quiet() {
        let mut corr = MarkerCorrelator::new();
        corr.slow_frame(slow(59_000.0, false));
        corr.slow_frame(slow(59_800.0, false));

        assert!(corr.fast_event(&marker_at(60_000.0)).is_none());
        assert_eq!(corr.rejected_count(), 1);
    }

    #[test]
    fn test_distant_slow_evidence_does_not_confirm() {
        let mut corr = MarkerCorrelator::new();
        // a hot frame from 20 s earlier is stale
        corr.slow_frame(slow(40_000.0, true));
        corr.slow_frame(slow(59_900.0, false));

        assert!(corr.fast_event(&marker_at(60_000.0)).is_none());
    }
}
