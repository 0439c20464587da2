//! # Synchronization by evidence fusion
//!
//! Nothing in the broadcast is reliable on its own over HF: ticks vanish
//! into static, markers smear under multipath, the BCD subcarrier fades
//! in and out. The sync detector therefore treats every detector output
//! as weighted *evidence* about where the second and minute boundaries
//! lie, and maintains a single fused confidence:
//!
//! | evidence | weight | tolerance |
//! |---|---|---|
//! | tick on the second boundary | 0.15 | ±10 ms |
//! | confirmed minute marker | 0.45 | ±30 ms |
//! | BCD position marker | 0.40 | ±30 ms |
//! | tick hole at :29/:59 | 0.20 | — |
//! | hole followed by marker | 0.65 | ±30 ms |
//!
//! Matching evidence boosts confidence by `weight × (1 − confidence)`;
//! a second that passes without its expected tick decays it. The minute
//! anchor — the leading edge of the last confirmed marker — is what the
//! BCD windower keys its symbol windows off, and `current_second` simply
//! counts seconds since that anchor.
//!
//! States: SEARCHING until the first marker, ACQUIRING while confidence
//! builds, LOCKED once three consecutive markers agree (or confidence
//! clears the lock threshold), RECOVERING when an expected marker goes
//! missing, and back to SEARCHING if recovery stalls for 90 seconds.

#[cfg(not(test))]
use log::{debug, info};

#[cfg(test)]
use std::{println as debug, println as info};

use crate::events::{evidence, FrameTime, SyncState};
use crate::logsink::EventLog;
use crate::station::{is_p_marker_second, TICK_HOLE_SECONDS};

const W_TICK: f32 = 0.15;
const W_MARKER: f32 = 0.45;
const W_P_MARKER: f32 = 0.40;
const W_TICK_HOLE: f32 = 0.20;
const W_HOLE_MARKER: f32 = 0.65;

const TOL_TICK_MS: f32 = 10.0;
const TOL_MARKER_MS: f32 = 30.0;
const TOL_P_MARKER_MS: f32 = 30.0;

const DECAY_NORMAL: f32 = 0.01;
const DECAY_RECOVERY: f32 = 0.05;

const LOCK_THRESHOLD: f32 = 0.75;
const LOCK_AGREEING_MARKERS: u32 = 3;
const RECOVER_TIMEOUT_MS: f32 = 90_000.0;

/// A marker this soon after a tick hole corroborates the minute boundary
const HOLE_MARKER_MAX_GAP_MS: f32 = 1_500.0;

const MINUTE_MS: f32 = 60_000.0;
const SECOND_MS: f32 = 1_000.0;

/// Fixed field order of the sync log stream
const LOG_HEADER: &str = "state,second,confidence,evidence";

/// Fuses detector evidence into a frame-time reference
#[derive(Debug, Default)]
pub struct SyncDetector {
    state: SyncState,
    confidence: f32,
    evidence_mask: u8,

    anchor_ms: Option<f32>,
    predicted_marker_ms: Option<f32>,
    agreeing_markers: u32,
    last_marker_ms: f32,
    recovering_since_ms: f32,

    current_second: u32,
    second_boundary_ms: f32,
    tick_seen: bool,
    last_hole_ms: Option<f32>,

    log: Option<EventLog>,
}

impl SyncDetector {
    /// Create in SEARCHING
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a log sink for this detector's records
    pub fn set_log(&mut self, sink: Box<dyn std::io::Write + Send>) {
        self.log = Some(EventLog::new("sync", LOG_HEADER, sink));
    }

    /// Feed a confirmed minute marker by its leading (on-time) edge
    pub fn on_marker(&mut self, leading_edge_ms: f32, _duration_ms: f32) {
        let Some(anchor) = self.anchor_ms else {
            self.rebase(leading_edge_ms);
            self.agreeing_markers = 1;
            self.boost(W_MARKER, evidence::MARKER);
            if self.state == SyncState::Searching {
                self.state = SyncState::Acquiring;
                info!("sync: first marker at {:.1} ms, acquiring", leading_edge_ms);
            }
            self.log_state(leading_edge_ms);
            return;
        };

        // nearest whole-minute multiple of the anchor
        let k = ((leading_edge_ms - anchor) / MINUTE_MS).round().max(1.0);
        let expected = anchor + k * MINUTE_MS;
        let err = leading_edge_ms - expected;

        if err.abs() <= TOL_MARKER_MS {
            self.agreeing_markers += 1;

            let hole_combo = self
                .last_hole_ms
                .map_or(false, |hole| {
                    let gap = leading_edge_ms - hole;
                    (0.0..=HOLE_MARKER_MAX_GAP_MS).contains(&gap)
                });
            if hole_combo {
                self.boost(W_HOLE_MARKER, evidence::HOLE_MARKER);
            } else {
                self.boost(W_MARKER, evidence::MARKER);
            }

            self.rebase(leading_edge_ms);

            match self.state {
                SyncState::Acquiring
                    if self.agreeing_markers >= LOCK_AGREEING_MARKERS
                        || self.confidence >= LOCK_THRESHOLD =>
                {
                    self.state = SyncState::Locked;
                    info!(
                        "sync: locked after {} agreeing markers, confidence {:.2}",
                        self.agreeing_markers, self.confidence
                    );
                }
                SyncState::Recovering => {
                    self.state = SyncState::Locked;
                    info!("sync: marker reacquired, locked");
                }
                _ => {}
            }
        } else {
            debug!(
                "sync: marker off schedule by {:.1} ms in {:?}",
                err, self.state
            );
            self.agreeing_markers = 1;
            match self.state {
                SyncState::Searching | SyncState::Acquiring => {
                    // trust the newest marker while still acquiring
                    self.rebase(leading_edge_ms);
                    self.state = SyncState::Acquiring;
                }
                SyncState::Locked | SyncState::Recovering => {
                    // an established schedule outranks one stray marker
                }
            }
        }
        self.log_state(leading_edge_ms);
    }

    /// Feed an accepted tick by its leading edge
    pub fn on_tick(&mut self, leading_edge_ms: f32) {
        self.tick_seen = true;

        let Some(anchor) = self.anchor_ms else {
            return;
        };
        if self.evidence_mask & evidence::TICK != 0 {
            return;
        }

        let phase = (leading_edge_ms - anchor).rem_euclid(SECOND_MS);
        let dist = phase.min(SECOND_MS - phase);
        if dist <= TOL_TICK_MS {
            self.boost(W_TICK, evidence::TICK);
        }
    }

    /// Feed a BCD position marker decoded by the symbol windower
    pub fn on_p_marker(&mut self, timestamp_ms: f32, second: u32) {
        let Some(anchor) = self.anchor_ms else {
            return;
        };
        if !is_p_marker_second(second) {
            return;
        }

        // the symbol timestamp is the window center
        let expected = anchor + second as f32 * SECOND_MS + SECOND_MS / 2.0;
        let err = (timestamp_ms - expected).rem_euclid(MINUTE_MS);
        let dist = err.min(MINUTE_MS - err);
        if dist <= TOL_P_MARKER_MS {
            self.boost(W_P_MARKER, evidence::P_MARKER);
        }
    }

    /// Advance the second schedule to `now_ms`
    ///
    /// Call periodically from the sample path. Closes out elapsed
    /// seconds (decaying or crediting hole evidence), supervises the
    /// marker schedule, and times recovery out.
    pub fn advance(&mut self, now_ms: f32) {
        if self.anchor_ms.is_none() {
            return;
        }

        while now_ms >= self.second_boundary_ms {
            let closing = self.current_second;

            if !self.tick_seen {
                if TICK_HOLE_SECONDS.contains(&closing) {
                    // the broadcast omits these ticks; silence here is
                    // evidence the schedule is right
                    self.last_hole_ms = Some(self.second_boundary_ms);
                    self.boost(W_TICK_HOLE, evidence::TICK_HOLE);
                } else {
                    let decay = if self.state == SyncState::Recovering {
                        DECAY_RECOVERY
                    } else {
                        DECAY_NORMAL
                    };
                    self.confidence *= 1.0 - decay;
                }
            }

            self.tick_seen = false;
            self.evidence_mask = 0;
            self.current_second = (self.current_second + 1) % 60;
            self.second_boundary_ms += SECOND_MS;
        }

        if let Some(pred) = self.predicted_marker_ms {
            if now_ms > pred + TOL_MARKER_MS {
                self.predicted_marker_ms = Some(pred + MINUTE_MS);
                if self.state == SyncState::Locked {
                    self.state = SyncState::Recovering;
                    self.recovering_since_ms = now_ms;
                    info!("sync: expected marker missed, recovering");
                    self.log_state(now_ms);
                }
            }

            if self.state == SyncState::Recovering
                && now_ms - self.recovering_since_ms > RECOVER_TIMEOUT_MS
            {
                info!("sync: recovery timed out, searching");
                self.reset_to_searching();
                self.log_state(now_ms);
            }
        }
    }

    // Re-anchor the minute at a fresh confirmed marker
    fn rebase(&mut self, leading_edge_ms: f32) {
        self.anchor_ms = Some(leading_edge_ms);
        self.predicted_marker_ms = Some(leading_edge_ms + MINUTE_MS);
        self.last_marker_ms = leading_edge_ms;
        self.current_second = 0;
        self.second_boundary_ms = leading_edge_ms + SECOND_MS;
        self.tick_seen = false;
    }

    fn reset_to_searching(&mut self) {
        self.state = SyncState::Searching;
        self.confidence = 0.0;
        self.evidence_mask = 0;
        self.anchor_ms = None;
        self.predicted_marker_ms = None;
        self.agreeing_markers = 0;
        self.last_hole_ms = None;
        self.tick_seen = false;
    }

    fn boost(&mut self, weight: f32, bit: u8) {
        self.confidence += weight * (1.0 - self.confidence);
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self.evidence_mask |= bit;
    }

    fn log_state(&mut self, timestamp_ms: f32) {
        let (state, second, confidence, mask) = (
            self.state,
            self.current_second,
            self.confidence,
            self.evidence_mask,
        );
        if let Some(log) = self.log.as_mut() {
            log.record(
                timestamp_ms,
                format_args!("{},{},{:.3},{:#04x}", state, second, confidence, mask),
            );
        }
    }

    /// Current fused frame time
    pub fn frame_time(&self) -> FrameTime {
        FrameTime {
            current_second: self.current_second,
            second_start_ms: self.second_boundary_ms - SECOND_MS,
            confidence: self.confidence,
            evidence: self.evidence_mask,
            state: self.state,
        }
    }

    /// Synchronization state
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Fused confidence in `[0, 1]`
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Second within the minute
    pub fn current_second(&self) -> u32 {
        self.current_second
    }

    /// Minute anchor regardless of state, if one exists
    pub fn minute_anchor_ms(&self) -> Option<f32> {
        self.anchor_ms
    }

    /// Minute anchor, but only while LOCKED
    ///
    /// This is what the BCD symbol windower keys off.
    pub fn locked_anchor_ms(&self) -> Option<f32> {
        (self.state == SyncState::Locked)
            .then_some(self.anchor_ms)
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // three agreeing markers a minute apart
    fn locked_detector() -> SyncDetector {
        let mut sync = SyncDetector::new();
        sync.on_marker(10_000.0, 800.0);
        sync.advance(69_990.0);
        sync.on_marker(70_000.0, 800.0);
        sync.advance(129_990.0);
        sync.on_marker(130_000.0, 800.0);
        assert_eq!(sync.state(), SyncState::Locked);
        sync
    }

    #[test]
    fn test_searching_to_acquiring_to_locked() {
        let mut sync = SyncDetector::new();
        assert_eq!(sync.state(), SyncState::Searching);
        assert_eq!(sync.locked_anchor_ms(), None);

        sync.on_marker(10_000.0, 800.0);
        assert_eq!(sync.state(), SyncState::Acquiring);
        assert!(sync.confidence() > 0.4);
        assert_eq!(sync.locked_anchor_ms(), None);

        sync.advance(69_990.0);
        sync.on_marker(70_000.0, 800.0);
        assert_eq!(sync.state(), SyncState::Acquiring);

        sync.advance(129_990.0);
        sync.on_marker(130_000.0, 800.0);
        assert_eq!(sync.state(), SyncState::Locked);
        assert_eq!(sync.locked_anchor_ms(), Some(130_000.0));
        assert_eq!(sync.current_second(), 0);
    }

    #[test]
    fn test_second_advances_once_per_second() {
        let mut sync = locked_detector();
        let anchor = sync.minute_anchor_ms().unwrap();

        for sec in 0..25u32 {
            let now = anchor + sec as f32 * 1000.0 + 500.0;
            sync.advance(now);
            assert_eq!(sync.current_second(), sec, "at {} ms", now);
        }
    }

    #[test]
    fn test_ticks_boost_confidence_once_per_second() {
        let mut sync = locked_detector();
        let anchor = sync.minute_anchor_ms().unwrap();
        let before = sync.confidence();

        sync.advance(anchor + 1_100.0);
        sync.on_tick(anchor + 2_000.0);
        let after_one = sync.confidence();
        assert!(after_one > before);

        // a duplicate tick in the same second adds nothing
        sync.on_tick(anchor + 2_001.0);
        assert_eq!(sync.confidence(), after_one);
    }

    #[test]
    fn test_off_phase_tick_adds_nothing() {
        let mut sync = locked_detector();
        let anchor = sync.minute_anchor_ms().unwrap();
        let before = sync.confidence();

        sync.advance(anchor + 1_100.0);
        sync.on_tick(anchor + 2_400.0);
        assert_eq!(sync.confidence(), before);
    }

    #[test]
    fn test_missed_ticks_decay_confidence() {
        let mut sync = locked_detector();
        let anchor = sync.minute_anchor_ms().unwrap();
        let before = sync.confidence();

        // ten silent seconds with no ticks at all
        sync.advance(anchor + 10_500.0);
        let after = sync.confidence();
        assert!(after < before, "{} -> {}", before, after);
        // ordinary decay is gentle
        assert!(after > before * 0.85);
    }

    #[test]
    fn test_tick_hole_is_positive_evidence() {
        let mut sync = locked_detector();
        let anchor = sync.minute_anchor_ms().unwrap();

        // ticks every second up to :28, then silence across :29
        for sec in 0..29u32 {
            sync.advance(anchor + sec as f32 * 1000.0 + 100.0);
            sync.on_tick(anchor + sec as f32 * 1000.0);
        }
        let before = sync.confidence();
        sync.advance(anchor + 30_200.0);
        assert!(
            sync.confidence() > before,
            "hole should boost: {} -> {}",
            before,
            sync.confidence()
        );
        assert_eq!(sync.current_second(), 30);
    }

    #[test]
    fn test_hole_then_marker_combo() {
        let mut sync = SyncDetector::new();
        sync.on_marker(10_000.0, 800.0);
        let anchor = 10_000.0;

        // quiet :59 hole right before the next marker
        for sec in 0..59u32 {
            sync.advance(anchor + sec as f32 * 1000.0 + 100.0);
            sync.on_tick(anchor + sec as f32 * 1000.0);
        }
        // the marker event completes well after the minute boundary, so
        // the :59 hole has already been credited by then
        sync.advance(anchor + 60_500.0);
        let before = sync.confidence();

        sync.on_marker(anchor + 60_000.0, 800.0);
        let gain = (sync.confidence() - before) / (1.0 - before);
        // the combined hole+marker weight, not the plain marker weight
        assert!(gain > 0.6, "combined weight gain {}", gain);
    }

    #[test]
    fn test_missed_marker_recovers_then_relocks() {
        let mut sync = locked_detector();
        let anchor = sync.minute_anchor_ms().unwrap();

        // the next marker never comes
        sync.advance(anchor + 60_100.0);
        assert_eq!(sync.state(), SyncState::Recovering);

        // the minute after, one shows up on schedule
        sync.advance(anchor + 119_990.0);
        sync.on_marker(anchor + 120_000.0, 800.0);
        assert_eq!(sync.state(), SyncState::Locked);
    }

    #[test]
    fn test_recovery_times_out_to_searching() {
        let mut sync = locked_detector();
        let anchor = sync.minute_anchor_ms().unwrap();

        sync.advance(anchor + 60_100.0);
        assert_eq!(sync.state(), SyncState::Recovering);

        // still inside the recovery window
        sync.advance(anchor + 95_000.0);
        assert_eq!(sync.state(), SyncState::Recovering);

        sync.advance(anchor + 155_000.0);
        assert_eq!(sync.state(), SyncState::Searching);
        assert_eq!(sync.minute_anchor_ms(), None);
        assert_eq!(sync.confidence(), 0.0);
    }

    #[test]
    fn test_p_marker_evidence() {
        let mut sync = locked_detector();
        let anchor = sync.minute_anchor_ms().unwrap();

        sync.advance(anchor + 9_100.0);
        let before = sync.confidence();
        // window center of second 9
        sync.on_p_marker(anchor + 9_500.0, 9);
        assert!(sync.confidence() > before);

        // an on-time P report for an illegal position is ignored
        let conf = sync.confidence();
        sync.on_p_marker(anchor + 5_500.0, 5);
        assert_eq!(sync.confidence(), conf);
    }

    #[test]
    fn test_stray_marker_does_not_move_locked_anchor() {
        let mut sync = locked_detector();
        let anchor = sync.minute_anchor_ms().unwrap();

        sync.on_marker(anchor + 31_000.0, 800.0);
        assert_eq!(sync.minute_anchor_ms(), Some(anchor));
        assert_eq!(sync.state(), SyncState::Locked);
    }

    #[test]
    fn test_confidence_stays_bounded() {
        let mut sync = locked_detector();
        let anchor = sync.minute_anchor_ms().unwrap();
        for n in 1..200u32 {
            sync.advance(anchor + n as f32 * 60_000.0 - 10.0);
            sync.on_marker(anchor + n as f32 * 60_000.0, 800.0);
        }
        assert!(sync.confidence() <= 1.0);
        assert!(sync.confidence() > 0.9);
    }
}
