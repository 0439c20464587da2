//! # Tick chain correlation
//!
//! Individual tick detections are noisy; what carries timing authority is
//! a *chain* of them spaced almost exactly one second apart. This
//! correlator threads incoming ticks onto chains, widens its interval
//! tolerance with the observed jitter, and once a chain is long and quiet
//! enough starts predicting the next tick outright. Ticks that keep
//! matching the prediction discipline the chain; repeated misses abandon
//! it.
//!
//! A disciplined chain yields the engine's first timing authority: the
//! phase of the second boundary (epoch, ms modulo 1000), estimated as the
//! circular mean of recent tick leading edges and published with a
//! confidence grown from chain length and jitter. The manager installs
//! accepted epochs into the tick detector's timing gate.

use arrayvec::ArrayVec;

#[cfg(not(test))]
use log::{debug, info};

#[cfg(test)]
use std::{println as debug, println as info};

use crate::builder::{check_range, TunableError};
use crate::events::{EpochEstimate, EpochSource, TickEvent};
use crate::logsink::EventLog;

const NOMINAL_INTERVAL_MS: f32 = 1000.0;
const BASE_TOLERANCE_MS: f32 = 10.0;

/// Chain length required before prediction tracking can engage
const TRACKING_MIN_LENGTH: u32 = 5;

/// Maximum interval jitter for prediction tracking (ms, 1σ)
const TRACKING_MAX_STD_MS: f32 = 5.0;

/// Narrowest allowed discipline window (ms)
const MIN_DISCIPLINE_WINDOW_MS: f32 = 10.0;

/// Recent intervals kept for jitter and epoch statistics
const RECENT_LEN: usize = 5;

const DEFAULT_EPOCH_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_MAX_CONSECUTIVE_MISSES: u32 = 5;

/// Chain length at which the length term of the confidence saturates
const CONFIDENCE_SATURATION_LENGTH: f32 = 20.0;

/// Fixed field order of the tick-chain log stream
const LOG_HEADER: &str = "chain_id,length,interval_ms,drift_ms,std_ms,confidence";

/// Statistics for one correlation chain
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChainStats {
    /// Chain identifier, 1-based
    pub chain_id: u32,
    /// Accepted ticks in the chain
    pub tick_count: u32,
    /// Ticks bridged by single-skip correlation
    pub inferred_count: u32,
    /// First tick timestamp
    pub start_ms: f32,
    /// Most recent tick timestamp
    pub end_ms: f32,
    /// Shortest accepted interval
    pub min_interval_ms: f32,
    /// Longest accepted interval
    pub max_interval_ms: f32,
    /// Running mean interval
    pub avg_interval_ms: f32,
    /// Accumulated deviation from the nominal second
    pub total_drift_ms: f32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Tracking {
    active: bool,
    predicted_next_ms: f32,
    discipline_window_ms: f32,
    last_std_ms: f32,
    consecutive_misses: u32,
}

/// Chains ticks into a per-second timing reference
#[derive(Debug)]
pub struct TickChainCorrelator {
    current: Option<ChainStats>,
    chain_count: u32,
    last_tick_ms: f32,
    group_delay_ms: f32,

    recent_intervals: ArrayVec<f32, RECENT_LEN>,
    recent_phases: ArrayVec<f32, RECENT_LEN>,

    tracking: Tracking,

    total_correlated: u32,
    total_uncorrelated: u32,
    longest_chain: u32,

    epoch_confidence_threshold: f32,
    max_consecutive_misses: u32,

    log: Option<EventLog>,
}

impl TickChainCorrelator {
    /// Create with default tunables
    pub fn new(group_delay_ms: f32) -> Self {
        Self {
            current: None,
            chain_count: 0,
            last_tick_ms: 0.0,
            group_delay_ms,
            recent_intervals: ArrayVec::new(),
            recent_phases: ArrayVec::new(),
            tracking: Tracking::default(),
            total_correlated: 0,
            total_uncorrelated: 0,
            longest_chain: 0,
            epoch_confidence_threshold: DEFAULT_EPOCH_CONFIDENCE_THRESHOLD,
            max_consecutive_misses: DEFAULT_MAX_CONSECUTIVE_MISSES,
            log: None,
        }
    }

    /// Attach a log sink for this correlator's records
    pub fn set_log(&mut self, sink: Box<dyn std::io::Write + Send>) {
        self.log = Some(EventLog::new("tick-chain", LOG_HEADER, sink));
    }

    /// Correlate one tick; may yield an epoch estimate
    pub fn record(&mut self, event: &TickEvent) -> Option<EpochEstimate> {
        let ts = event.timestamp_ms;
        let leading_edge = ts - event.duration_ms - self.group_delay_ms;

        if self.current.is_none() {
            self.start_chain(ts, leading_edge);
            return None;
        }

        let interval = ts - self.last_tick_ms;
        let tolerance = self.tolerance_ms();

        if (interval - NOMINAL_INTERVAL_MS).abs() <= tolerance {
            self.extend_chain(ts, leading_edge, interval, 0);
        } else if self.tracking.active
            && (interval - 2.0 * NOMINAL_INTERVAL_MS).abs() <= 2.0 * tolerance
        {
            // one tick swallowed by a fade; bridge it conservatively
            debug!("tick-chain: single-skip bridge over {:.0} ms", interval);
            self.extend_chain(ts, leading_edge, interval, 1);
        } else {
            self.total_uncorrelated += 1;
            if self.tracking.active {
                self.tracking.consecutive_misses += 1;
                if self.tracking.consecutive_misses >= self.max_consecutive_misses {
                    info!(
                        "tick-chain: abandoning chain after {} consecutive misses",
                        self.tracking.consecutive_misses
                    );
                    self.start_chain(ts, leading_edge);
                }
            } else {
                self.start_chain(ts, leading_edge);
            }
            return None;
        }

        self.maybe_epoch()
    }

    // Widen the base tolerance with observed jitter
    fn tolerance_ms(&self) -> f32 {
        BASE_TOLERANCE_MS + 3.0 * self.interval_std_ms()
    }

    fn interval_std_ms(&self) -> f32 {
        if self.recent_intervals.len() < 2 {
            return 0.0;
        }
        let n = self.recent_intervals.len() as f32;
        let mean: f32 = self.recent_intervals.iter().sum::<f32>() / n;
        let var: f32 = self
            .recent_intervals
            .iter()
            .map(|i| (i - mean) * (i - mean))
            .sum::<f32>()
            / n;
        var.sqrt()
    }

    fn push_recent(&mut self, interval: f32, phase: f32) {
        if self.recent_intervals.is_full() {
            self.recent_intervals.remove(0);
        }
        self.recent_intervals.push(interval);
        if self.recent_phases.is_full() {
            self.recent_phases.remove(0);
        }
        self.recent_phases.push(phase);
    }

    fn start_chain(&mut self, ts: f32, leading_edge: f32) {
        self.chain_count += 1;
        self.current = Some(ChainStats {
            chain_id: self.chain_count,
            tick_count: 1,
            inferred_count: 0,
            start_ms: ts,
            end_ms: ts,
            min_interval_ms: f32::MAX,
            max_interval_ms: 0.0,
            avg_interval_ms: 0.0,
            total_drift_ms: 0.0,
        });
        self.last_tick_ms = ts;
        self.recent_intervals.clear();
        self.recent_phases.clear();
        self.push_phase_only(leading_edge);
        self.tracking = Tracking::default();
        debug!("tick-chain: chain #{} started at {:.1} ms", self.chain_count, ts);
    }

    fn push_phase_only(&mut self, leading_edge: f32) {
        if self.recent_phases.is_full() {
            self.recent_phases.remove(0);
        }
        self.recent_phases.push(leading_edge.rem_euclid(1000.0));
    }

    fn extend_chain(&mut self, ts: f32, leading_edge: f32, interval: f32, inferred: u32) {
        let chain = self.current.as_mut().expect("chain must exist to extend");

        chain.tick_count += 1 + inferred;
        chain.inferred_count += inferred;
        chain.end_ms = ts;

        let per_tick = interval / (1.0 + inferred as f32);
        chain.min_interval_ms = chain.min_interval_ms.min(per_tick);
        chain.max_interval_ms = chain.max_interval_ms.max(per_tick);
        chain.total_drift_ms += interval - NOMINAL_INTERVAL_MS * (1.0 + inferred as f32);

        let n = chain.tick_count as f32;
        chain.avg_interval_ms = ((n - 1.0) * chain.avg_interval_ms + per_tick) / n;

        self.last_tick_ms = ts;
        self.total_correlated += 1;
        self.longest_chain = self.longest_chain.max(chain.tick_count);

        self.push_recent(per_tick, leading_edge.rem_euclid(1000.0));

        // prediction discipline
        let std = self.interval_std_ms();
        let chain = self.current.as_ref().expect("chain must exist");
        if chain.tick_count >= TRACKING_MIN_LENGTH && std <= TRACKING_MAX_STD_MS {
            self.tracking.active = true;
            self.tracking.predicted_next_ms = ts + chain.avg_interval_ms;
            self.tracking.discipline_window_ms = (3.0 * std).max(MIN_DISCIPLINE_WINDOW_MS);
            self.tracking.last_std_ms = std;
            self.tracking.consecutive_misses = 0;
        }

        let confidence = self.confidence();
        if let Some(log) = self.log.as_mut() {
            log.record(
                ts,
                format_args!(
                    "{},{},{:.1},{:.1},{:.2},{:.3}",
                    chain.chain_id,
                    chain.tick_count,
                    interval,
                    chain.total_drift_ms,
                    std,
                    confidence
                ),
            );
        }
    }

    // Chain length and jitter fused into one confidence figure
    fn confidence(&self) -> f32 {
        let Some(chain) = self.current.as_ref() else {
            return 0.0;
        };
        let length_term = (chain.tick_count as f32 / CONFIDENCE_SATURATION_LENGTH).min(1.0);
        let jitter_term = (1.0 - self.interval_std_ms() / BASE_TOLERANCE_MS).clamp(0.0, 1.0);
        length_term * jitter_term
    }

    fn maybe_epoch(&mut self) -> Option<EpochEstimate> {
        if !self.tracking.active {
            return None;
        }
        let confidence = self.confidence();
        if confidence < self.epoch_confidence_threshold {
            return None;
        }

        Some(EpochEstimate {
            epoch_ms: self.epoch_phase_ms(),
            source: EpochSource::TickChain,
            confidence,
        })
    }

    // Circular mean of recent leading-edge phases, mod 1000 ms
    fn epoch_phase_ms(&self) -> f32 {
        let mut sin_sum = 0.0f32;
        let mut cos_sum = 0.0f32;
        for &phase in self.recent_phases.iter() {
            let angle = phase / 1000.0 * 2.0 * std::f32::consts::PI;
            sin_sum += angle.sin();
            cos_sum += angle.cos();
        }
        let mean_angle = sin_sum.atan2(cos_sum);
        (mean_angle / (2.0 * std::f32::consts::PI) * 1000.0).rem_euclid(1000.0)
    }

    /// Statistics of the chain in progress
    pub fn current_chain(&self) -> Option<&ChainStats> {
        self.current.as_ref()
    }

    /// True while prediction tracking is engaged
    pub fn tracking_active(&self) -> bool {
        self.tracking.active
    }

    /// Predicted timestamp of the next tick, if tracking
    pub fn predicted_next_ms(&self) -> Option<f32> {
        self.tracking.active.then_some(self.tracking.predicted_next_ms)
    }

    /// Total ticks threaded onto chains
    pub fn correlated_count(&self) -> u32 {
        self.total_correlated
    }

    /// Total ticks that matched no chain
    pub fn uncorrelated_count(&self) -> u32 {
        self.total_uncorrelated
    }

    /// Longest chain seen
    pub fn longest_chain(&self) -> u32 {
        self.longest_chain
    }

    /// Confidence required before an epoch is published; range `[0.1, 1]`
    pub fn set_epoch_confidence_threshold(&mut self, value: f32) -> Result<(), TunableError> {
        self.epoch_confidence_threshold =
            check_range("tick-chain epoch_confidence_threshold", value, 0.1, 1.0)?;
        Ok(())
    }

    /// Prediction misses tolerated before abandonment; range `[1, 30]`
    pub fn set_max_consecutive_misses(&mut self, value: u32) -> Result<(), TunableError> {
        self.max_consecutive_misses =
            check_range("tick-chain max_consecutive_misses", value as f32, 1.0, 30.0)? as u32;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_at(ts: f32) -> TickEvent {
        TickEvent {
            timestamp_ms: ts,
            duration_ms: 8.0,
            ..TickEvent::default()
        }
    }

    fn feed_regular(corr: &mut TickChainCorrelator, start: f32, count: u32) -> Vec<EpochEstimate> {
        (0..count)
            .filter_map(|n| corr.record(&tick_at(start + n as f32 * 1000.0)))
            .collect()
    }

    #[test]
    fn test_chain_builds_and_publishes_epoch() {
        let mut corr = TickChainCorrelator::new(3.0);

        let epochs = feed_regular(&mut corr, 1011.0, 15);
        assert!(corr.tracking_active());

        let chain = corr.current_chain().unwrap();
        assert_eq!(chain.tick_count, 15);
        assert_eq!(chain.inferred_count, 0);
        assert!((chain.avg_interval_ms - 1000.0).abs() < 0.5);

        // epoch appears once length × consistency clears the threshold
        assert!(!epochs.is_empty());
        let epoch = epochs.last().unwrap();
        assert_eq!(epoch.source, EpochSource::TickChain);
        assert!(epoch.confidence >= 0.5);

        // leading edge = 1011 − 8 − 3 = 1000 → phase 0
        assert!(
            epoch.epoch_ms < 2.0 || epoch.epoch_ms > 998.0,
            "epoch {}",
            epoch.epoch_ms
        );
    }

    #[test]
    fn test_outlier_breaks_untracked_chain() {
        let mut corr = TickChainCorrelator::new(3.0);

        feed_regular(&mut corr, 1000.0, 3);
        assert_eq!(corr.current_chain().unwrap().tick_count, 3);

        // a wildly off-interval tick before tracking engages restarts
        corr.record(&tick_at(3400.0));
        assert_eq!(corr.current_chain().unwrap().tick_count, 1);
        assert_eq!(corr.uncorrelated_count(), 1);
    }

    #[test]
    fn test_single_skip_bridges_missing_tick() {
        let mut corr = TickChainCorrelator::new(3.0);

        feed_regular(&mut corr, 1000.0, 8);
        assert!(corr.tracking_active());

        // the :29 tick is absent; the next arrives two seconds later
        corr.record(&tick_at(10_000.0));
        let chain = corr.current_chain().unwrap();
        assert_eq!(chain.inferred_count, 1);
        assert_eq!(chain.tick_count, 10);
    }

    #[test]
    fn test_consecutive_misses_abandon_chain() {
        let mut corr = TickChainCorrelator::new(3.0);

        feed_regular(&mut corr, 1000.0, 8);
        assert!(corr.tracking_active());
        let first_chain = corr.current_chain().unwrap().chain_id;

        // ticks at nonsense intervals; after enough misses the chain
        // is abandoned and restarted
        let mut ts = 8300.0;
        for _ in 0..DEFAULT_MAX_CONSECUTIVE_MISSES {
            ts += 437.0;
            corr.record(&tick_at(ts));
        }
        let chain = corr.current_chain().unwrap();
        assert_ne!(chain.chain_id, first_chain);
        assert_eq!(chain.tick_count, 1);
        assert!(!corr.tracking_active());
    }

    #[test]
    fn test_jitter_widens_tolerance() {
        let mut corr = TickChainCorrelator::new(3.0);

        // intervals wobbling ±8 ms: each stays inside the widened band
        let mut ts = 1000.0;
        corr.record(&tick_at(ts));
        for n in 0..10 {
            ts += if n % 2 == 0 { 1008.0 } else { 992.0 };
            corr.record(&tick_at(ts));
        }
        assert_eq!(corr.current_chain().unwrap().tick_count, 11);
    }

    #[test]
    fn test_epoch_phase_wraps_circularly() {
        // phases straddling the 0/1000 boundary must not average to 500
        let mut corr = TickChainCorrelator::new(0.0);
        for n in 0..12u32 {
            // leading edges alternate 999.0 and 1.0 (mod 1000)
            let wobble = if n % 2 == 0 { -1.0 } else { 1.0 };
            corr.record(&TickEvent {
                timestamp_ms: n as f32 * 1000.0 + 1000.0 + wobble,
                duration_ms: 0.0,
                ..TickEvent::default()
            });
        }
        let phase = corr.epoch_phase_ms();
        assert!(
            phase < 2.0 || phase > 998.0,
            "circular mean drifted to {}",
            phase
        );
    }

    #[test]
    fn test_tunable_ranges() {
        let mut corr = TickChainCorrelator::new(3.0);
        assert!(corr.set_epoch_confidence_threshold(0.8).is_ok());
        assert!(corr.set_epoch_confidence_threshold(0.0).is_err());
        assert!(corr.set_max_consecutive_misses(10).is_ok());
        assert!(corr.set_max_consecutive_misses(0).is_err());
    }
}
