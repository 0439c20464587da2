//! Event vocabulary
//!
//! Every detector and correlator reports its findings as one of the typed
//! events here. The [`DetectorManager`](crate::manager::DetectorManager)
//! routes them internally and republishes them to the caller as a single
//! tagged [`WwvEvent`] stream, so downstream code never registers
//! callbacks against individual detectors.

/// A detected second tick
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickEvent {
    /// Running count of accepted ticks
    pub tick_number: u32,

    /// Trailing edge of the pulse, ms since detector start
    pub timestamp_ms: f32,

    /// Interval since the previous accepted tick (0 for the first)
    pub interval_ms: f32,

    /// Mean interval over the recent history window
    pub avg_interval_ms: f32,

    /// Measured pulse duration
    pub duration_ms: f32,

    /// Peak bucket energy during the pulse
    pub peak_energy: f32,

    /// Energy noise floor at emission time
    pub noise_floor: f32,

    /// Peak matched-filter correlation during the pulse
    pub corr_peak: f32,

    /// `corr_peak / correlation_noise_floor`, or 0 when the floor is
    /// too small to divide by
    pub corr_ratio: f32,
}

/// A minute marker recognized on the tick channel by its duration
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickMarkerEvent {
    /// Running count of accepted tick-channel markers
    pub marker_number: u32,

    /// Trailing edge of the pulse, ms since detector start
    pub timestamp_ms: f32,

    /// On-time leading edge: trailing edge minus duration minus the
    /// channel filter group delay
    pub leading_edge_ms: f32,

    /// Measured pulse duration
    pub duration_ms: f32,

    /// Matched-filter correlation ratio at emission
    pub corr_ratio: f32,

    /// Interval since the previous tick-channel marker
    pub interval_ms: f32,
}

/// A minute marker from the sliding-window marker detector
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MarkerEvent {
    /// Running count of accepted markers
    pub marker_number: u32,

    /// Trailing edge, ms since detector start
    pub timestamp_ms: f32,

    /// Measured pulse duration
    pub duration_ms: f32,

    /// Peak accumulated window energy during the marker
    pub peak_energy: f32,

    /// Baseline at emission time
    pub baseline: f32,

    /// Seconds since the previous marker (0 for the first)
    pub since_last_sec: f32,
}

/// Which BCD pipeline produced a pulse
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PulseSource {
    /// Short-frame time-domain detector: precise edges
    Time,

    /// Long-frame frequency-domain detector: confident presence
    Freq,
}

/// A 100 Hz subcarrier pulse
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BcdPulseEvent {
    /// Producing pipeline
    pub source: PulseSource,

    /// Leading edge, ms since detector start
    pub start_ms: f32,

    /// Measured pulse duration
    pub duration_ms: f32,

    /// Peak energy (time) or peak accumulated energy (freq)
    pub peak_energy: f32,

    /// Noise floor (time) or baseline (freq) at emission
    pub baseline: f32,

    /// Peak over floor, in dB
    pub snr_db: f32,
}

/// A reference-tone frequency measurement
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneMeasurement {
    /// Nominal tone frequency (0 for the carrier)
    pub nominal_hz: f32,

    /// Frame timestamp, ms since detector start
    pub timestamp_ms: f32,

    /// Measured frequency after dual-sideband averaging
    pub measured_hz: f32,

    /// `measured − nominal`
    pub offset_hz: f32,

    /// Fractional offset in parts per million (0 for the carrier case)
    pub offset_ppm: f32,

    /// Peak over spectral noise floor, in dB
    pub snr_db: f32,

    /// True when the SNR gate passed
    pub valid: bool,
}

/// A decoded BCD symbol
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// 200 ms pulse: binary 0
    Zero,

    /// 500 ms pulse: binary 1
    One,

    /// 800 ms pulse at a frame-delimiter second
    Marker,

    /// No usable subcarrier energy this second
    #[default]
    None,
}

impl Symbol {
    /// Single-character form used in log records
    pub fn as_char(&self) -> char {
        match self {
            Symbol::Zero => '0',
            Symbol::One => '1',
            Symbol::Marker => 'P',
            Symbol::None => '.',
        }
    }
}

/// Which detectors contributed to a symbol decision
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SymbolSource {
    /// Both pipelines agreed
    Both,

    /// Time-domain pipeline only
    Time,

    /// Frequency-domain pipeline only
    Freq,

    /// Neither fired
    #[default]
    None,
}

impl AsRef<str> for SymbolSource {
    fn as_ref(&self) -> &str {
        match self {
            SymbolSource::Both => "BOTH",
            SymbolSource::Time => "TIME",
            SymbolSource::Freq => "FREQ",
            SymbolSource::None => "NONE",
        }
    }
}

/// One classified second of the BCD frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SymbolEvent {
    /// Decoded symbol
    pub symbol: Symbol,

    /// Second of the minute the window covered
    pub second: u32,

    /// Window-center timestamp, ms since detector start
    pub timestamp_ms: f32,

    /// Estimated pulse duration inside the window
    pub duration_ms: f32,

    /// 1.0 when both pipelines contributed, 0.6 for one, halved when the
    /// event-count/energy quality gate failed
    pub confidence: f32,

    /// Contributing pipelines
    pub source: SymbolSource,
}

/// Synchronization state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum SyncState {
    /// No timing reference yet
    #[default]
    Searching,

    /// First marker seen, building confidence
    Acquiring,

    /// Tracking the current second within the minute
    Locked,

    /// Expected marker missed; trying to reacquire before giving up
    Recovering,
}

/// Evidence bit assignments for [`FrameTime::evidence`]
pub mod evidence {
    /// A tick landed on the predicted second boundary
    pub const TICK: u8 = 1 << 0;
    /// A confirmed minute marker matched the prediction
    pub const MARKER: u8 = 1 << 1;
    /// The BCD windower reported a position marker on time
    pub const P_MARKER: u8 = 1 << 2;
    /// The expected tick hole at :29/:59 was observed
    pub const TICK_HOLE: u8 = 1 << 3;
    /// A tick hole was immediately followed by a matching marker
    pub const HOLE_MARKER: u8 = 1 << 4;
}

/// The engine's current notion of wall-clock phase
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    /// Second within the minute, 0–59
    pub current_second: u32,

    /// Start of that second, ms since detector start
    pub second_start_ms: f32,

    /// Fused confidence in `[0, 1]`
    pub confidence: f32,

    /// Bitmask of [`evidence`] seen during the current second
    pub evidence: u8,

    /// Synchronization state
    pub state: SyncState,
}

/// Where a timing-gate epoch came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EpochSource {
    /// Derived from a long, low-jitter tick chain
    TickChain,

    /// Derived from a confirmed minute marker
    Marker,
}

/// A second-boundary phase estimate
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochEstimate {
    /// Phase of the second boundary, ms modulo 1000
    pub epoch_ms: f32,

    /// Producer of the estimate
    pub source: EpochSource,

    /// Producer's confidence in `[0, 1]`
    pub confidence: f32,
}

/// An advisory spectral observation from the display-path marker check
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SlowMarkerFrame {
    /// Frame timestamp, ms since detector start
    pub timestamp_ms: f32,

    /// 1000 Hz bucket energy
    pub energy: f32,

    /// Energy over baseline, in dB
    pub snr_db: f32,

    /// True when the energy cleared the slow path's own threshold
    pub above_threshold: bool,
}

/// A minute marker that survived fast/slow cross-validation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConfirmedMarker {
    /// Trailing edge, ms since detector start
    pub timestamp_ms: f32,

    /// Estimated leading (on-time) edge
    pub leading_edge_ms: f32,

    /// Measured duration
    pub duration_ms: f32,
}

/// Any event the manager can republish
#[derive(Clone, Debug, PartialEq)]
pub enum WwvEvent {
    /// Second tick accepted
    Tick(TickEvent),

    /// Minute marker classified on the tick channel
    TickMarker(TickMarkerEvent),

    /// Minute marker from the sliding-window detector
    Marker(MarkerEvent),

    /// 100 Hz subcarrier pulse
    BcdPulse(BcdPulseEvent),

    /// Classified BCD symbol
    Symbol(SymbolEvent),

    /// Reference-tone measurement
    Tone(ToneMeasurement),

    /// Sync state or second rollover
    Sync(FrameTime),
}

impl std::fmt::Display for WwvEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WwvEvent::Tick(e) => write!(
                f,
                "tick #{} at {:.1} ms: interval {:.0} ms, corr {:.1}",
                e.tick_number, e.timestamp_ms, e.interval_ms, e.corr_ratio
            ),
            WwvEvent::TickMarker(e) => write!(
                f,
                "minute marker #{} at {:.1} ms: duration {:.0} ms",
                e.marker_number, e.leading_edge_ms, e.duration_ms
            ),
            WwvEvent::Marker(e) => write!(
                f,
                "marker #{} at {:.1} ms: duration {:.0} ms, {:.1} s since last",
                e.marker_number, e.timestamp_ms, e.duration_ms, e.since_last_sec
            ),
            WwvEvent::BcdPulse(e) => write!(
                f,
                "bcd {:?} pulse at {:.1} ms: duration {:.0} ms, {:.1} dB",
                e.source, e.start_ms, e.duration_ms, e.snr_db
            ),
            WwvEvent::Symbol(e) => write!(
                f,
                "second {:02}: '{}' ({:.0} ms, confidence {:.2})",
                e.second,
                e.symbol.as_char(),
                e.duration_ms,
                e.confidence
            ),
            WwvEvent::Tone(e) => write!(
                f,
                "tone {:.0} Hz: measured {:.3} Hz, {:.1} dB{}",
                e.nominal_hz,
                e.measured_hz,
                e.snr_db,
                if e.valid { "" } else { " (invalid)" }
            ),
            WwvEvent::Sync(t) => write!(
                f,
                "sync {}: second {:02}, confidence {:.2}",
                t.state, t.current_second, t.confidence
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_chars() {
        assert_eq!(Symbol::Zero.as_char(), '0');
        assert_eq!(Symbol::One.as_char(), '1');
        assert_eq!(Symbol::Marker.as_char(), 'P');
        assert_eq!(Symbol::None.as_char(), '.');
    }

    #[test]
    fn test_sync_state_names() {
        assert_eq!(SyncState::Searching.to_string(), "SEARCHING");
        assert_eq!(SyncState::Locked.to_string(), "LOCKED");
    }

    #[test]
    fn test_event_display() {
        let evt = WwvEvent::Sync(FrameTime {
            current_second: 7,
            second_start_ms: 7000.0,
            confidence: 0.5,
            evidence: evidence::TICK | evidence::MARKER,
            state: SyncState::Locked,
        });
        assert_eq!(evt.to_string(), "sync LOCKED: second 07, confidence 0.50");
    }

    #[test]
    fn test_evidence_bits_disjoint() {
        let all = [
            evidence::TICK,
            evidence::MARKER,
            evidence::P_MARKER,
            evidence::TICK_HOLE,
            evidence::HOLE_MARKER,
        ];
        let mut seen = 0u8;
        for bit in all {
            assert_eq!(seen & bit, 0);
            seen |= bit;
        }
    }
}
