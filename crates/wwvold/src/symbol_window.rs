//! # BCD symbol windowing
//!
//! Turns raw 100 Hz pulses into one symbol per second. The windower does
//! no timing of its own: it is driven entirely by the sync detector's
//! minute anchor, which the manager passes in *by value* on every call.
//! While sync is not locked there is no anchor and pulses fall on the
//! floor.
//!
//! With an anchor in hand, each second s of the minute owns the window
//! `[anchor + s·1000, anchor + (s+1)·1000)`. Pulses from both BCD
//! pipelines accumulate into the open window; when an event (or the
//! manager's idle clock) moves past the window it is closed, the pulse
//! duration is estimated from whatever accumulated, and the duration
//! classifies the second as 0, 1, or P. Position markers are only legal
//! at seconds 0/9/19/…/59; an 800 ms pulse anywhere else is downgraded to
//! a 1 rather than inventing an impossible frame position.

#[cfg(not(test))]
use log::debug;

#[cfg(test)]
use std::println as debug;

use crate::events::{BcdPulseEvent, PulseSource, Symbol, SymbolEvent, SymbolSource};
use crate::logsink::EventLog;
use crate::station::is_p_marker_second;

const WINDOW_DURATION_MS: f32 = 1000.0;
const WINDOW_TOLERANCE_MS: f32 = 50.0;
const MINUTE_MS: f32 = 60_000.0;

/// Events and energy both required for full-confidence classification
const MIN_EVENTS_FOR_SYMBOL: u32 = 2;
const ENERGY_THRESHOLD_LOW: f32 = 0.001;

/// Duration bounds for classification (ms)
const SYMBOL_NONE_MAX_MS: f32 = 100.0;
const SYMBOL_ZERO_MAX_MS: f32 = 350.0;
const SYMBOL_ONE_MAX_MS: f32 = 650.0;
const SYMBOL_MARKER_MAX_MS: f32 = 900.0;

/// Consecutive ~1 s symbol intervals required for TRACKING
const TRACKING_GOOD_INTERVALS: u32 = 3;

/// Fixed field order of the symbol log stream
const LOG_HEADER: &str =
    "symbol_num,second,symbol,source,duration_ms,confidence,time_events,freq_events,state";

/// Windower acquisition state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum WindowerState {
    /// No symbols decoded yet
    #[default]
    Acquiring,

    /// At least one symbol decoded
    Tentative,

    /// Symbols arriving on a steady one-second cadence
    Tracking,
}

/// Per-source accumulation inside one window
#[derive(Clone, Copy, Debug, Default)]
struct SourceAccum {
    energy_sum: f32,
    duration_sum: f32,
    count: u32,
    first_ms: f32,
    last_ms: f32,
}

impl SourceAccum {
    fn add(&mut self, event: &BcdPulseEvent) {
        if self.count == 0 {
            self.first_ms = event.start_ms;
        }
        self.last_ms = event.start_ms;
        self.energy_sum += event.peak_energy;
        self.duration_sum += event.duration_ms;
        self.count += 1;
    }

    // Span between first and last event if there were several, else the
    // single event's own reported duration
    fn span_ms(&self) -> f32 {
        match self.count {
            0 => 0.0,
            1 => self.duration_sum,
            _ => self.last_ms - self.first_ms,
        }
    }
}

/// Anchor-driven symbol demodulator
#[derive(Debug, Default)]
pub struct SymbolWindower {
    window_open: bool,
    current_second: u32,
    window_start_ms: f32,
    window_anchor_ms: f32,

    time: SourceAccum,
    freq: SourceAccum,

    last_symbol_ms: f32,
    symbol_count: u32,
    good_intervals: u32,
    state: WindowerState,

    log: Option<EventLog>,
}

impl SymbolWindower {
    /// Create in the ACQUIRING state
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a log sink for this windower's records
    pub fn set_log(&mut self, sink: Box<dyn std::io::Write + Send>) {
        self.log = Some(EventLog::new("bcd-symbol", LOG_HEADER, sink));
    }

    /// Accumulate one BCD pulse
    ///
    /// `anchor_ms` is the sync detector's current minute anchor, or
    /// `None` while sync is not locked. Closing the previous window may
    /// emit its symbol.
    pub fn pulse(&mut self, event: &BcdPulseEvent, anchor_ms: Option<f32>) -> Option<SymbolEvent> {
        let out = self.roll_window(event.start_ms, anchor_ms);

        if self.window_open {
            match event.source {
                PulseSource::Time => self.time.add(event),
                PulseSource::Freq => self.freq.add(event),
            }
        }

        out
    }

    /// Close any window the clock has moved past
    ///
    /// The manager calls this periodically so a second with no pulses
    /// still closes on time.
    pub fn advance(&mut self, now_ms: f32, anchor_ms: Option<f32>) -> Option<SymbolEvent> {
        if anchor_ms.is_none() {
            return self.window_open.then(|| self.close_window()).flatten();
        }
        if self.window_open
            && now_ms >= self.window_start_ms + WINDOW_DURATION_MS + WINDOW_TOLERANCE_MS
        {
            return self.close_window();
        }
        None
    }

    // Open/close windows so the one for `timestamp_ms` is current
    fn roll_window(&mut self, timestamp_ms: f32, anchor_ms: Option<f32>) -> Option<SymbolEvent> {
        let Some(anchor) = anchor_ms else {
            // sync dropped: flush anything in progress
            return self.window_open.then(|| self.close_window()).flatten();
        };

        let event_second = second_for(timestamp_ms, anchor);

        if !self.window_open {
            self.open_window(event_second, anchor);
            return None;
        }

        if anchor != self.window_anchor_ms || event_second != self.current_second {
            let out = self.close_window();
            self.open_window(event_second, anchor);
            return out;
        }

        None
    }

    fn open_window(&mut self, second: u32, anchor_ms: f32) {
        self.window_open = true;
        self.current_second = second;
        self.window_start_ms = anchor_ms + second as f32 * WINDOW_DURATION_MS;
        self.window_anchor_ms = anchor_ms;
        self.time = SourceAccum::default();
        self.freq = SourceAccum::default();
    }

    // Close the open window: estimate duration, classify, emit
    fn close_window(&mut self) -> Option<SymbolEvent> {
        if !self.window_open {
            return None;
        }
        self.window_open = false;

        let total_events = self.time.count + self.freq.count;
        let total_energy = self.time.energy_sum + self.freq.energy_sum;

        let (source, mut confidence) = match (self.time.count > 0, self.freq.count > 0) {
            (true, true) => (SymbolSource::Both, 1.0),
            (true, false) => (SymbolSource::Time, 0.6),
            (false, true) => (SymbolSource::Freq, 0.6),
            (false, false) => (SymbolSource::None, 0.0),
        };

        let duration_ms = self.estimate_duration();

        let symbol = if total_events == 0 {
            Symbol::None
        } else {
            if total_events < MIN_EVENTS_FOR_SYMBOL || total_energy <= ENERGY_THRESHOLD_LOW {
                confidence *= 0.5;
            }
            classify_duration(duration_ms, self.current_second)
        };

        let timestamp_ms = self.window_start_ms + WINDOW_DURATION_MS / 2.0;

        if self.last_symbol_ms > 0.0 {
            let interval = timestamp_ms - self.last_symbol_ms;
            if (900.0..=1100.0).contains(&interval) {
                self.good_intervals += 1;
            }
        }
        if self.good_intervals >= TRACKING_GOOD_INTERVALS {
            self.state = WindowerState::Tracking;
        } else if self.symbol_count >= 1 {
            self.state = WindowerState::Tentative;
        }

        self.last_symbol_ms = timestamp_ms;
        self.symbol_count += 1;

        if let Some(log) = self.log.as_mut() {
            log.record(
                timestamp_ms,
                format_args!(
                    "{},{},{},{},{:.0},{:.2},{},{},{}",
                    self.symbol_count,
                    self.current_second,
                    symbol.as_char(),
                    source.as_ref(),
                    duration_ms,
                    confidence,
                    self.time.count,
                    self.freq.count,
                    self.state
                ),
            );
        }

        if symbol == Symbol::None {
            return None;
        }

        debug!(
            "bcd-symbol: second {:02} '{}' duration {:.0} ms confidence {:.2} ({})",
            self.current_second,
            symbol.as_char(),
            duration_ms,
            confidence,
            source.as_ref()
        );

        Some(SymbolEvent {
            symbol,
            second: self.current_second,
            timestamp_ms,
            duration_ms,
            confidence,
            source,
        })
    }

    // Combine per-source spans: average when both contributed
    fn estimate_duration(&self) -> f32 {
        let time_span = self.time.span_ms();
        let freq_span = self.freq.span_ms();

        if time_span > 0.0 && freq_span > 0.0 {
            (time_span + freq_span) / 2.0
        } else if time_span > 0.0 {
            time_span
        } else if freq_span > 0.0 {
            freq_span
        } else {
            // fall back to the mean of reported durations
            let mut sum = 0.0;
            let mut count = 0u32;
            if self.time.count > 0 {
                sum += self.time.duration_sum / self.time.count as f32;
                count += 1;
            }
            if self.freq.count > 0 {
                sum += self.freq.duration_sum / self.freq.count as f32;
                count += 1;
            }
            if count > 0 {
                sum / count as f32
            } else {
                0.0
            }
        }
    }

    /// Acquisition state
    pub fn state(&self) -> WindowerState {
        self.state
    }

    /// Windows closed so far
    pub fn symbol_count(&self) -> u32 {
        self.symbol_count
    }

    /// Center timestamp of the last closed window
    pub fn last_symbol_ms(&self) -> f32 {
        self.last_symbol_ms
    }
}

// Which second of the minute a timestamp falls in, relative to the anchor
fn second_for(timestamp_ms: f32, anchor_ms: f32) -> u32 {
    let offset = (timestamp_ms - anchor_ms).rem_euclid(MINUTE_MS);
    ((offset / WINDOW_DURATION_MS) as u32).min(59)
}

// Duration to symbol, with P-markers gated to their legal positions
fn classify_duration(duration_ms: f32, second: u32) -> Symbol {
    if duration_ms < SYMBOL_NONE_MAX_MS {
        Symbol::None
    } else if duration_ms <= SYMBOL_ZERO_MAX_MS {
        Symbol::Zero
    } else if duration_ms <= SYMBOL_ONE_MAX_MS {
        Symbol::One
    } else if duration_ms <= SYMBOL_MARKER_MAX_MS {
        if is_p_marker_second(second) {
            Symbol::Marker
        } else {
            Symbol::One
        }
    } else if is_p_marker_second(second) {
        Symbol::Marker
    } else {
        Symbol::One
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time_pulse(start_ms: f32, duration_ms: f32) -> BcdPulseEvent {
        BcdPulseEvent {
            source: PulseSource::Time,
            start_ms,
            duration_ms,
            peak_energy: 0.5,
            baseline: 0.001,
            snr_db: 20.0,
        }
    }

    fn freq_pulse(start_ms: f32, duration_ms: f32) -> BcdPulseEvent {
        BcdPulseEvent {
            source: PulseSource::Freq,
            ..time_pulse(start_ms, duration_ms)
        }
    }

    // Scenario from the reference broadcast: pulses at seconds 1, 2, 9
    #[test]
    fn test_windowing_with_locked_anchor() {
        let mut win = SymbolWindower::new();
        let anchor = Some(0.0);

        let mut symbols = Vec::new();
        let mut push = |win: &mut SymbolWindower, evt| {
            if let Some(s) = win.pulse(&evt, anchor) {
                symbols.push(s);
            }
        };

        // both sources agree each second
        push(&mut win, time_pulse(1050.0, 200.0));
        push(&mut win, freq_pulse(1060.0, 210.0));
        push(&mut win, time_pulse(2050.0, 500.0));
        push(&mut win, freq_pulse(2060.0, 510.0));
        push(&mut win, time_pulse(9050.0, 800.0));
        push(&mut win, freq_pulse(9060.0, 810.0));
        if let Some(s) = win.advance(10_100.0, anchor) {
            symbols.push(s);
        }

        assert_eq!(symbols.len(), 3, "symbols: {:?}", symbols);
        assert_eq!(symbols[0].symbol, Symbol::Zero);
        assert_eq!(symbols[0].second, 1);
        assert_eq!(symbols[1].symbol, Symbol::One);
        assert_eq!(symbols[1].second, 2);
        assert_eq!(symbols[2].symbol, Symbol::Marker);
        assert_eq!(symbols[2].second, 9);
    }

    #[test]
    fn test_p_marker_position_gating() {
        // a 750 ms pulse at second 5 downgrades to ONE; at second 9 it
        // is a position marker
        assert_eq!(classify_duration(750.0, 5), Symbol::One);
        assert_eq!(classify_duration(750.0, 9), Symbol::Marker);

        // beyond 900 ms the same gate applies
        assert_eq!(classify_duration(950.0, 5), Symbol::One);
        assert_eq!(classify_duration(950.0, 19), Symbol::Marker);
    }

    #[test]
    fn test_classification_bounds() {
        assert_eq!(classify_duration(50.0, 1), Symbol::None);
        assert_eq!(classify_duration(100.0, 1), Symbol::Zero);
        assert_eq!(classify_duration(350.0, 1), Symbol::Zero);
        assert_eq!(classify_duration(351.0, 1), Symbol::One);
        assert_eq!(classify_duration(650.0, 1), Symbol::One);
        assert_eq!(classify_duration(651.0, 0), Symbol::Marker);
        assert_eq!(classify_duration(900.0, 59), Symbol::Marker);
    }

    #[test]
    fn test_no_anchor_means_no_symbols() {
        let mut win = SymbolWindower::new();
        assert!(win.pulse(&time_pulse(1050.0, 200.0), None).is_none());
        assert!(win.advance(5000.0, None).is_none());
        assert_eq!(win.symbol_count(), 0);
    }

    #[test]
    fn test_single_source_confidence() {
        let mut win = SymbolWindower::new();
        let anchor = Some(0.0);

        // two time-pipeline events, no freq: confidence 0.6
        win.pulse(&time_pulse(1050.0, 200.0), anchor);
        win.pulse(&time_pulse(1240.0, 20.0), anchor);
        let sym = win.advance(2100.0, anchor).expect("symbol");
        assert_eq!(sym.source, SymbolSource::Time);
        assert!((sym.confidence - 0.6).abs() < 1.0e-6);
        // span between the two events: 1240 − 1050
        assert!((sym.duration_ms - 190.0).abs() < 1.0);
    }

    #[test]
    fn test_quality_gate_halves_confidence() {
        let mut win = SymbolWindower::new();
        let anchor = Some(0.0);

        // a single event fails the ≥2-events gate
        win.pulse(&time_pulse(1050.0, 200.0), anchor);
        let sym = win.advance(2100.0, anchor).expect("symbol");
        assert!((sym.confidence - 0.3).abs() < 1.0e-6);
    }

    #[test]
    fn test_idle_close_waits_for_tolerance() {
        let mut win = SymbolWindower::new();
        let anchor = Some(0.0);

        win.pulse(&time_pulse(1050.0, 200.0), anchor);
        // just inside the tolerance: window stays open
        assert!(win.advance(2040.0, anchor).is_none());
        // past it: the window closes and classifies
        let sym = win.advance(2060.0, anchor).expect("symbol");
        assert_eq!(sym.second, 1);
    }

    #[test]
    fn test_state_progression() {
        let mut win = SymbolWindower::new();
        let anchor = Some(0.0);
        assert_eq!(win.state(), WindowerState::Acquiring);

        for sec in 1..6u32 {
            win.pulse(&time_pulse(sec as f32 * 1000.0 + 50.0, 200.0), anchor);
            win.pulse(&time_pulse(sec as f32 * 1000.0 + 240.0, 20.0), anchor);
        }
        win.advance(6300.0, anchor);

        assert_eq!(win.state(), WindowerState::Tracking);
        assert_eq!(win.symbol_count(), 5);
    }

    #[test]
    fn test_sync_drop_flushes_window() {
        let mut win = SymbolWindower::new();

        win.pulse(&time_pulse(1050.0, 200.0), Some(0.0));
        win.pulse(&time_pulse(1260.0, 20.0), Some(0.0));
        // anchor lost: the open window flushes on the next advance
        let sym = win.advance(1500.0, None).expect("flush");
        assert_eq!(sym.second, 1);
        assert_eq!(sym.symbol, Symbol::Zero);
    }
}
