//! # wwvold: WWV/WWVH Time-Signal Detection
//!
//! This crate detects and decodes the NIST WWV/WWVH broadcast time
//! signal from a complex-baseband (I/Q) sample stream and produces
//! confidence-weighted wall-clock time: which second of the minute it
//! is, where the second boundary lies, and how sure the engine is.
//!
//! ## Disclaimer
//!
//! This crate is dual-licensed MIT and Apache 2.0. Read these licenses
//! carefully as they may affect your rights.
//!
//! This crate is not a certified time source. Do not use it for any
//! safety-critical timing application.
//!
//! ## Example
//!
//! You will first need complex baseband centered on a WWV carrier from a
//! software-defined radio, mixed down and decimated to the detector rate.
//! Obtaining samples is beyond the scope of this crate.
//!
//! ```
//! use wwvold::{DetectorManagerBuilder, WwvEvent};
//!
//! # let some_iq_source = || std::iter::once((0.0f32, 0.0f32));
//! // create a manager with your detector sampling rate
//! let mut manager = DetectorManagerBuilder::new(50_000).build();
//!
//! // let iq be an iterator of (i, q) pairs at the detector rate
//! let iq = some_iq_source();
//! for event in manager.iter_events(iq) {
//!     match event {
//!         WwvEvent::Tick(tick) => {
//!             println!("tick #{} at {:.1} ms", tick.tick_number, tick.timestamp_ms);
//!         }
//!         WwvEvent::Sync(time) => {
//!             println!("second {:02}, confidence {:.2}", time.current_second, time.confidence);
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! ## Background
//!
//! WWV (Fort Collins) and WWVH (Kauai) broadcast a rigid per-second
//! structure: a 5 ms tone tick at the top of every second except :29 and
//! :59, an 800 ms marker at the top of each minute, and a 100 Hz
//! subcarrier carrying a 60-bit pulse-width BCD time code. Recovering
//! time from HF propagation means surviving fading, static, and
//! interference, so the engine runs several independent detectors in
//! parallel and fuses their outputs:
//!
//! 1. A channel filter bank splits the baseband into a sync band
//!    (800–1400 Hz, ticks and markers) and a data band (0–150 Hz, the
//!    BCD subcarrier).
//! 2. Four detectors work the bands: tick (matched filter + FFT energy),
//!    minute marker (sliding-window integration), and two BCD detectors
//!    (short frames for edges, long frames for confidence).
//! 3. Correlators turn detections into structure: tick chains yield a
//!    second-boundary epoch, markers are cross-checked against a slow
//!    spectral path, and BCD pulses are windowed into symbols.
//! 4. A sync state machine fuses everything into a frame-time reference
//!    with explicit SEARCHING/ACQUIRING/LOCKED/RECOVERING states.
//!
//! The [`DetectorManager`] owns the whole cascade; push samples in and
//! read typed [`WwvEvent`]s out. Individual detectors are also exported
//! for callers composing their own pipelines.

#![allow(dead_code)]

mod bcd_freq;
mod bcd_time;
mod builder;
mod channel;
mod comb;
mod events;
mod fft;
mod filter;
mod logsink;
mod manager;
mod marker;
mod marker_corr;
mod slow_marker;
mod station;
mod symbol_window;
mod sync;
mod telemetry;
mod tick;
mod tick_chain;
mod tone;

pub use bcd_freq::BcdFreqDetector;
pub use bcd_time::BcdTimeDetector;
pub use builder::{DetectorManagerBuilder, TunableError};
pub use channel::{ChannelFilterBank, ChannelSample, DataBandFilter, SyncBandFilter};
pub use comb::CombFilter;
pub use events::{
    evidence, BcdPulseEvent, ConfirmedMarker, EpochEstimate, EpochSource, FrameTime, MarkerEvent,
    PulseSource, SlowMarkerFrame, Symbol, SymbolEvent, SymbolSource, SyncState, TickEvent,
    TickMarkerEvent, ToneMeasurement, WwvEvent,
};
pub use fft::{FftError, FftProcessor, WindowKind};
pub use logsink::EventLog;
pub use manager::DetectorManager;
pub use marker::MarkerDetector;
pub use marker_corr::MarkerCorrelator;
pub use slow_marker::SlowMarkerDetector;
pub use station::Station;
pub use symbol_window::{SymbolWindower, WindowerState};
pub use sync::SyncDetector;
pub use telemetry::{TelemetryChannel, TelemetrySink};
pub use tick::{TickDetector, TickOutput};
pub use tick_chain::{ChainStats, TickChainCorrelator};
pub use tone::ToneTracker;
