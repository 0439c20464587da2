//! # Detector orchestration
//!
//! The [`DetectorManager`] owns every component and wires the event flow
//! between them:
//!
//! ```txt
//! detector samples ──► channel bank ──► sync band ──► tick detector ──► tick chain ──► epoch ─┐
//!                          │                 │                                                │
//!                          │                 └──────► marker detector ──► marker corr ──► sync detector
//!                          └──────► data band ──► bcd time ─┐                                 │
//!                                        │                  ├──► symbol windower ◄── anchor ──┘
//!                                        └──► bcd freq ─────┘
//!
//! display samples ──► tone trackers (carrier / 500 / 600)
//!                └──► slow marker ──► marker corr (advisory)
//! ```
//!
//! The two sample paths share no filter, buffer, or counter; each
//! detector owns its own DSP state and the manager only moves *events*
//! between them. Everything a detector emits is also republished to the
//! caller through one drained [`WwvEvent`] queue, and optionally mirrored
//! onto a telemetry sink.

use std::collections::VecDeque;

#[cfg(not(test))]
use log::info;

#[cfg(test)]
use std::println as info;

use crate::bcd_freq::BcdFreqDetector;
use crate::bcd_time::BcdTimeDetector;
use crate::builder::DetectorManagerBuilder;
use crate::channel::ChannelFilterBank;
use crate::events::{
    BcdPulseEvent, ConfirmedMarker, EpochSource, PulseSource, Symbol, SymbolEvent, SyncState,
    WwvEvent,
};
use crate::marker::MarkerDetector;
use crate::marker_corr::MarkerCorrelator;
use crate::slow_marker::SlowMarkerDetector;
use crate::symbol_window::SymbolWindower;
use crate::sync::SyncDetector;
use crate::telemetry::{TelemetryChannel, TelemetrySink};
use crate::tick::{TickDetector, TickOutput};
use crate::tick_chain::TickChainCorrelator;
use crate::tone::ToneTracker;

/// Confidence attached to marker-derived epochs
const MARKER_EPOCH_CONFIDENCE: f32 = 0.7;

/// Samples between housekeeping passes (one tick FFT frame)
const HOUSEKEEPING_INTERVAL: u64 = 256;

/// Owns and routes the full detection cascade
pub struct DetectorManager {
    channel: ChannelFilterBank,

    tick: Option<TickDetector>,
    marker: Option<MarkerDetector>,
    bcd_time: Option<BcdTimeDetector>,
    bcd_freq: Option<BcdFreqDetector>,

    tick_chain: Option<TickChainCorrelator>,
    marker_corr: Option<MarkerCorrelator>,
    windower: Option<SymbolWindower>,
    sync: Option<SyncDetector>,

    tone_carrier: Option<ToneTracker>,
    tone_500: Option<ToneTracker>,
    tone_600: Option<ToneTracker>,
    slow_marker: Option<SlowMarkerDetector>,

    detector_rate: u32,
    display_rate: u32,
    group_delay_ms: f32,
    detector_samples: u64,
    display_samples: u64,

    event_queue: VecDeque<WwvEvent>,
    telemetry: Option<TelemetrySink>,

    last_sync_state: SyncState,
    last_sync_second: u32,
}

impl std::fmt::Debug for DetectorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorManager")
            .field("detector_rate", &self.detector_rate)
            .field("display_rate", &self.display_rate)
            .field("detector_samples", &self.detector_samples)
            .field("display_samples", &self.display_samples)
            .field("queued_events", &self.event_queue.len())
            .finish()
    }
}

impl From<&DetectorManagerBuilder> for DetectorManager {
    fn from(cfg: &DetectorManagerBuilder) -> Self {
        let detector_rate = cfg.detector_rate() as f32;
        let display_rate = cfg.display_rate() as f32;
        let station = cfg.station();

        let tick = cfg.tick_detector_enabled().then(|| {
            let mut det = TickDetector::new(detector_rate, station);
            det.set_group_delay_ms(cfg.group_delay_ms());
            det.set_comb_enabled(cfg.tick_comb(), detector_rate);
            det
        });
        let marker = cfg
            .marker_detector_enabled()
            .then(|| MarkerDetector::new(detector_rate, station));
        let bcd_time = cfg
            .bcd_detectors_enabled()
            .then(|| BcdTimeDetector::new(detector_rate));
        let bcd_freq = cfg
            .bcd_detectors_enabled()
            .then(|| BcdFreqDetector::new(detector_rate));

        let tick_chain = cfg
            .correlators_enabled()
            .then(|| TickChainCorrelator::new(cfg.group_delay_ms()));
        let marker_corr = cfg.correlators_enabled().then(MarkerCorrelator::new);
        let windower = cfg.correlators_enabled().then(SymbolWindower::new);
        let sync = cfg.sync_detector_enabled().then(SyncDetector::new);

        let tone_carrier = cfg
            .tone_trackers_enabled()
            .then(|| ToneTracker::new(0.0, display_rate));
        let tone_500 = cfg
            .tone_trackers_enabled()
            .then(|| ToneTracker::new(500.0, display_rate));
        let tone_600 = cfg
            .tone_trackers_enabled()
            .then(|| ToneTracker::new(600.0, display_rate));
        let slow_marker = cfg
            .slow_marker_enabled()
            .then(|| SlowMarkerDetector::new(display_rate, station));

        info!(
            "manager: detector path {} Hz, display path {} Hz, station {}",
            cfg.detector_rate(),
            cfg.display_rate(),
            station.as_ref()
        );

        Self {
            channel: ChannelFilterBank::new(detector_rate),
            tick,
            marker,
            bcd_time,
            bcd_freq,
            tick_chain,
            marker_corr,
            windower,
            sync,
            tone_carrier,
            tone_500,
            tone_600,
            slow_marker,
            detector_rate: cfg.detector_rate(),
            display_rate: cfg.display_rate(),
            group_delay_ms: cfg.group_delay_ms(),
            detector_samples: 0,
            display_samples: 0,
            event_queue: VecDeque::with_capacity(8),
            telemetry: None,
            last_sync_state: SyncState::Searching,
            last_sync_second: 0,
        }
    }
}

impl DetectorManager {
    /// Feed one detector-path I/Q sample
    pub fn push_detector_sample(&mut self, i: f32, q: f32) {
        let filtered = self.channel.process(i, q);
        let (si, sq) = filtered.sync;
        let (di, dq) = filtered.data;

        self.detector_samples += 1;
        let now_ms = self.detector_samples as f32 * 1000.0 / self.detector_rate as f32;

        if let Some(out) = self.tick.as_mut().and_then(|t| t.process(si, sq)) {
            self.route_tick_output(out);
        }

        if let Some(evt) = self.marker.as_mut().and_then(|m| m.process(si, sq)) {
            let confirmed = match self.marker_corr.as_mut() {
                Some(corr) => corr.fast_event(&evt),
                None => Some(ConfirmedMarker {
                    timestamp_ms: evt.timestamp_ms,
                    leading_edge_ms: evt.timestamp_ms - evt.duration_ms,
                    duration_ms: evt.duration_ms,
                }),
            };
            if let Some(cm) = confirmed {
                if let Some(sync) = self.sync.as_mut() {
                    sync.on_marker(cm.leading_edge_ms, cm.duration_ms);
                }
                self.install_epoch(
                    cm.leading_edge_ms,
                    EpochSource::Marker,
                    MARKER_EPOCH_CONFIDENCE,
                );
            }
            self.push_event(WwvEvent::Marker(evt));
        }

        if let Some(evt) = self.bcd_time.as_mut().and_then(|d| d.process(di, dq)) {
            self.route_bcd_pulse(evt);
        }
        if let Some(evt) = self.bcd_freq.as_mut().and_then(|d| d.process(di, dq)) {
            self.route_bcd_pulse(evt);
        }

        if self.detector_samples % HOUSEKEEPING_INTERVAL == 0 {
            self.housekeep(now_ms);
        }
    }

    /// Feed one display-path I/Q sample
    pub fn push_display_sample(&mut self, i: f32, q: f32) {
        self.display_samples += 1;

        let carrier = self
            .tone_carrier
            .as_mut()
            .map(|t| (t.process(i, q), t.noise_floor()));
        if let Some((Some(m), noise_floor)) = carrier {
            // the carrier tracker's spectral floor doubles as the
            // advisory subcarrier noise estimate
            if m.valid {
                if let Some(marker) = self.marker.as_mut() {
                    marker.note_subcarrier_noise(noise_floor);
                }
            }
            self.push_event(WwvEvent::Tone(m));
        }
        if let Some(m) = self.tone_500.as_mut().and_then(|t| t.process(i, q)) {
            self.push_event(WwvEvent::Tone(m));
        }
        if let Some(m) = self.tone_600.as_mut().and_then(|t| t.process(i, q)) {
            self.push_event(WwvEvent::Tone(m));
        }

        if let Some(frame) = self.slow_marker.as_mut().and_then(|s| s.process(i, q)) {
            if let Some(corr) = self.marker_corr.as_mut() {
                corr.slow_frame(frame);
            }
        }
    }

    fn route_tick_output(&mut self, out: TickOutput) {
        match out {
            TickOutput::Tick(evt) => {
                let epoch = self.tick_chain.as_mut().and_then(|c| c.record(&evt));
                if let Some(e) = epoch {
                    self.install_epoch(e.epoch_ms, e.source, e.confidence);
                }
                if let Some(sync) = self.sync.as_mut() {
                    let lead = evt.timestamp_ms - evt.duration_ms - self.group_delay_ms;
                    sync.on_tick(lead);
                }
                self.push_event(WwvEvent::Tick(evt));
            }
            TickOutput::Marker(evt) => {
                if let Some(sync) = self.sync.as_mut() {
                    sync.on_marker(evt.leading_edge_ms, evt.duration_ms);
                }
                self.push_event(WwvEvent::TickMarker(evt));
            }
        }
    }

    fn route_bcd_pulse(&mut self, evt: BcdPulseEvent) {
        let anchor = self.sync.as_ref().and_then(|s| s.locked_anchor_ms());
        let symbol = self.windower.as_mut().and_then(|w| w.pulse(&evt, anchor));
        self.push_event(WwvEvent::BcdPulse(evt));
        if let Some(sym) = symbol {
            self.route_symbol(sym);
        }
    }

    fn route_symbol(&mut self, sym: SymbolEvent) {
        if sym.symbol == Symbol::Marker {
            if let Some(sync) = self.sync.as_mut() {
                sync.on_p_marker(sym.timestamp_ms, sym.second);
            }
        }
        self.push_event(WwvEvent::Symbol(sym));
    }

    fn install_epoch(&mut self, epoch_ms: f32, source: EpochSource, confidence: f32) {
        if let Some(tick) = self.tick.as_mut() {
            tick.set_epoch(epoch_ms, source, confidence);
            if !tick.gating_enabled() {
                tick.set_gating_enabled(true);
            }
        }
    }

    // Idle work that must not wait for the next event: closing symbol
    // windows, advancing the sync schedule, reporting frame-time changes
    fn housekeep(&mut self, now_ms: f32) {
        let anchor = self.sync.as_ref().and_then(|s| s.locked_anchor_ms());
        if let Some(sym) = self.windower.as_mut().and_then(|w| w.advance(now_ms, anchor)) {
            self.route_symbol(sym);
        }

        if let Some(sync) = self.sync.as_mut() {
            sync.advance(now_ms);
            let frame_time = sync.frame_time();
            if frame_time.state != self.last_sync_state
                || frame_time.current_second != self.last_sync_second
            {
                self.last_sync_state = frame_time.state;
                self.last_sync_second = frame_time.current_second;
                self.push_event(WwvEvent::Sync(frame_time));
            }
        }
    }

    fn push_event(&mut self, event: WwvEvent) {
        if let Some(sink) = self.telemetry.as_mut() {
            let (channel, line) = telemetry_line(&event);
            sink(channel, &line);
        }
        self.event_queue.push_back(event);
    }

    /// Drain every queued event
    pub fn events(&mut self) -> impl Iterator<Item = WwvEvent> + '_ {
        self.event_queue.drain(..)
    }

    /// Decode events from an iterator of detector-path samples
    ///
    /// Consumes as many samples as needed to produce each next event and
    /// ends when the input is exhausted and the queue is empty.
    #[must_use = "iterators are lazy and do nothing unless consumed"]
    pub fn iter_events<'mgr, I>(&'mgr mut self, input: I) -> impl Iterator<Item = WwvEvent> + 'mgr
    where
        I: IntoIterator<Item = (f32, f32)>,
        I::IntoIter: 'mgr,
    {
        ManagerIter {
            manager: self,
            source: input.into_iter(),
        }
    }

    /// Attach a telemetry sink
    pub fn set_telemetry(&mut self, sink: TelemetrySink) {
        self.telemetry = Some(sink);
    }

    /// Detector-path sampling rate (Hz)
    pub fn detector_rate(&self) -> u32 {
        self.detector_rate
    }

    /// Display-path sampling rate (Hz)
    pub fn display_rate(&self) -> u32 {
        self.display_rate
    }

    /// Lifetime detector-path sample count
    pub fn detector_sample_count(&self) -> u64 {
        self.detector_samples
    }

    /// Lifetime display-path sample count
    pub fn display_sample_count(&self) -> u64 {
        self.display_samples
    }

    /// The tick detector, if enabled
    pub fn tick_detector(&self) -> Option<&TickDetector> {
        self.tick.as_ref()
    }

    /// The tick detector for configuration, if enabled
    pub fn tick_detector_mut(&mut self) -> Option<&mut TickDetector> {
        self.tick.as_mut()
    }

    /// The minute-marker detector, if enabled
    pub fn marker_detector(&self) -> Option<&MarkerDetector> {
        self.marker.as_ref()
    }

    /// The minute-marker detector for configuration, if enabled
    pub fn marker_detector_mut(&mut self) -> Option<&mut MarkerDetector> {
        self.marker.as_mut()
    }

    /// The BCD time-domain detector, if enabled
    pub fn bcd_time_detector_mut(&mut self) -> Option<&mut BcdTimeDetector> {
        self.bcd_time.as_mut()
    }

    /// The BCD frequency-domain detector, if enabled
    pub fn bcd_freq_detector_mut(&mut self) -> Option<&mut BcdFreqDetector> {
        self.bcd_freq.as_mut()
    }

    /// The tick-chain correlator, if enabled
    pub fn tick_chain(&self) -> Option<&TickChainCorrelator> {
        self.tick_chain.as_ref()
    }

    /// The tick-chain correlator for configuration, if enabled
    pub fn tick_chain_mut(&mut self) -> Option<&mut TickChainCorrelator> {
        self.tick_chain.as_mut()
    }

    /// The sync detector, if enabled
    pub fn sync_detector(&self) -> Option<&SyncDetector> {
        self.sync.as_ref()
    }

    /// The sync detector for log attachment, if enabled
    pub fn sync_detector_mut(&mut self) -> Option<&mut SyncDetector> {
        self.sync.as_mut()
    }

    /// The symbol windower for log attachment, if enabled
    pub fn symbol_windower_mut(&mut self) -> Option<&mut SymbolWindower> {
        self.windower.as_mut()
    }

    /// Summarize every component's counters through the log facade
    pub fn log_stats(&self) {
        info!(
            "manager stats: {} detector samples, {} display samples",
            self.detector_samples, self.display_samples
        );
        if let Some(tick) = self.tick.as_ref() {
            tick.log_stats();
        }
        if let Some(marker) = self.marker.as_ref() {
            marker.log_stats();
        }
        if let Some(sync) = self.sync.as_ref() {
            info!(
                "sync stats: {} second {:02}, confidence {:.2}",
                sync.state(),
                sync.current_second(),
                sync.confidence()
            );
        }
    }
}

// One formatted record per event for the telemetry transport
fn telemetry_line(event: &WwvEvent) -> (TelemetryChannel, String) {
    match event {
        WwvEvent::Tick(e) => (
            TelemetryChannel::Ticks,
            format!(
                "{},{:.1},{:.0},{:.0},{:.1},{:.6},{:.6},{:.2},{:.1}",
                e.tick_number,
                e.timestamp_ms,
                e.interval_ms,
                e.avg_interval_ms,
                e.duration_ms,
                e.peak_energy,
                e.noise_floor,
                e.corr_peak,
                e.corr_ratio
            ),
        ),
        WwvEvent::TickMarker(e) => (
            TelemetryChannel::Ticks,
            format!(
                "M{},{:.1},{:.1},{:.1},{:.0},{:.1}",
                e.marker_number,
                e.timestamp_ms,
                e.leading_edge_ms,
                e.duration_ms,
                e.interval_ms,
                e.corr_ratio
            ),
        ),
        WwvEvent::Marker(e) => (
            TelemetryChannel::Markers,
            format!(
                "M{},{:.1},{:.1},{:.6},{:.6},{:.1}",
                e.marker_number,
                e.timestamp_ms,
                e.duration_ms,
                e.peak_energy,
                e.baseline,
                e.since_last_sec
            ),
        ),
        WwvEvent::BcdPulse(e) => (
            TelemetryChannel::Bcds,
            format!(
                "{},{:.1},{:.0},{:.6},{:.6},{:.1}",
                match e.source {
                    PulseSource::Time => "TIME",
                    PulseSource::Freq => "FREQ",
                },
                e.start_ms,
                e.duration_ms,
                e.peak_energy,
                e.baseline,
                e.snr_db
            ),
        ),
        WwvEvent::Symbol(e) => (
            TelemetryChannel::Bcds,
            format!(
                "SYM,{},{},{:.0},{:.2}",
                e.symbol.as_char(),
                e.second,
                e.duration_ms,
                e.confidence
            ),
        ),
        WwvEvent::Tone(e) => {
            let channel = if e.nominal_hz < 1.0 {
                TelemetryChannel::Carrier
            } else if e.nominal_hz < 550.0 {
                TelemetryChannel::Tone500
            } else {
                TelemetryChannel::Tone600
            };
            (
                channel,
                format!(
                    "{:.1},{:.3},{:.3},{:.2},{:.1},{}",
                    e.timestamp_ms,
                    e.measured_hz,
                    e.offset_hz,
                    e.offset_ppm,
                    e.snr_db,
                    if e.valid { "YES" } else { "NO" }
                ),
            )
        }
        WwvEvent::Sync(t) => (
            TelemetryChannel::Sync,
            format!(
                "{},{},{:.1},{:.3},{:#04x}",
                t.state, t.current_second, t.second_start_ms, t.confidence, t.evidence
            ),
        ),
    }
}

struct ManagerIter<'mgr, I>
where
    I: Iterator<Item = (f32, f32)>,
{
    manager: &'mgr mut DetectorManager,
    source: I,
}

impl<'mgr, I> Iterator for ManagerIter<'mgr, I>
where
    I: Iterator<Item = (f32, f32)>,
{
    type Item = WwvEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(evt) = self.manager.event_queue.pop_front() {
                return Some(evt);
            }
            let (i, q) = self.source.next()?;
            self.manager.push_detector_sample(i, q);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use crate::builder::DetectorManagerBuilder;
    use crate::station;

    const RATE: f32 = 50_000.0;

    fn tick_only_manager() -> DetectorManager {
        DetectorManagerBuilder::new(50_000)
            .with_bcd_detectors(false)
            .with_tone_trackers(false)
            .with_slow_marker(false)
            .build()
    }

    #[test]
    fn test_tick_train_end_to_end() {
        let mut mgr = tick_only_manager();

        let train = station::pulse_train(1000.0, 1.0, RATE, 5.0, 17, &[]);
        for sa in &train {
            mgr.push_detector_sample(sa.re, sa.im);
        }

        let events: Vec<WwvEvent> = mgr.events().collect();
        let ticks: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                WwvEvent::Tick(t) => Some(t),
                _ => None,
            })
            .collect();

        assert!(ticks.len() >= 14, "only {} ticks", ticks.len());

        // timestamps strictly monotonic
        for pair in ticks.windows(2) {
            assert!(pair[1].timestamp_ms > pair[0].timestamp_ms);
        }

        // the chain correlator must have installed a timing epoch
        let tick_det = mgr.tick_detector().unwrap();
        assert_eq!(tick_det.epoch_source(), Some(EpochSource::TickChain));
        assert!(tick_det.gating_enabled());
        assert!(tick_det.epoch_confidence() >= 0.5);

        let chain = mgr.tick_chain().unwrap();
        assert!(chain.longest_chain() >= 14);
    }

    #[test]
    fn test_telemetry_mirroring() {
        let mut mgr = tick_only_manager();

        let lines: Arc<Mutex<Vec<(TelemetryChannel, String)>>> = Arc::default();
        let sink_lines = Arc::clone(&lines);
        mgr.set_telemetry(Box::new(move |chan, line| {
            sink_lines.lock().unwrap().push((chan, line.to_string()));
        }));

        let train = station::pulse_train(1000.0, 1.0, RATE, 5.0, 4, &[]);
        for sa in &train {
            mgr.push_detector_sample(sa.re, sa.im);
        }

        let lines = lines.lock().unwrap();
        assert!(
            lines.iter().any(|(c, _)| *c == TelemetryChannel::Ticks),
            "lines: {:?}",
            *lines
        );
    }

    #[test]
    fn test_iter_events() {
        let mut mgr = tick_only_manager();

        let train = station::pulse_train(1000.0, 1.0, RATE, 5.0, 4, &[]);
        let samples = train.iter().map(|sa| (sa.re, sa.im));

        let ticks = mgr
            .iter_events(samples)
            .filter(|e| matches!(e, WwvEvent::Tick(_)))
            .count();
        assert!(ticks >= 2, "{} ticks", ticks);
    }

    #[test]
    fn test_display_path_tones() {
        let mut mgr = DetectorManagerBuilder::new(50_000).build();

        // real 500 Hz line at the display rate
        for n in 0..(2 * 4096 + 100) {
            let t = n as f32 / 12_000.0;
            let i = 0.5 * (2.0 * std::f32::consts::PI * 500.0 * t).sin();
            mgr.push_display_sample(i, 0.0);
        }

        let tones: Vec<_> = mgr
            .events()
            .filter_map(|e| match e {
                WwvEvent::Tone(m) => Some(m),
                _ => None,
            })
            .collect();

        let t500 = tones
            .iter()
            .find(|m| m.nominal_hz == 500.0 && m.valid)
            .expect("valid 500 Hz measurement");
        assert!((t500.measured_hz - 500.0).abs() < 0.1);

        // display samples are counted on their own path
        assert_eq!(mgr.detector_sample_count(), 0);
        assert!(mgr.display_sample_count() > 8000);
    }

    #[test]
    fn test_disabled_components_stay_silent() {
        let mut mgr = DetectorManagerBuilder::new(50_000)
            .with_tick_detector(false)
            .with_marker_detector(false)
            .with_bcd_detectors(false)
            .with_tone_trackers(false)
            .with_slow_marker(false)
            .build();

        let train = station::pulse_train(1000.0, 1.0, RATE, 5.0, 3, &[]);
        for sa in &train {
            mgr.push_detector_sample(sa.re, sa.im);
        }
        assert_eq!(mgr.events().count(), 0);
        assert!(mgr.tick_detector().is_none());
    }
}
