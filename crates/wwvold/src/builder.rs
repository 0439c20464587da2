//! Detector manager configuration

use thiserror::Error;

use crate::manager::DetectorManager;
use crate::station::Station;

/// A runtime tunable was set outside its permitted range
///
/// The rejected value is reported and the detector keeps its previous
/// setting.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
#[error("{name} = {value} is outside the permitted range {min}..={max}")]
pub struct TunableError {
    /// Name of the rejected tunable
    pub name: &'static str,
    /// Offered value
    pub value: f32,
    /// Lower bound, inclusive
    pub min: f32,
    /// Upper bound, inclusive
    pub max: f32,
}

/// Validate a tunable against its inclusive range
pub(crate) fn check_range(
    name: &'static str,
    value: f32,
    min: f32,
    max: f32,
) -> Result<f32, TunableError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(TunableError {
            name,
            value,
            min,
            max,
        })
    }
}

/// Builds a [`DetectorManager`]
///
/// The defaults reproduce the reference deployment: a 50 kHz detector
/// path, a 12 kHz display path, WWV tick frequency, every component
/// enabled. All you really need to provide is the detector sampling rate.
///
/// The builder API is part of this crate's public interface; the default
/// values are not, and may be revised in any minor release. If you care
/// strongly about a setting, configure it here.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorManagerBuilder {
    detector_rate: u32,
    display_rate: u32,
    station: Station,
    group_delay_ms: f32,
    tick_comb: bool,
    enable_tick_detector: bool,
    enable_marker_detector: bool,
    enable_bcd_detectors: bool,
    enable_tone_trackers: bool,
    enable_slow_marker: bool,
    enable_correlators: bool,
    enable_sync_detector: bool,
}

impl DetectorManagerBuilder {
    /// New builder for the given detector-path sampling rate
    pub fn new(detector_rate: u32) -> Self {
        Self {
            detector_rate: detector_rate.max(1000),
            display_rate: 12_000,
            station: Station::Wwv,
            group_delay_ms: 3.0,
            tick_comb: false,
            enable_tick_detector: true,
            enable_marker_detector: true,
            enable_bcd_detectors: true,
            enable_tone_trackers: true,
            enable_slow_marker: true,
            enable_correlators: true,
            enable_sync_detector: true,
        }
    }

    /// Build a manager
    ///
    /// Once built, the manager is immediately ready to accept samples.
    pub fn build(&self) -> DetectorManager {
        DetectorManager::from(self)
    }

    /// Display-path sampling rate (Hz); default 12 kHz
    pub fn with_display_rate(&mut self, rate: u32) -> &mut Self {
        self.display_rate = rate.max(1000);
        self
    }

    /// Station whose tick frequency to detect; default WWV
    pub fn with_station(&mut self, station: Station) -> &mut Self {
        self.station = station;
        self
    }

    /// Channel-filter group delay used when deriving leading edges (ms)
    ///
    /// Station- and rate-dependent; clamped to `[0, 20]` ms. Default 3 ms.
    pub fn with_group_delay_ms(&mut self, delay_ms: f32) -> &mut Self {
        self.group_delay_ms = delay_ms.clamp(0.0, 20.0);
        self
    }

    /// Enable the comb enhancer on the tick energy pipeline
    ///
    /// Off by default. The comb trades a slower energy envelope for
    /// improved periodic-pulse contrast on very weak signals.
    pub fn with_tick_comb(&mut self, enabled: bool) -> &mut Self {
        self.tick_comb = enabled;
        self
    }

    /// Enable or disable the tick detector
    pub fn with_tick_detector(&mut self, enabled: bool) -> &mut Self {
        self.enable_tick_detector = enabled;
        self
    }

    /// Enable or disable the minute-marker detector
    pub fn with_marker_detector(&mut self, enabled: bool) -> &mut Self {
        self.enable_marker_detector = enabled;
        self
    }

    /// Enable or disable both BCD subcarrier detectors
    pub fn with_bcd_detectors(&mut self, enabled: bool) -> &mut Self {
        self.enable_bcd_detectors = enabled;
        self
    }

    /// Enable or disable the display-path tone trackers
    pub fn with_tone_trackers(&mut self, enabled: bool) -> &mut Self {
        self.enable_tone_trackers = enabled;
        self
    }

    /// Enable or disable the display-path slow marker check
    pub fn with_slow_marker(&mut self, enabled: bool) -> &mut Self {
        self.enable_slow_marker = enabled;
        self
    }

    /// Enable or disable the tick-chain and marker correlators and the
    /// BCD symbol windower
    pub fn with_correlators(&mut self, enabled: bool) -> &mut Self {
        self.enable_correlators = enabled;
        self
    }

    /// Enable or disable the sync detector
    pub fn with_sync_detector(&mut self, enabled: bool) -> &mut Self {
        self.enable_sync_detector = enabled;
        self
    }

    /// Detector-path sampling rate (Hz)
    pub fn detector_rate(&self) -> u32 {
        self.detector_rate
    }

    /// Display-path sampling rate (Hz)
    pub fn display_rate(&self) -> u32 {
        self.display_rate
    }

    /// Configured station
    pub fn station(&self) -> Station {
        self.station
    }

    /// Configured group delay (ms)
    pub fn group_delay_ms(&self) -> f32 {
        self.group_delay_ms
    }

    /// True if the tick comb enhancer is enabled
    pub fn tick_comb(&self) -> bool {
        self.tick_comb
    }

    pub(crate) fn tick_detector_enabled(&self) -> bool {
        self.enable_tick_detector
    }

    pub(crate) fn marker_detector_enabled(&self) -> bool {
        self.enable_marker_detector
    }

    pub(crate) fn bcd_detectors_enabled(&self) -> bool {
        self.enable_bcd_detectors
    }

    pub(crate) fn tone_trackers_enabled(&self) -> bool {
        self.enable_tone_trackers
    }

    pub(crate) fn slow_marker_enabled(&self) -> bool {
        self.enable_slow_marker
    }

    pub(crate) fn correlators_enabled(&self) -> bool {
        self.enable_correlators
    }

    pub(crate) fn sync_detector_enabled(&self) -> bool {
        self.enable_sync_detector
    }
}

impl Default for DetectorManagerBuilder {
    fn default() -> Self {
        Self::new(50_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let builder = DetectorManagerBuilder::default();
        assert_eq!(builder.detector_rate(), 50_000);
        assert_eq!(builder.display_rate(), 12_000);
        assert_eq!(builder.station(), Station::Wwv);
        assert!(!builder.tick_comb());
    }

    #[test]
    fn test_clamping() {
        let mut builder = DetectorManagerBuilder::new(10);
        builder.with_display_rate(1).with_group_delay_ms(500.0);
        assert_eq!(builder.detector_rate(), 1000);
        assert_eq!(builder.display_rate(), 1000);
        assert_eq!(builder.group_delay_ms(), 20.0);
    }

    #[test]
    fn test_check_range() {
        assert_eq!(check_range("x", 2.0, 1.0, 5.0), Ok(2.0));
        let err = check_range("x", 0.5, 1.0, 5.0).unwrap_err();
        assert_eq!(err.name, "x");
        assert!(err.to_string().contains("outside the permitted range"));
        assert!(check_range("x", f32::NAN, 1.0, 5.0).is_err());
    }
}
