//! Telemetry channel tags
//!
//! The engine can mirror its event stream onto a connectionless telemetry
//! transport. The transport itself (UDP, in the reference deployment)
//! stays outside the library: the manager only formats one line per event
//! and hands it to an opaque sink together with its channel tag.

/// Telemetry broadcast channel
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum_macros::AsRefStr,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
pub enum TelemetryChannel {
    /// Tick and tick-channel marker records
    #[strum(serialize = "TICKS")]
    Ticks,

    /// Minute-marker records
    #[strum(serialize = "MARKERS")]
    Markers,

    /// Sync state and second rollovers
    #[strum(serialize = "SYNC")]
    Sync,

    /// BCD pulses and decoded symbols
    #[strum(serialize = "BCDS")]
    Bcds,

    /// Carrier tracker measurements
    #[strum(serialize = "CARR")]
    Carrier,

    /// 500 Hz tone tracker measurements
    #[strum(serialize = "T500")]
    Tone500,

    /// 600 Hz tone tracker measurements
    #[strum(serialize = "T600")]
    Tone600,
}

/// Opaque sink receiving `(channel, formatted line)` pairs
pub type TelemetrySink = Box<dyn FnMut(TelemetryChannel, &str) + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_wire_tags() {
        assert_eq!(TelemetryChannel::Ticks.as_ref(), "TICKS");
        assert_eq!(TelemetryChannel::Carrier.as_ref(), "CARR");
        assert_eq!(TelemetryChannel::Tone600.as_ref(), "T600");
        assert_eq!(
            TelemetryChannel::from_str("BCDS").unwrap(),
            TelemetryChannel::Bcds
        );
    }

    #[test]
    fn test_tags_unique() {
        let tags: Vec<String> = TelemetryChannel::iter()
            .map(|c| c.as_ref().to_string())
            .collect();
        let mut dedup = tags.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(tags.len(), dedup.len());
    }
}
