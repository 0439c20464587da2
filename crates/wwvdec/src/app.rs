//! Sample pump and event printing
//!
//! Reads interleaved i16 I/Q pairs from the detector-path input and
//! pushes them through the manager, draining and printing events as they
//! appear. When a display-path file is supplied, its samples are
//! interleaved at the configured rate ratio so both paths advance
//! together in stream time.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::Context;
use byteorder::{NativeEndian, ReadBytesExt};
use log::info;

use wwvold::{DetectorManager, EventLog};

use crate::cli::Args;

const I16_SCALE: f32 = 1.0 / 32768.0;

/// Attach per-detector CSV logs under `dir`
pub fn attach_logs(manager: &mut DetectorManager, dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("unable to create --log-dir \"{}\"", dir.display()))?;

    let open = |name: &str| -> anyhow::Result<Box<dyn std::io::Write + Send>> {
        let path = dir.join(name);
        let file = std::fs::File::create(&path)
            .with_context(|| format!("unable to create \"{}\"", path.display()))?;
        Ok(Box::new(file))
    };

    if let Some(tick) = manager.tick_detector_mut() {
        tick.set_log(open("wwv_ticks.csv")?);
    }
    if let Some(marker) = manager.marker_detector_mut() {
        marker.set_log(open("wwv_markers.csv")?);
    }
    if let Some(bcd) = manager.bcd_time_detector_mut() {
        bcd.set_log(open("wwv_bcd_time.csv")?);
    }
    if let Some(bcd) = manager.bcd_freq_detector_mut() {
        bcd.set_log(open("wwv_bcd_freq.csv")?);
    }
    if let Some(chain) = manager.tick_chain_mut() {
        chain.set_log(open("wwv_tick_chain.csv")?);
    }
    if let Some(windower) = manager.symbol_windower_mut() {
        windower.set_log(open("wwv_symbols.csv")?);
    }
    if let Some(sync) = manager.sync_detector_mut() {
        sync.set_log(open("wwv_sync.csv")?);
    }

    info!("event logs under \"{}\"", dir.display());
    Ok(())
}

/// Run the decode loop until the detector input is exhausted
pub fn run(
    args: &Args,
    manager: &mut DetectorManager,
    mut input: Box<dyn BufRead + '_>,
) -> anyhow::Result<()> {
    let mut display = match args.display_file.as_ref() {
        Some(path) => {
            info!("display path reading file: \"{}\"", path.display());
            let file = std::fs::File::open(path)
                .with_context(|| format!("unable to open --display-file \"{}\"", path.display()))?;
            Some(BufReader::new(file))
        }
        None => None,
    };

    // display samples owed per detector sample
    let ratio = args.display_rate as f32 / args.rate as f32;
    let mut display_due = 0.0f32;

    while let Some((i, q)) = read_pair(&mut input) {
        manager.push_detector_sample(i, q);

        if display.is_some() {
            display_due += ratio;
            let mut exhausted = false;
            if let Some(disp) = display.as_mut() {
                while display_due >= 1.0 {
                    display_due -= 1.0;
                    match read_pair(disp) {
                        Some((di, dq)) => manager.push_display_sample(di, dq),
                        None => {
                            exhausted = true;
                            break;
                        }
                    }
                }
            }
            if exhausted {
                display = None;
            }
        }

        for event in manager.events() {
            if !args.quiet {
                println!("{}", event);
            }
        }
    }

    Ok(())
}

// One interleaved i16 I/Q pair, scaled to [-1, 1)
fn read_pair<R: Read>(reader: &mut R) -> Option<(f32, f32)> {
    let i = reader.read_i16::<NativeEndian>().ok()?;
    let q = reader.read_i16::<NativeEndian>().ok()?;
    Some((i as f32 * I16_SCALE, q as f32 * I16_SCALE))
}
