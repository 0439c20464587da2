use std::io;

use anyhow::Context;
use clap::Parser;
use log::{info, LevelFilter};

use wwvold::{DetectorManagerBuilder, Station};

mod app;
mod cli;

use cli::{Args, CliError};

fn main() {
    match wwvdec() {
        Ok(()) => {}
        Err(cli_error) => cli_error.exit(),
    }
}

fn wwvdec() -> Result<(), CliError> {
    // parse options and start logging
    let args = Args::try_parse()?;
    log_setup(&args);

    // create the detector manager
    let mut manager = DetectorManagerBuilder::new(args.rate)
        .with_display_rate(args.display_rate)
        .with_station(if args.wwvh { Station::Wwvh } else { Station::Wwv })
        .with_group_delay_ms(args.group_delay_ms)
        .with_tick_comb(args.tick_comb)
        .build();

    if let Some(dir) = args.log_dir.as_ref() {
        app::attach_logs(&mut manager, dir)?;
    }

    // file setup: locks stdin in case we need it
    let stdin = io::stdin();
    let stdin_handle = stdin.lock();
    let inbuf = file_setup(&args, stdin_handle)?;

    app::run(&args, &mut manager, inbuf)?;

    manager.log_stats();
    Ok(())
}

fn log_setup(args: &Args) {
    if args.quiet {
        // no logging
        return;
    } else if std::env::var_os("RUST_LOG").is_none() {
        // parameter controls
        let log_filter = match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        pretty_env_logger::formatted_builder()
            .filter_module("wwvold", log_filter)
            .filter_module("wwvdec", log_filter)
            .init();
    } else {
        // environment controls
        pretty_env_logger::init();
    }
}

fn file_setup<'stdin>(
    args: &Args,
    stdin: io::StdinLock<'stdin>,
) -> Result<Box<dyn io::BufRead + 'stdin>, CliError> {
    if args.input_is_stdin() {
        info!("wwv decoder reading standard input");
        Ok(Box::new(io::BufReader::new(stdin)))
    } else {
        info!("wwv decoder reading file: \"{}\"", &args.file);
        let file = std::fs::File::open(&args.file)
            .with_context(|| format!("unable to open --file \"{}\"", args.file))?;
        Ok(Box::new(io::BufReader::new(file)))
    }
}
