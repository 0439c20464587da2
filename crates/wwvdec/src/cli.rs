use std::fmt::Display;
use std::path::PathBuf;

use clap::{error::ErrorKind, CommandFactory, Parser};

/// Standard input filename
const STDIN_FILE: &str = "-";

const USAGE_SHORT: &str = r#"
This program accepts raw interleaved I/Q samples in signed 16-bit (i16) format, at the given sampling --rate, and reports WWV/WWVH time-signal events: second ticks, minute markers, BCD symbols, and synchronization state.

See --help for more details.
"#;

const USAGE_LONG: &str = r#"
This program accepts raw interleaved I/Q samples in signed 16-bit (i16) format, at the given sampling --rate, and reports WWV/WWVH time-signal events: second ticks, minute markers, BCD symbols, and synchronization state.

The input must be complex baseband centered on a WWV or WWVH carrier. You can pipe samples from an SDR receiver chain, for example:

    rtl_sdr -f 10000000 -s 250000 - \
        | your_ddc --decimate-to 50k --format s16 \
        | wwvdec -r 50000

A second stream at the display rate may be supplied with --display-file; it drives the reference-tone trackers and the slow marker check. Without it, only the detector path runs.

With --log-dir, each detector appends its per-event CSV records under the given directory.
"#;

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_help = USAGE_SHORT, after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-vvv for more)
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print NOTHING, not even decoded events
    #[arg(short, long)]
    pub quiet: bool,

    /// Detector-path sampling rate (Hz)
    ///
    /// Set to the rate of your I/Q source. The detectors were designed
    /// around 50 kHz.
    #[arg(short, long, default_value_t = 50_000)]
    pub rate: u32,

    /// Display-path sampling rate (Hz)
    #[arg(long, default_value_t = 12_000)]
    pub display_rate: u32,

    /// Input file (or "-" for stdin)
    ///
    /// Interleaved I/Q pairs, signed 16-bit native-endian, at --rate.
    #[arg(long, default_value_t = STDIN_FILE.to_string())]
    pub file: String,

    /// Optional display-path input file
    ///
    /// Interleaved I/Q pairs, signed 16-bit native-endian, at
    /// --display-rate. Drives the tone trackers and slow marker check.
    #[arg(long)]
    pub display_file: Option<PathBuf>,

    /// Directory for per-detector CSV event logs
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Detect WWVH (1200 Hz ticks) instead of WWV
    #[arg(long)]
    pub wwvh: bool,

    /// Channel-filter group delay compensation (ms)
    #[arg(long, default_value_t = 3.0)]
    #[arg(hide_short_help = true)]
    pub group_delay_ms: f32,

    /// Enable the comb enhancer on the tick energy pipeline
    #[arg(long)]
    #[arg(hide_short_help = true)]
    pub tick_comb: bool,
}

impl Args {
    /// Return true if the user requests input from stdin
    pub fn input_is_stdin(&self) -> bool {
        self.file == STDIN_FILE
    }
}

/// A program-level error with exit code
#[derive(Debug)]
pub struct CliError {
    error: anyhow::Error,
    exit_code: i32,
}

impl CliError {
    /// Create new error with a custom exit code
    pub fn new(error: anyhow::Error, code: i32) -> CliError {
        CliError {
            error,
            exit_code: code,
        }
    }

    /// Print this error to the terminal
    ///
    /// Errors from clap are printed verbatim. Other types of errors are
    /// printed indirectly via clap's fancy formatter.
    pub fn print(&self) -> std::io::Result<()> {
        if let Some(e) = self.error.downcast_ref::<clap::Error>() {
            e.print()
        } else {
            Args::command()
                .error(ErrorKind::Format, self.to_string())
                .print()
        }
    }

    /// Print this error to the terminal and exit
    pub fn exit(&self) -> ! {
        drop(self.print());
        std::process::exit(self.exit_code);
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.error)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(error: anyhow::Error) -> Self {
        CliError::new(error, 1)
    }
}

impl From<clap::Error> for CliError {
    fn from(error: clap::Error) -> Self {
        let code = i32::from(error.use_stderr());
        CliError::new(error.into(), code)
    }
}
