//! Argument definitions for the `guitar-tab` command line.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use tab_core::Settings;
use tab_core::TuningPreset;

/// Turns guitar recordings into tablature
#[derive(Parser)]
#[command(name = "guitar-tab")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Transcribe a WAV recording and export the tab
    Transcribe {
        /// Path to the input WAV file
        #[arg(short, long)]
        input: PathBuf,

        /// Base name for exported files (default: input file stem)
        #[arg(short, long)]
        export: Option<String>,

        /// Analysis sample rate
        #[arg(long)]
        sr: Option<u32>,

        /// YAML settings file
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        fretboard: FretboardArgs,

        /// Isolate the guitar with demucs before transcribing
        #[arg(long)]
        separate: bool,

        /// Directory for exported files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Print the tab to stdout when done
        #[arg(long)]
        print_tab: bool,
    },

    /// Map a JSON list of pitch observations to fretboard positions
    Map {
        /// JSON array of {time, freq, note} records
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// YAML settings file
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        fretboard: FretboardArgs,
    },

    /// List every fretboard position for a frequency
    Positions {
        /// Frequency in Hz
        freq: f64,

        /// YAML settings file
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        fretboard: FretboardArgs,
    },

    /// List the built-in tunings
    Tunings,

    /// Record a take from the default input device
    #[cfg(feature = "capture")]
    Record {
        /// Where to write the WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Length of the take in seconds
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
    },
}

/// Fretboard overrides shared by the mapping commands.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct FretboardArgs {
    /// Tuning preset (see `guitar-tab tunings`)
    #[arg(long, value_parser = parse_preset)]
    pub tuning: Option<TuningPreset>,

    /// Number of frets
    #[arg(long)]
    pub frets: Option<usize>,

    /// Match tolerance in cents
    #[arg(long)]
    pub tolerance: Option<f64>,
}

impl FretboardArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(preset) = self.tuning {
            settings.tab.tuning = preset.name().to_string();
            settings.tab.custom_tuning = None;
        }
        if let Some(frets) = self.frets {
            settings.tab.frets = frets;
        }
        if let Some(tolerance) = self.tolerance {
            settings.tab.tolerance_cents = tolerance;
        }
    }
}

fn parse_preset(name: &str) -> Result<TuningPreset, String> {
    TuningPreset::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = TuningPreset::all().iter().map(|p| p.name()).collect();
        format!("unknown tuning '{}' (expected one of: {})", name, known.join(", "))
    })
}
