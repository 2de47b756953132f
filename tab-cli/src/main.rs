//! # guitar-tab
//!
//! Command-line front end for `tab-core`. Transcribes WAV recordings into
//! tablature, maps ready-made pitch lists onto the fretboard, and lists
//! positions and tunings.
//!
//! Long transcriptions run on a worker thread; stage progress comes back
//! over a crossbeam channel and is logged as it arrives.

mod cli_args;
mod commands;

use std::process::ExitCode;

use clap::Parser;

use cli_args::{Cli, Commands};
use commands::TranscribeOptions;

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Transcribe {
            input,
            export,
            sr,
            config,
            fretboard,
            separate,
            output_dir,
            print_tab,
        } => commands::transcribe(TranscribeOptions {
            input,
            export,
            sr,
            config,
            fretboard,
            separate,
            output_dir,
            print_tab,
        }),
        Commands::Map {
            input,
            output,
            config,
            fretboard,
        } => commands::map(&input, output.as_deref(), config.as_deref(), &fretboard),
        Commands::Positions {
            freq,
            config,
            fretboard,
        } => commands::positions(freq, config.as_deref(), &fretboard),
        Commands::Tunings => commands::tunings(),
        #[cfg(feature = "capture")]
        Commands::Record { output, seconds } => commands::record(&output, seconds),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tab_core::TuningPreset;

    #[test]
    fn parses_transcribe_with_overrides() {
        let cli = Cli::try_parse_from([
            "guitar-tab",
            "-v",
            "transcribe",
            "-i",
            "song.wav",
            "-e",
            "song_tab",
            "--tuning",
            "Drop D",
            "--tolerance",
            "40",
            "--separate",
            "--print-tab",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Transcribe {
                input,
                export,
                fretboard,
                separate,
                print_tab,
                sr,
                ..
            } => {
                assert_eq!(input.to_str(), Some("song.wav"));
                assert_eq!(export.as_deref(), Some("song_tab"));
                assert_eq!(fretboard.tuning, Some(TuningPreset::DropD));
                assert_eq!(fretboard.tolerance, Some(40.0));
                assert!(separate);
                assert!(print_tab);
                assert_eq!(sr, None);
            }
            _ => panic!("expected transcribe command"),
        }
    }

    #[test]
    fn parses_positions() {
        let cli = Cli::try_parse_from(["guitar-tab", "positions", "329.63", "--frets", "24"]).unwrap();
        match cli.command {
            Commands::Positions { freq, fretboard, .. } => {
                assert_eq!(freq, 329.63);
                assert_eq!(fretboard.frets, Some(24));
            }
            _ => panic!("expected positions command"),
        }
    }

    #[test]
    fn rejects_unknown_tuning() {
        assert!(Cli::try_parse_from(["guitar-tab", "positions", "110", "--tuning", "banjo"]).is_err());
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["guitar-tab", "-q", "-v", "tunings"]).is_err());
    }
}
