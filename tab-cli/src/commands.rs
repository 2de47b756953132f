//! Implementations of the `guitar-tab` subcommands.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, anyhow};
use tab_core::export::render_ascii_tab;
use tab_core::pipeline::PipelineEvent;
use tab_core::tuning::{self, TuningPreset};
use tab_core::{MappedNote, PitchObservation, Settings, TabPipeline};

use crate::cli_args::FretboardArgs;

/// Options of the `transcribe` command.
pub(crate) struct TranscribeOptions {
    pub input: PathBuf,
    pub export: Option<String>,
    pub sr: Option<u32>,
    pub config: Option<PathBuf>,
    pub fretboard: FretboardArgs,
    pub separate: bool,
    pub output_dir: Option<PathBuf>,
    pub print_tab: bool,
}

fn load_settings(config: Option<&Path>, fretboard: &FretboardArgs) -> Result<Settings> {
    let mut settings = Settings::resolve(config).context("failed to load settings")?;
    fretboard.apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Runs the pipeline on a worker thread and reports its progress.
pub(crate) fn transcribe(options: TranscribeOptions) -> Result<()> {
    let mut settings = load_settings(options.config.as_deref(), &options.fretboard)?;
    if let Some(sr) = options.sr {
        settings.audio.sample_rate = sr;
    }
    if options.separate {
        settings.separation.enabled = true;
    }
    if let Some(dir) = options.output_dir {
        settings.export.output_dir = dir;
    }

    let pipeline = TabPipeline::new(settings)?;
    let (event_tx, event_rx) = crossbeam_channel::unbounded::<PipelineEvent>();
    let input = options.input.clone();
    let export = options.export.clone();
    let worker = thread::spawn(move || {
        let report = pipeline.run_with_progress(&input, export.as_deref(), &event_tx);
        (pipeline, report)
    });

    // The channel closes when the worker drops its sender.
    for event in event_rx.iter() {
        match event {
            PipelineEvent::Stage(stage) => log::info!("[MAIN] {}...", stage.label()),
            PipelineEvent::StemSelected { stem } => log::info!("[MAIN] Using the '{}' stem", stem),
            PipelineEvent::Detected { onsets, frames } => {
                log::info!("[MAIN] {} onsets, {} pitched frames", onsets, frames)
            }
            PipelineEvent::Mapped { notes } => log::info!("[MAIN] {} notes placed on the fretboard", notes),
            PipelineEvent::Finished { .. } => log::info!("[MAIN] Pipeline complete"),
        }
    }

    let (pipeline, report) = worker
        .join()
        .map_err(|_| anyhow!("transcription worker panicked"))?;
    let report = report.with_context(|| format!("failed to transcribe {}", options.input.display()))?;

    println!("{}", report.summary());
    if options.print_tab {
        let tuning = pipeline.mapper().positions().fretboard().tuning();
        println!();
        print!("{}", render_ascii_tab(&report.notes, tuning));
    }
    Ok(())
}

/// Maps observations from a JSON file with the mapping core alone.
pub(crate) fn map(
    input: &Path,
    output: Option<&Path>,
    config: Option<&Path>,
    fretboard: &FretboardArgs,
) -> Result<()> {
    let settings = load_settings(config, fretboard)?;
    let notes = map_observations_file(input, &settings)?;
    let json = serde_json::to_string_pretty(&notes)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("[MAIN] Wrote {} notes to {}", notes.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn map_observations_file(input: &Path, settings: &Settings) -> Result<Vec<MappedNote>> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let observations: Vec<PitchObservation> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON list of observations", input.display()))?;
    let mapper = settings.sequence_mapper()?;
    Ok(mapper.map_sequence(&observations))
}

/// Prints every position for one frequency, best match first per string.
pub(crate) fn positions(freq: f64, config: Option<&Path>, fretboard: &FretboardArgs) -> Result<()> {
    let settings = load_settings(config, fretboard)?;
    write_positions(&mut std::io::stdout().lock(), freq, &settings)
}

fn write_positions(out: &mut impl Write, freq: f64, settings: &Settings) -> Result<()> {
    let mapper = settings.sequence_mapper()?;
    let board = mapper.positions().fretboard();
    let candidates = mapper.positions().map(freq, settings.tab.tolerance_cents);

    match tuning::find_nearest_note(freq) {
        Some((name, target)) => writeln!(
            out,
            "{:.2} Hz is {} ({:+.1} cents)",
            freq,
            name,
            tuning::calculate_cents_deviation(freq, target)
        )?,
        None => writeln!(out, "{:.2} Hz has no pitch", freq)?,
    }
    if candidates.is_empty() {
        writeln!(
            out,
            "No position within {} cents on {} ({} frets)",
            settings.tab.tolerance_cents,
            board.tuning(),
            board.frets()
        )?;
        return Ok(());
    }
    for candidate in candidates {
        let label = board
            .tuning()
            .string(candidate.string)
            .map(|s| s.label.as_str())
            .unwrap_or("?");
        writeln!(
            out,
            "string {} ({:<3}) fret {:>2}  {:+6.2} cents",
            candidate.string, label, candidate.fret, candidate.error_cents
        )?;
    }
    Ok(())
}

pub(crate) fn tunings() -> Result<()> {
    let mut out = std::io::stdout().lock();
    for preset in TuningPreset::all() {
        writeln!(out, "{:<15} {}", preset.name(), preset.tuning())?;
    }
    Ok(())
}

#[cfg(feature = "capture")]
pub(crate) fn record(output: &Path, seconds: f64) -> Result<()> {
    if !(seconds.is_finite() && seconds > 0.0) {
        anyhow::bail!("--seconds must be a positive number");
    }
    log::info!("[MAIN] Recording {:.1}s...", seconds);
    let take = tab_core::capture::record(std::time::Duration::from_secs_f64(seconds))?;
    tab_core::audio::write_wav(output, &take)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Saved {:.1}s take to {}", take.duration(), output.display());
    Ok(())
}
