//! # Export Module
//!
//! Writes mapped notes to disk as JSON, CSV, a single-track MIDI file or a
//! plain-text tablature.
//!
//! MIDI is written with `midly`: events are collected at absolute ticks,
//! sorted, and converted to delta times before the track is closed.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};

use crate::error::{TabError, TabResult};
use crate::model::MappedNote;
use crate::tuning::Tuning;

/// Steel-string acoustic guitar (General MIDI program 26, zero-based 25).
pub const GUITAR_PROGRAM: u8 = 25;

/// Velocity for notes that carry none.
pub const DEFAULT_VELOCITY: u8 = 90;

/// Output formats the exporter knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Midi,
    Tab,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Midi => "mid",
            ExportFormat::Tab => "txt",
        }
    }
}

/// Timing of the exported MIDI file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiOptions {
    pub tempo_us_per_beat: u32,
    pub ticks_per_beat: u16,
}

impl Default for MidiOptions {
    fn default() -> Self {
        Self {
            tempo_us_per_beat: 500_000,
            ticks_per_beat: 480,
        }
    }
}

impl MidiOptions {
    fn ticks_per_second(&self) -> f64 {
        self.ticks_per_beat as f64 * 1_000_000.0 / self.tempo_us_per_beat.max(1) as f64
    }

    fn seconds_to_ticks(&self, seconds: f64) -> u32 {
        (seconds.max(0.0) * self.ticks_per_second()).round() as u32
    }
}

/// Where each export landed; formats that were not requested stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportPaths {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub midi: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab: Option<PathBuf>,
}

impl ExportPaths {
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        [&self.json, &self.csv, &self.midi, &self.tab]
            .into_iter()
            .filter_map(|p| p.as_deref())
    }
}

/// Writes exports into one output directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    /// Creates the exporter, creating `output_dir` if needed.
    pub fn new(output_dir: impl Into<PathBuf>) -> TabResult<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Pretty-printed JSON array of notes.
    pub fn to_json(&self, notes: &[MappedNote], filename: &str) -> TabResult<PathBuf> {
        let path = self.output_dir.join(filename);
        let json = serde_json::to_string_pretty(notes)?;
        std::fs::write(&path, json)?;
        log::debug!("[EXPORT] Wrote {} notes to {}", notes.len(), path.display());
        Ok(path)
    }

    /// One row per note. Missing velocity or duration leaves the cell empty.
    pub fn to_csv(&self, notes: &[MappedNote], filename: &str) -> TabResult<PathBuf> {
        if notes.is_empty() {
            return Err(TabError::export("no data to export"));
        }
        let path = self.output_dir.join(filename);

        let mut out = String::from("time,freq,note,string,fret,velocity,duration\n");
        for note in notes {
            let velocity = note.velocity.map(|v| v.to_string()).unwrap_or_default();
            let duration = note.duration.map(|d| d.to_string()).unwrap_or_default();
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{}",
                note.time,
                note.freq,
                csv_escape(&note.note),
                note.string,
                note.fret,
                velocity,
                duration
            );
        }
        std::fs::write(&path, out)?;
        log::debug!("[EXPORT] Wrote {} rows to {}", notes.len(), path.display());
        Ok(path)
    }

    /// Single-track standard MIDI file.
    pub fn to_midi(
        &self,
        notes: &[MappedNote],
        filename: &str,
        options: MidiOptions,
    ) -> TabResult<PathBuf> {
        let path = self.output_dir.join(filename);
        let bytes = encode_midi(notes, options)?;
        std::fs::write(&path, bytes)?;
        log::debug!("[EXPORT] Wrote MIDI to {}", path.display());
        Ok(path)
    }

    /// Plain-text tablature, see [`render_ascii_tab`].
    pub fn to_ascii_tab(
        &self,
        notes: &[MappedNote],
        tuning: &Tuning,
        filename: &str,
    ) -> TabResult<PathBuf> {
        let path = self.output_dir.join(filename);
        std::fs::write(&path, render_ascii_tab(notes, tuning))?;
        Ok(path)
    }

    /// Writes every requested format as `<base_name>.<ext>`.
    ///
    /// CSV is skipped with a warning when there are no notes instead of
    /// failing the whole export.
    pub fn export_all(
        &self,
        notes: &[MappedNote],
        tuning: &Tuning,
        base_name: &str,
        formats: &[ExportFormat],
        midi: MidiOptions,
    ) -> TabResult<ExportPaths> {
        let mut paths = ExportPaths::default();
        for &format in formats {
            let filename = format!("{}.{}", base_name, format.extension());
            match format {
                ExportFormat::Json => paths.json = Some(self.to_json(notes, &filename)?),
                ExportFormat::Csv if notes.is_empty() => {
                    log::warn!("[EXPORT] No notes, skipping CSV export");
                }
                ExportFormat::Csv => paths.csv = Some(self.to_csv(notes, &filename)?),
                ExportFormat::Midi => paths.midi = Some(self.to_midi(notes, &filename, midi)?),
                ExportFormat::Tab => paths.tab = Some(self.to_ascii_tab(notes, tuning, &filename)?),
            }
        }
        Ok(paths)
    }
}

fn encode_midi(notes: &[MappedNote], options: MidiOptions) -> TabResult<Vec<u8>> {
    let half_beat = (options.ticks_per_beat / 2).max(1) as u32;

    let mut events: Vec<TrackEvent> = Vec::with_capacity(notes.len() * 2 + 3);
    events.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(options.tempo_us_per_beat.into())),
    });
    events.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Midi {
            channel: 0.into(),
            message: MidiMessage::ProgramChange {
                program: GUITAR_PROGRAM.into(),
            },
        },
    });

    // (key, velocity, on tick, off tick), ordered by on tick
    let mut placed: Vec<(u8, u8, u32, u32)> = Vec::with_capacity(notes.len());
    for note in notes {
        let Some(key) = note.midi() else {
            log::debug!("[EXPORT] No MIDI pitch for {:.2} Hz, skipping", note.freq);
            continue;
        };
        let start = options.seconds_to_ticks(note.time);
        let end = note
            .duration
            .map(|d| options.seconds_to_ticks(note.time + d))
            .unwrap_or(start + half_beat)
            .max(start + 1);
        let vel = note.velocity.unwrap_or(DEFAULT_VELOCITY).clamp(1, 127);
        placed.push((key, vel, start, end));
    }
    placed.sort_by_key(|&(_, _, start, _)| start);

    // A held note ends where the next note on the same key begins.
    for i in 0..placed.len() {
        let (key, _, start, _) = placed[i];
        if let Some(&(_, _, next_start, _)) = placed[i + 1..].iter().find(|p| p.0 == key) {
            placed[i].3 = placed[i].3.min(next_start.max(start));
        }
    }

    for (key, vel, start, end) in placed {
        if end <= start {
            log::debug!("[EXPORT] Key {} restruck at tick {}, dropping the earlier note", key, start);
            continue;
        }
        events.push(TrackEvent {
            delta: start.into(),
            kind: TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOn {
                    key: key.into(),
                    vel: vel.into(),
                },
            },
        });
        events.push(TrackEvent {
            delta: end.into(),
            kind: TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOff {
                    key: key.into(),
                    vel: 0.into(),
                },
            },
        });
    }

    // Note-offs go before note-ons that share a tick.
    events.sort_by_key(|e| {
        let on = matches!(
            e.kind,
            TrackEventKind::Midi {
                message: MidiMessage::NoteOn { .. },
                ..
            }
        );
        (e.delta.as_int(), on)
    });
    convert_to_delta_times(&mut events);
    events.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(options.ticks_per_beat.into()),
        },
        tracks: vec![events],
    };
    let mut out = Vec::new();
    smf.write(&mut out)
        .map_err(|e| TabError::export(format!("failed to write MIDI: {}", e)))?;
    Ok(out)
}

/// Convert absolute tick times to delta times (time since previous event)
fn convert_to_delta_times(events: &mut [TrackEvent]) {
    let mut prev_tick = 0u32;
    for event in events.iter_mut() {
        let current_tick = event.delta.as_int();
        event.delta = current_tick.saturating_sub(prev_tick).into();
        prev_tick = current_tick;
    }
}

/// Renders notes as text tablature, one row per string with the highest
/// string on top and one column per note.
///
/// ```text
/// E4|-----|
/// B3|-----|
/// G3|-----|
/// D3|-----|
/// A2|---2-|
/// E2|-0---|
/// ```
pub fn render_ascii_tab(notes: &[MappedNote], tuning: &Tuning) -> String {
    let strings = tuning.strings();
    let label_width = strings.iter().map(|s| s.label.len()).max().unwrap_or(0);
    let notes: Vec<&MappedNote> = notes
        .iter()
        .filter(|n| n.string >= 1 && n.string <= strings.len())
        .collect();

    let mut out = String::new();
    for (index, open) in strings.iter().enumerate().rev() {
        let number = index + 1;
        let _ = write!(out, "{:<width$}|", open.label, width = label_width);
        for note in &notes {
            let width = note.fret.to_string().len();
            out.push('-');
            if note.string == number {
                let _ = write!(out, "{}", note.fret);
            } else {
                out.push_str(&"-".repeat(width));
            }
        }
        out.push_str("-|\n");
    }
    out
}

/// Escape a string for CSV (quote if contains comma, quote, or newline).
fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
