//! # Pipeline Module
//!
//! Audio file in, tablature out: load, optionally isolate the guitar stem,
//! detect onsets and pitch, collapse frames into notes, choose fretboard
//! positions and export.
//!
//! Onset and pitch detection are independent reads of the same buffer and
//! run on two scoped threads. Everything else is sequential.

use std::path::Path;

use crossbeam_channel::Sender;
use serde::Serialize;

use crate::audio::{AudioBuffer, AudioLoader};
use crate::config::Settings;
use crate::error::TabResult;
use crate::export::{ExportPaths, Exporter};
use crate::mapping::SequenceMapper;
use crate::model::{MappedNote, PitchObservation};
use crate::onset::OnsetDetector;
use crate::pitch::PitchDetector;
use crate::segment;
use crate::separation::StemSeparator;
use crate::timing::Timer;

/// Base name for exports when the input path has no file stem.
pub const DEFAULT_EXPORT_NAME: &str = "analysis_result";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Loading,
    Separating,
    Detecting,
    Mapping,
    Exporting,
}

impl PipelineStage {
    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Loading => "Loading audio",
            PipelineStage::Separating => "Separating guitar stem",
            PipelineStage::Detecting => "Detecting onsets and pitch",
            PipelineStage::Mapping => "Mapping notes to tab",
            PipelineStage::Exporting => "Exporting results",
        }
    }
}

/// Progress reported while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Stage(PipelineStage),
    /// The separator produced stems and `stem` is being transcribed.
    StemSelected { stem: String },
    Detected { onsets: usize, frames: usize },
    Mapped { notes: usize },
    Finished { num_notes: usize },
}

/// Result of a full run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub notes: Vec<MappedNote>,
    pub exports: ExportPaths,
    pub num_notes: usize,
    /// The stem that was transcribed, if separation ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stem: Option<String>,
}

impl AnalysisReport {
    pub fn summary(&self) -> String {
        let mut out = format!("Transcribed {} notes", self.num_notes);
        if let Some(stem) = &self.stem {
            out.push_str(&format!(" from the '{}' stem", stem));
        }
        let exports: Vec<String> = self
            .exports
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        if !exports.is_empty() {
            out.push_str(&format!("\nExports: {}", exports.join(", ")));
        }
        out
    }
}

pub struct TabPipeline {
    settings: Settings,
    loader: AudioLoader,
    onset_detector: OnsetDetector,
    pitch_detector: PitchDetector,
    mapper: SequenceMapper,
    separator: Box<dyn StemSeparator>,
}

impl TabPipeline {
    /// Builds every stage from `settings`; fails on an unusable tuning.
    pub fn from_settings(settings: Settings, separator: Box<dyn StemSeparator>) -> TabResult<Self> {
        settings.validate()?;
        let mapper = settings.sequence_mapper()?;
        log::info!(
            "[PIPELINE] Tuning {} with {} frets, tolerance {} cents, separator '{}'",
            mapper.positions().fretboard().tuning(),
            mapper.positions().fretboard().frets(),
            mapper.tolerance_cents(),
            separator.name()
        );
        Ok(Self {
            loader: settings.audio_loader(),
            onset_detector: settings.onset_detector(),
            pitch_detector: settings.pitch_detector(),
            mapper,
            separator,
            settings,
        })
    }

    /// Pipeline with the separator the settings ask for.
    pub fn new(settings: Settings) -> TabResult<Self> {
        let separator = settings.separator();
        Self::from_settings(settings, separator)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn mapper(&self) -> &SequenceMapper {
        &self.mapper
    }

    pub fn run(&self, path: &Path, export_name: Option<&str>) -> TabResult<AnalysisReport> {
        let (events, _sink) = crossbeam_channel::unbounded();
        self.run_with_progress(path, export_name, &events)
    }

    /// Like [`TabPipeline::run`], reporting progress on `events`.
    ///
    /// A dropped receiver does not stop the run.
    pub fn run_with_progress(
        &self,
        path: &Path,
        export_name: Option<&str>,
        events: &Sender<PipelineEvent>,
    ) -> TabResult<AnalysisReport> {
        let _total = Timer::new("Pipeline");
        let notify = |event: PipelineEvent| {
            let _ = events.send(event);
        };

        notify(PipelineEvent::Stage(PipelineStage::Loading));
        let mut audio = {
            let _t = Timer::new(PipelineStage::Loading.label());
            self.loader.load(path)?
        };

        let mut stem = None;
        if self.settings.separation.enabled {
            notify(PipelineEvent::Stage(PipelineStage::Separating));
            let _t = Timer::new(PipelineStage::Separating.label());
            let stems = self.separator.separate(path)?;
            match stems.pick(&self.settings.separation.preferred_stems) {
                Some((name, stem_path)) => {
                    log::info!("[PIPELINE] Using '{}' stem", name);
                    audio = self.loader.load(stem_path)?;
                    notify(PipelineEvent::StemSelected {
                        stem: name.to_string(),
                    });
                    stem = Some(name.to_string());
                }
                None => log::warn!(
                    "[PIPELINE] None of the preferred stems ({}) were produced, using the mix",
                    self.settings.separation.preferred_stems.join(", ")
                ),
            }
        }

        let notes = self.transcribe_with_progress(&audio, &notify);

        let base_name = export_name
            .map(str::to_string)
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| DEFAULT_EXPORT_NAME.to_string());

        let exports = if self.settings.export.formats.is_empty() {
            ExportPaths::default()
        } else {
            notify(PipelineEvent::Stage(PipelineStage::Exporting));
            let _t = Timer::new(PipelineStage::Exporting.label());
            let exporter = Exporter::new(&self.settings.export.output_dir)?;
            exporter.export_all(
                &notes,
                self.mapper.positions().fretboard().tuning(),
                &base_name,
                &self.settings.export.formats,
                self.settings.midi_options(),
            )?
        };

        notify(PipelineEvent::Finished {
            num_notes: notes.len(),
        });
        Ok(AnalysisReport {
            num_notes: notes.len(),
            notes,
            exports,
            stem,
        })
    }

    /// Detection and mapping on an already loaded buffer; no files are
    /// touched.
    pub fn transcribe(&self, audio: &AudioBuffer) -> Vec<MappedNote> {
        self.transcribe_with_progress(audio, &|_: PipelineEvent| {})
    }

    fn transcribe_with_progress(
        &self,
        audio: &AudioBuffer,
        notify: &dyn Fn(PipelineEvent),
    ) -> Vec<MappedNote> {
        notify(PipelineEvent::Stage(PipelineStage::Detecting));
        let (onsets, frames) = {
            let _t = Timer::new(PipelineStage::Detecting.label());
            self.detect(audio)
        };
        log::info!(
            "[PIPELINE] {} onsets, {} voiced frames",
            onsets.len(),
            frames.len()
        );
        notify(PipelineEvent::Detected {
            onsets: onsets.len(),
            frames: frames.len(),
        });

        notify(PipelineEvent::Stage(PipelineStage::Mapping));
        let _t = Timer::new(PipelineStage::Mapping.label());
        let observations = if self.settings.pitch.group_by_onsets {
            segment::group_by_onsets(&frames, &onsets, audio.duration())
        } else {
            frames
        };
        let notes = self.mapper.map_sequence(&observations);
        notify(PipelineEvent::Mapped { notes: notes.len() });
        notes
    }

    fn detect(&self, audio: &AudioBuffer) -> (Vec<f64>, Vec<PitchObservation>) {
        std::thread::scope(|scope| {
            let onset_worker = scope.spawn(|| self.onset_detector.detect(audio));
            let frames = self.pitch_detector.detect(audio);
            let onsets = match onset_worker.join() {
                Ok(onsets) => onsets,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            (onsets, frames)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav;
    use crate::error::TabError;
    use crate::export::ExportFormat;
    use crate::separation::{NoSeparation, Stems};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn plucked(freqs: &[f64], note_len: f64, sr: u32) -> AudioBuffer {
        let per_note = (note_len * sr as f64) as usize;
        let mut samples = Vec::with_capacity(per_note * freqs.len());
        for &f in freqs {
            for i in 0..per_note {
                let t = i as f64 / sr as f64;
                let env = (-t / 0.25).exp();
                samples.push((0.7 * env * (2.0 * std::f64::consts::PI * f * t).sin()) as f32);
            }
        }
        AudioBuffer::mono(samples, sr)
    }

    fn settings_in(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.audio.sample_rate = 22050;
        settings.export.output_dir = dir.join("exports");
        settings
    }

    struct FixedStems(PathBuf);

    impl StemSeparator for FixedStems {
        fn name(&self) -> &str {
            "fixed"
        }

        fn separate(&self, _path: &Path) -> TabResult<Stems> {
            let mut paths = BTreeMap::new();
            paths.insert("other".to_string(), self.0.clone());
            Ok(Stems::from_paths(paths))
        }
    }

    #[test]
    fn transcribes_a_short_phrase() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = TabPipeline::from_settings(settings_in(dir.path()), Box::new(NoSeparation)).unwrap();

        // A2 then D3 then G3: open strings 2, 3, 4.
        let audio = plucked(&[110.0, 146.83, 196.0], 0.5, 22050);
        let notes = pipeline.transcribe(&audio);
        let mut names: Vec<&str> = notes.iter().map(|n| n.note.as_str()).collect();
        names.dedup();
        assert_eq!(names, vec!["A2", "D3", "G3"], "{:?}", notes);
    }

    #[test]
    fn run_exports_under_the_input_stem() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("riff.wav");
        write_wav(&input, &plucked(&[110.0, 146.83], 0.5, 22050)).unwrap();

        let mut settings = settings_in(dir.path());
        settings.export.formats = vec![ExportFormat::Json, ExportFormat::Tab];
        let pipeline = TabPipeline::from_settings(settings, Box::new(NoSeparation)).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let report = pipeline.run_with_progress(&input, None, &tx).unwrap();
        assert_eq!(report.num_notes, report.notes.len());
        assert_eq!(
            report.exports.json,
            Some(dir.path().join("exports").join("riff.json"))
        );
        assert!(report.exports.tab.as_ref().unwrap().exists());

        let events: Vec<PipelineEvent> = rx.try_iter().collect();
        assert_eq!(events.first(), Some(&PipelineEvent::Stage(PipelineStage::Loading)));
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::Finished {
                num_notes: report.num_notes
            })
        );
    }

    #[test]
    fn separation_switches_to_the_preferred_stem() {
        let dir = tempfile::tempdir().unwrap();
        let mix = dir.path().join("mix.wav");
        let stem = dir.path().join("other.wav");
        write_wav(&mix, &AudioBuffer::mono(vec![0.0; 22050], 22050)).unwrap();
        write_wav(&stem, &plucked(&[110.0], 0.5, 22050)).unwrap();

        let mut settings = settings_in(dir.path());
        settings.separation.enabled = true;
        settings.export.formats.clear();
        let pipeline = TabPipeline::from_settings(settings, Box::new(FixedStems(stem))).unwrap();

        let report = pipeline.run(&mix, Some("take")).unwrap();
        assert_eq!(report.stem.as_deref(), Some("other"));
        assert!(report.num_notes >= 1);
        assert_eq!(report.exports, ExportPaths::default());
    }

    #[test]
    fn missing_input_fails_before_any_export() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = TabPipeline::new(settings_in(dir.path())).unwrap();
        let result = pipeline.run(&dir.path().join("nope.wav"), None);
        assert!(matches!(result, Err(TabError::AudioNotFound { .. })));
        assert!(!dir.path().join("exports").exists());
    }

    #[test]
    fn summary_lists_exports() {
        let report = AnalysisReport {
            num_notes: 2,
            exports: ExportPaths {
                json: Some(PathBuf::from("out/take.json")),
                ..ExportPaths::default()
            },
            ..AnalysisReport::default()
        };
        assert_eq!(report.summary(), "Transcribed 2 notes\nExports: out/take.json");
    }
}
