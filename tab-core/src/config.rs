//! Configuration for the transcription pipeline.
//!
//! Settings come from an optional YAML file, then from environment
//! variables of the form `GUITAR_TAB__<SECTION>__<KEY>`, e.g.
//! `GUITAR_TAB__TAB__TOLERANCE_CENTS=40`. Every section and field has a
//! default, so a file only needs the values it changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::audio::{AudioLoader, DEFAULT_SAMPLE_RATE};
use crate::error::{TabError, TabResult};
use crate::export::{ExportFormat, MidiOptions};
use crate::fretboard::{Fretboard, DEFAULT_FRETS};
use crate::mapping::{PositionMapper, SequenceMapper, DEFAULT_TOLERANCE_CENTS};
use crate::onset::OnsetDetector;
use crate::pitch::{PitchDetector, DEFAULT_FMAX, DEFAULT_FMIN};
use crate::separation::{DemucsSeparator, NoSeparation, StemSeparator, DEFAULT_MODEL};
use crate::tuning::{OpenString, Tuning, TuningPreset};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "GUITAR_TAB__";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub pitch: PitchSettings,
    pub onset: OnsetSettings,
    pub tab: TabSettings,
    pub separation: SeparationSettings,
    pub export: ExportSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub mono: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            mono: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchSettings {
    pub fmin: f32,
    pub fmax: f32,
    pub frame_length: usize,
    pub hop_length: usize,
    pub amplitude_threshold: f32,
    pub smoothing_window: usize,
    /// Collapse frames into one note per onset before mapping.
    pub group_by_onsets: bool,
    pub spectral_refinement: bool,
}

impl Default for PitchSettings {
    fn default() -> Self {
        Self {
            fmin: DEFAULT_FMIN,
            fmax: DEFAULT_FMAX,
            frame_length: 2048,
            hop_length: 512,
            amplitude_threshold: 0.01,
            smoothing_window: 5,
            group_by_onsets: true,
            spectral_refinement: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetSettings {
    pub backtrack: bool,
    pub sensitivity: f32,
}

impl Default for OnsetSettings {
    fn default() -> Self {
        Self {
            backtrack: true,
            sensitivity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabSettings {
    /// Preset name, see [`TuningPreset`].
    pub tuning: String,
    /// Open strings lowest first; replaces the preset when set.
    pub custom_tuning: Option<Vec<OpenString>>,
    pub frets: usize,
    pub tolerance_cents: f64,
}

impl Default for TabSettings {
    fn default() -> Self {
        Self {
            tuning: TuningPreset::Standard.name().to_string(),
            custom_tuning: None,
            frets: DEFAULT_FRETS,
            tolerance_cents: DEFAULT_TOLERANCE_CENTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationSettings {
    pub enabled: bool,
    pub model: String,
    pub executable: Option<PathBuf>,
    /// Stems to transcribe, most wanted first.
    pub preferred_stems: Vec<String>,
}

impl Default for SeparationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: DEFAULT_MODEL.to_string(),
            executable: None,
            preferred_stems: vec!["guitar".to_string(), "other".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub output_dir: PathBuf,
    pub formats: Vec<ExportFormat>,
    pub tempo_us_per_beat: u32,
    pub ticks_per_beat: u16,
}

impl Default for ExportSettings {
    fn default() -> Self {
        let midi = MidiOptions::default();
        Self {
            output_dir: PathBuf::from("exports"),
            formats: vec![ExportFormat::Json, ExportFormat::Csv, ExportFormat::Midi],
            tempo_us_per_beat: midi.tempo_us_per_beat,
            ticks_per_beat: midi.ticks_per_beat,
        }
    }
}

impl Settings {
    /// Reads a YAML file. Fields it leaves out keep their defaults.
    pub fn load(path: &Path) -> TabResult<Self> {
        if !path.exists() {
            return Err(TabError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml_str(&content)?;
        log::debug!("[CONFIG] Loaded {}", path.display());
        Ok(settings)
    }

    pub fn from_yaml_str(content: &str) -> TabResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// File (if any), then process environment, then validation.
    pub fn resolve(path: Option<&Path>) -> TabResult<Self> {
        let settings = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(std::env::vars())
    }

    /// Applies `GUITAR_TAB__<SECTION>__<KEY>` pairs from `vars`.
    ///
    /// Values are parsed as YAML scalars, so `true`, `40` and `drop-d` all
    /// land with the right type. Names that match no setting are ignored.
    pub fn apply_overrides<I>(self, vars: I) -> TabResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut tree = serde_yaml::to_value(&self)?;
        let mut applied = 0usize;

        for (name, raw) in vars {
            let Some(rest) = strip_prefix_ignore_case(&name, ENV_PREFIX) else {
                continue;
            };
            let parts: Vec<String> = rest.split("__").map(|p| p.to_ascii_lowercase()).collect();
            let [section, key] = parts.as_slice() else {
                log::debug!("[CONFIG] Ignoring {}", name);
                continue;
            };

            let Some(slot) = tree
                .get_mut(section.as_str())
                .and_then(|s| s.get_mut(key.as_str()))
            else {
                log::debug!("[CONFIG] Ignoring unknown setting {}", name);
                continue;
            };
            *slot = serde_yaml::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
            applied += 1;
        }

        if applied == 0 {
            self.validate()?;
            return Ok(self);
        }
        let settings: Settings = serde_yaml::from_value(tree)?;
        settings.validate()?;
        log::debug!("[CONFIG] Applied {} environment overrides", applied);
        Ok(settings)
    }

    pub fn to_yaml(&self) -> TabResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Rejects settings that cannot produce a working pipeline.
    pub fn validate(&self) -> TabResult<()> {
        if self.audio.sample_rate == 0 {
            return Err(TabError::config("audio.sample_rate must be positive"));
        }
        if !(self.pitch.fmin > 0.0 && self.pitch.fmin < self.pitch.fmax) {
            return Err(TabError::config("pitch.fmin must be positive and below pitch.fmax"));
        }
        if self.pitch.hop_length == 0 || self.pitch.frame_length < self.pitch.hop_length {
            return Err(TabError::config(
                "pitch.hop_length must be positive and no larger than pitch.frame_length",
            ));
        }
        if !(self.tab.tolerance_cents.is_finite() && self.tab.tolerance_cents >= 0.0) {
            return Err(TabError::config("tab.tolerance_cents must be a non-negative number"));
        }
        if self.export.tempo_us_per_beat == 0 || self.export.ticks_per_beat == 0 {
            return Err(TabError::config("export tempo and ticks_per_beat must be positive"));
        }
        self.tuning()?;
        Ok(())
    }

    /// The custom tuning if one is set, otherwise the named preset.
    pub fn tuning(&self) -> TabResult<Tuning> {
        if let Some(strings) = &self.tab.custom_tuning {
            return Tuning::new(strings.clone());
        }
        TuningPreset::from_name(&self.tab.tuning)
            .map(TuningPreset::tuning)
            .ok_or_else(|| TabError::config(format!("unknown tuning preset: {}", self.tab.tuning)))
    }

    pub fn fretboard(&self) -> TabResult<Fretboard> {
        Fretboard::new(self.tuning()?, self.tab.frets)
    }

    pub fn sequence_mapper(&self) -> TabResult<SequenceMapper> {
        let positions = PositionMapper::from_shared(Arc::new(self.fretboard()?));
        Ok(SequenceMapper::new(positions).with_tolerance(self.tab.tolerance_cents))
    }

    pub fn audio_loader(&self) -> AudioLoader {
        AudioLoader::new(self.audio.sample_rate, self.audio.mono)
    }

    pub fn pitch_detector(&self) -> PitchDetector {
        PitchDetector {
            fmin: self.pitch.fmin,
            fmax: self.pitch.fmax,
            frame_length: self.pitch.frame_length,
            hop_length: self.pitch.hop_length,
            amplitude_threshold: self.pitch.amplitude_threshold,
            smoothing_window: self.pitch.smoothing_window,
            spectral_refinement: self.pitch.spectral_refinement,
        }
    }

    /// Shares framing with the pitch detector so onset and pitch times line up.
    pub fn onset_detector(&self) -> OnsetDetector {
        OnsetDetector {
            frame_length: self.pitch.frame_length,
            hop_length: self.pitch.hop_length,
            backtrack: self.onset.backtrack,
            sensitivity: self.onset.sensitivity,
        }
    }

    pub fn midi_options(&self) -> MidiOptions {
        MidiOptions {
            tempo_us_per_beat: self.export.tempo_us_per_beat,
            ticks_per_beat: self.export.ticks_per_beat,
        }
    }

    pub fn separator(&self) -> Box<dyn StemSeparator> {
        if self.separation.enabled {
            Box::new(DemucsSeparator::new(
                self.separation.model.clone(),
                self.separation.executable.clone(),
            ))
        } else {
            Box::new(NoSeparation)
        }
    }
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &name[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.tab.frets, 22);
        assert_eq!(settings.tab.tolerance_cents, 25.0);
        assert_eq!(settings.tuning().unwrap(), Tuning::standard());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = "
tab:
  tuning: drop-d
  tolerance_cents: 40
export:
  formats: [json, tab]
";
        let settings = Settings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.tab.tolerance_cents, 40.0);
        assert_eq!(settings.tab.frets, 22);
        assert_eq!(settings.tuning().unwrap().strings()[0].label, "D2");
        assert_eq!(settings.export.formats, vec![ExportFormat::Json, ExportFormat::Tab]);
        assert_eq!(settings.pitch, PitchSettings::default());
    }

    #[test]
    fn custom_tuning_replaces_preset() {
        let yaml = "
tab:
  custom_tuning:
    - { label: C2, frequency: 65.41 }
    - { label: G2, frequency: 98.0 }
";
        let settings = Settings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.tuning().unwrap().len(), 2);
    }

    #[test]
    fn descending_custom_tuning_is_rejected() {
        let yaml = "
tab:
  custom_tuning:
    - { label: G2, frequency: 98.0 }
    - { label: C2, frequency: 65.41 }
";
        assert!(Settings::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn unknown_preset_is_a_config_error() {
        let yaml = "tab:\n  tuning: banjo\n";
        assert!(matches!(
            Settings::from_yaml_str(yaml),
            Err(TabError::Config { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(matches!(
            Settings::load(Path::new("/nonexistent/guitar-tab.yaml")),
            Err(TabError::Config { .. })
        ));
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "audio:\n  sample_rate: 22050\n").unwrap();
        assert_eq!(Settings::load(&path).unwrap().audio.sample_rate, 22050);
    }

    #[test]
    fn env_overrides_are_typed_and_case_insensitive() {
        let settings = Settings::default()
            .apply_overrides(vars(&[
                ("GUITAR_TAB__TAB__TOLERANCE_CENTS", "40"),
                ("guitar_tab__separation__enabled", "true"),
                ("GUITAR_TAB__TAB__TUNING", "dadgad"),
                ("GUITAR_TAB__NOPE__FIELD", "1"),
                ("HOME", "/root"),
            ]))
            .unwrap();
        assert_eq!(settings.tab.tolerance_cents, 40.0);
        assert!(settings.separation.enabled);
        assert_eq!(settings.tab.tuning, "dadgad");
    }

    #[test]
    fn env_override_can_fill_optional_fields() {
        let settings = Settings::default()
            .apply_overrides(vars(&[("GUITAR_TAB__SEPARATION__EXECUTABLE", "/opt/demucs")]))
            .unwrap();
        assert_eq!(settings.separation.executable, Some(PathBuf::from("/opt/demucs")));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let result = Settings::default()
            .apply_overrides(vars(&[("GUITAR_TAB__PITCH__FMIN", "2000")]));
        assert!(matches!(result, Err(TabError::Config { .. })));
    }

    #[test]
    fn builders_carry_settings() {
        let mut settings = Settings::default();
        settings.pitch.hop_length = 256;
        settings.onset.sensitivity = 0.5;
        settings.tab.tolerance_cents = 35.0;

        assert_eq!(settings.onset_detector().hop_length, 256);
        assert_eq!(settings.onset_detector().sensitivity, 0.5);
        assert_eq!(settings.pitch_detector().hop_length, 256);
        assert_eq!(settings.sequence_mapper().unwrap().tolerance_cents(), 35.0);
        assert_eq!(settings.separator().name(), "none");
        settings.separation.enabled = true;
        assert_eq!(settings.separator().name(), "demucs");
    }

    #[test]
    fn yaml_round_trip() {
        let yaml = Settings::default().to_yaml().unwrap();
        assert_eq!(Settings::from_yaml_str(&yaml).unwrap(), Settings::default());
    }
}
