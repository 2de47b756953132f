//! Records passed between the pitch estimator, the mappers and the exporters.

use serde::{Deserialize, Deserializer, Serialize};

use crate::tuning;

/// One detected pitch at one point in time.
///
/// Frequencies of zero or below mean "no pitch" and are dropped by the
/// mappers rather than rejected here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchObservation {
    /// Onset time in seconds.
    pub time: f64,
    /// Fundamental frequency in Hz. Missing or `null` reads as 0 (unvoiced).
    #[serde(default, deserialize_with = "freq_or_unvoiced")]
    pub freq: f64,
    /// Note name, e.g. "A4".
    #[serde(default)]
    pub note: String,
    /// MIDI velocity (1-127) if the estimator measured loudness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<u8>,
    /// Length of the note in seconds, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl PitchObservation {
    /// Builds an observation, naming the note from its frequency.
    pub fn new(time: f64, freq: f64) -> Self {
        Self {
            time,
            freq,
            note: tuning::freq_to_note_name(freq).unwrap_or_default(),
            velocity: None,
            duration: None,
        }
    }

    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// True when the frequency carries pitch information.
    pub fn is_voiced(&self) -> bool {
        self.freq.is_finite() && self.freq > 0.0
    }
}

fn freq_or_unvoiced<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// A possible place to play a pitch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FretCandidate {
    /// 1-based string number.
    pub string: usize,
    /// Fret number, 0 = open string.
    pub fret: usize,
    /// Observed pitch relative to the fretted pitch, in cents.
    pub error_cents: f64,
}

/// An observation with the position chosen for it.
///
/// `string` and `fret` are always present; observations that fit nowhere
/// on the fretboard never become a `MappedNote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedNote {
    pub time: f64,
    pub freq: f64,
    pub note: String,
    pub string: usize,
    pub fret: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl MappedNote {
    pub fn from_observation(observation: &PitchObservation, position: &FretCandidate) -> Self {
        Self {
            time: observation.time,
            freq: observation.freq,
            note: observation.note.clone(),
            string: position.string,
            fret: position.fret,
            velocity: observation.velocity,
            duration: observation.duration,
        }
    }

    /// Nearest MIDI note number of the detected frequency.
    pub fn midi(&self) -> Option<u8> {
        tuning::freq_to_midi(self.freq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_names_its_note() {
        let obs = PitchObservation::new(0.5, 110.0).with_velocity(80);
        assert_eq!(obs.note, "A2");
        assert_eq!(obs.velocity, Some(80));
        assert!(obs.is_voiced());
        assert!(!PitchObservation::new(0.0, 0.0).is_voiced());
    }

    #[test]
    fn upstream_records_deserialize_without_optional_fields() {
        let obs: PitchObservation =
            serde_json::from_str(r#"{"time": 1.25, "freq": 196.0, "note": "G3"}"#).unwrap();
        assert_eq!(obs.velocity, None);
        assert_eq!(obs.duration, None);
        assert_eq!(obs.note, "G3");
    }

    #[test]
    fn records_without_frequency_read_as_unvoiced() {
        let obs: Vec<PitchObservation> = serde_json::from_str(
            r#"[
                {"time": 0.0, "freq": 110.0, "note": "A2"},
                {"time": 0.5, "note": ""},
                {"time": 1.0, "freq": null, "note": ""}
            ]"#,
        )
        .unwrap();
        assert_eq!(obs.len(), 3);
        assert!(obs[0].is_voiced());
        assert_eq!(obs[1].freq, 0.0);
        assert!(!obs[1].is_voiced());
        assert!(!obs[2].is_voiced());
    }

    #[test]
    fn mapped_note_serializes_position() {
        let obs = PitchObservation::new(0.0, 82.41);
        let note = MappedNote::from_observation(
            &obs,
            &FretCandidate {
                string: 1,
                fret: 0,
                error_cents: 0.0,
            },
        );
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["string"], 1);
        assert_eq!(json["fret"], 0);
        assert_eq!(json["note"], "E2");
        assert!(json.get("velocity").is_none());
        assert_eq!(note.midi(), Some(40));
    }
}
