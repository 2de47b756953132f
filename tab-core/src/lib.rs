//! The core of the guitar tab transcriber.
//!
//! Turns detected pitches into playable fretboard positions, and wraps that
//! mapping in a headless audio-to-tab pipeline (loading, onset and pitch
//! detection, stem separation, export). It contains no UI code.
//!
//! The mapping core is usable on its own:
//!
//! ```
//! use tab_core::{Fretboard, PitchObservation, PositionMapper, SequenceMapper};
//!
//! let mapper = SequenceMapper::new(PositionMapper::new(Fretboard::standard()));
//! let notes = mapper.map_sequence(&[PitchObservation::new(0.0, 110.0)]);
//! assert_eq!((notes[0].string, notes[0].fret), (1, 5));
//! ```

pub mod audio;
#[cfg(feature = "capture")]
pub mod capture;
pub mod config;
pub mod error;
pub mod export;
pub mod fft;
pub mod fretboard;
pub mod mapping;
pub mod model;
pub mod onset;
pub mod pipeline;
pub mod pitch;
pub mod segment;
pub mod separation;
pub mod timing;
pub mod tuning;

pub use config::Settings;
pub use error::{TabError, TabResult};
pub use fretboard::Fretboard;
pub use mapping::{PositionMapper, SequenceMapper};
pub use model::{FretCandidate, MappedNote, PitchObservation};
pub use pipeline::{AnalysisReport, PipelineEvent, TabPipeline};
pub use tuning::{Tuning, TuningPreset};
