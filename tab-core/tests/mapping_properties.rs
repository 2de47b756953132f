use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use tab_core::{
    Fretboard, MappedNote, PitchObservation, PositionMapper, SequenceMapper, TabError, Tuning,
};

fn mapper() -> SequenceMapper {
    SequenceMapper::new(PositionMapper::new(Fretboard::standard()))
}

fn obs(time: f64, freq: f64) -> PitchObservation {
    PitchObservation::new(time, freq)
}

fn strings(notes: &[MappedNote]) -> Vec<usize> {
    notes.iter().map(|n| n.string).collect()
}

#[test]
fn fretboard_follows_equal_temperament() {
    let board = Fretboard::standard();
    for (index, open) in Tuning::standard().strings().iter().enumerate() {
        let string = index + 1;
        assert_eq!(board.frequency_at(string, 0), Some(open.frequency));
        for fret in 0..=board.frets() {
            let expected = open.frequency * 2f64.powf(fret as f64 / 12.0);
            let actual = board.frequency_at(string, fret).unwrap();
            assert!(
                ((actual - expected) / expected).abs() < 1e-6,
                "string {} fret {}: {} vs {}",
                string,
                fret,
                actual,
                expected
            );
        }
    }
}

#[test]
fn frets_rise_monotonically() {
    let board = Fretboard::new(Tuning::standard(), 24).unwrap();
    for string in 1..=board.string_count() {
        for fret in 0..board.frets() {
            assert!(board.frequency_at(string, fret + 1) > board.frequency_at(string, fret));
        }
    }
}

#[test]
fn bad_tunings_are_rejected_at_construction() {
    for pairs in [
        vec![],
        vec![("E2", 82.41), ("X", 0.0)],
        vec![("E2", -82.41)],
        vec![("A2", 110.0), ("E2", 82.41)],
    ] {
        let result = Tuning::from_pairs(&pairs).and_then(|t| Fretboard::new(t, 22));
        assert!(
            matches!(result, Err(TabError::InvalidTuning { .. })),
            "{:?} was accepted",
            pairs
        );
    }
}

#[test]
fn non_positive_frequency_has_no_candidates() {
    let positions = PositionMapper::default();
    assert!(positions.map(0.0, 25.0).is_empty());
    assert!(positions.map(-100.0, 25.0).is_empty());
}

#[test]
fn exact_open_string_matches_with_tight_tolerance() {
    let candidates = PositionMapper::default().map(82.41, 0.1);
    let first = candidates[0];
    assert_eq!((first.string, first.fret), (1, 0));
    assert!(first.error_cents.abs() < 1e-9);
}

#[test]
fn far_out_of_range_frequency_has_no_candidates() {
    assert!(PositionMapper::default().map(10_000.0, 5.0).is_empty());
}

#[test]
fn near_fret_lands_on_low_string() {
    let candidates = PositionMapper::default().map(82.5, 5.0);
    assert!(candidates.iter().any(|c| c.string == 1));
}

#[test]
fn ascending_open_strings_never_move_down() {
    // Each later note is reachable on string 1 as well, which is distance 0.
    let notes = mapper().map_sequence(&[obs(0.0, 82.41), obs(0.5, 110.0), obs(1.0, 146.83)]);
    let chosen = strings(&notes);
    assert_eq!(chosen.len(), 3);
    let mut sorted = chosen.clone();
    sorted.sort_unstable();
    assert_eq!(chosen, sorted);
    assert_eq!(chosen, vec![1, 1, 1]);
}

#[test]
fn ambiguous_pitch_stays_on_previous_string() {
    let notes = mapper().map_sequence(&[obs(0.0, 82.41), obs(0.5, 87.31)]);
    assert_eq!(strings(&notes), vec![1, 1]);
    assert_eq!(notes[1].fret, 1);
}

#[test]
fn empty_sequence_maps_to_nothing() {
    assert!(mapper().map_sequence(&[]).is_empty());
}

#[test]
fn unpitched_frames_are_dropped_in_order() {
    let input = [obs(0.0, 110.0), obs(0.25, 0.0), obs(0.5, 146.83)];
    let notes = mapper().map_sequence(&input);
    let times: Vec<f64> = notes.iter().map(|n| n.time).collect();
    assert_eq!(times, vec![0.0, 0.5]);
}

#[test]
fn each_call_starts_fresh() {
    let mapper = mapper();
    let first = mapper.map_sequence(&[obs(0.0, 440.0), obs(0.5, 392.0)]);
    let second = mapper.map_sequence(&[obs(0.0, 392.0)]);
    // Without a previous note, 392 Hz takes its lowest string.
    assert_eq!((second[0].string, second[0].fret), (2, 22));
    assert_eq!(mapper.map_sequence(&[obs(0.0, 440.0), obs(0.5, 392.0)]), first);
}

#[test]
fn shared_mapper_is_safe_across_threads() {
    let mapper = Arc::new(mapper());
    let expected = mapper.map_sequence(&[obs(0.0, 82.41), obs(0.5, 87.31)]);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mapper = Arc::clone(&mapper);
            thread::spawn(move || mapper.map_sequence(&[obs(0.0, 82.41), obs(0.5, 87.31)]))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn mapped_notes_carry_observation_fields() {
    let input = [PitchObservation::new(1.5, 196.0)
        .with_velocity(77)
        .with_duration(0.3)];
    let notes = mapper().map_sequence(&input);
    assert_eq!(notes.len(), 1);
    let note = &notes[0];
    assert_eq!(note.time, 1.5);
    assert_eq!(note.note, "G3");
    assert_eq!(note.velocity, Some(77));
    assert_eq!(note.duration, Some(0.3));
}
