//! Musical note utilities: cents math and 12-tone-equal-tempered
//! quantization, referenced to A4 = 440 Hz.

/// A4 reference frequency in Hz.
pub const A4_HZ: f64 = 440.0;

/// C0 derived from A4: A4 is 4 octaves and 9 semitones above C0.
/// 440 · 2^(-4.75) ≈ 16.35 Hz.
pub fn c0_hz() -> f64 {
    A4_HZ * 2f64.powf(-4.75)
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// The nearest equal-tempered note to a frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Note name with octave, e.g. "A3".
    pub name: String,
    /// Exact equal-tempered frequency of the note in Hz.
    pub frequency_hz: f64,
    /// Signed distance from the input frequency to the note, in cents.
    /// Negative means the input was flat relative to the note.
    pub cents_offset: f64,
}

/// Interval between two frequencies in cents: `1200 · log2(f2 / f1)`.
/// Both frequencies must be positive; callers guard unvoiced (zero) values.
pub fn cents_between(f1: f64, f2: f64) -> f64 {
    1200.0 * (f2 / f1).log2()
}

/// Quantize a frequency to the nearest 12-TET note.
/// Returns None for non-positive input (unvoiced frames).
pub fn nearest_note(frequency_hz: f64) -> Option<Note> {
    if frequency_hz <= 0.0 {
        return None;
    }

    let c0 = c0_hz();
    let semitones_from_c0 = 12.0 * (frequency_hz / c0).log2();
    let n = semitones_from_c0.round();

    // Below C0 there is no sensible note name; treat as unpitched rumble.
    if n < 0.0 {
        return None;
    }

    let n = n as i64;
    let note_hz = c0 * 2f64.powf(n as f64 / 12.0);
    let name = format!("{}{}", NOTE_NAMES[(n % 12) as usize], n / 12);

    Some(Note {
        name,
        frequency_hz: note_hz,
        cents_offset: cents_between(note_hz, frequency_hz),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_maps_to_itself() {
        let note = nearest_note(440.0).unwrap();
        assert_eq!(note.name, "A4");
        assert!((note.frequency_hz - 440.0).abs() < 0.01);
        assert!(note.cents_offset.abs() < 0.01);
    }

    #[test]
    fn a3_is_half_of_a4() {
        let note = nearest_note(220.0).unwrap();
        assert_eq!(note.name, "A3");
        assert!((note.frequency_hz - 220.0).abs() < 0.01);
    }

    #[test]
    fn sharp_input_reports_positive_offset() {
        // 445 Hz is ~19.6 cents sharp of A4
        let note = nearest_note(445.0).unwrap();
        assert_eq!(note.name, "A4");
        assert!(note.cents_offset > 15.0 && note.cents_offset < 25.0);
    }

    #[test]
    fn octave_is_1200_cents() {
        assert!((cents_between(220.0, 440.0) - 1200.0).abs() < 1e-9);
        assert!((cents_between(440.0, 220.0) + 1200.0).abs() < 1e-9);
    }

    #[test]
    fn unvoiced_has_no_note() {
        assert_eq!(nearest_note(0.0), None);
        assert_eq!(nearest_note(-10.0), None);
    }

    #[test]
    fn middle_c() {
        let note = nearest_note(261.63).unwrap();
        assert_eq!(note.name, "C4");
    }
}
