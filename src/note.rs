// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Note name resolution.
//!
//! Maps user-facing note tokens (`"C"`, `"Cs"`, `"C#"`) plus an optional
//! octave to canonical pitches (`"C#4"`), the only identifier the instrument
//! layer accepts. Resolution is lenient: an unrecognized token falls back to
//! `C` at the requested octave so that playback never fails over a bad name.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The octave used when a caller doesn't specify one.
pub const DEFAULT_OCTAVE: i8 = 4;

/// One of the 12 semitone classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PitchClass {
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

impl PitchClass {
    /// Matches a user-facing note token against the class table. Both sharp
    /// spellings (`Cs` and `C#`) are accepted; `Es`/`E#` and `Bs`/`B#`
    /// canonicalize to their enharmonic naturals. Matching is case sensitive.
    pub fn from_token(token: &str) -> Option<PitchClass> {
        match token {
            "C" => Some(PitchClass::C),
            "Cs" | "C#" => Some(PitchClass::Cs),
            "D" => Some(PitchClass::D),
            "Ds" | "D#" => Some(PitchClass::Ds),
            "E" => Some(PitchClass::E),
            "Es" | "E#" => Some(PitchClass::F),
            "F" => Some(PitchClass::F),
            "Fs" | "F#" => Some(PitchClass::Fs),
            "G" => Some(PitchClass::G),
            "Gs" | "G#" => Some(PitchClass::Gs),
            "A" => Some(PitchClass::A),
            "As" | "A#" => Some(PitchClass::As),
            "B" => Some(PitchClass::B),
            "Bs" | "B#" => Some(PitchClass::C),
            _ => None,
        }
    }

    /// Semitone offset from C, 0-11.
    pub fn semitone(self) -> u8 {
        match self {
            PitchClass::C => 0,
            PitchClass::Cs => 1,
            PitchClass::D => 2,
            PitchClass::Ds => 3,
            PitchClass::E => 4,
            PitchClass::F => 5,
            PitchClass::Fs => 6,
            PitchClass::G => 7,
            PitchClass::Gs => 8,
            PitchClass::A => 9,
            PitchClass::As => 10,
            PitchClass::B => 11,
        }
    }

    /// Builds a pitch class from a semitone offset (modulo 12).
    pub fn from_semitone(semitone: u8) -> PitchClass {
        match semitone % 12 {
            0 => PitchClass::C,
            1 => PitchClass::Cs,
            2 => PitchClass::D,
            3 => PitchClass::Ds,
            4 => PitchClass::E,
            5 => PitchClass::F,
            6 => PitchClass::Fs,
            7 => PitchClass::G,
            8 => PitchClass::Gs,
            9 => PitchClass::A,
            10 => PitchClass::As,
            _ => PitchClass::B,
        }
    }

    /// The canonical rendering of this class.
    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::Cs => "C#",
            PitchClass::D => "D",
            PitchClass::Ds => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Fs => "F#",
            PitchClass::G => "G",
            PitchClass::Gs => "G#",
            PitchClass::A => "A",
            PitchClass::As => "A#",
            PitchClass::B => "B",
        }
    }
}

/// A fully qualified pitch: class plus octave. Renders as `"C#4"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CanonicalPitch {
    class: PitchClass,
    octave: i8,
}

impl CanonicalPitch {
    pub fn new(class: PitchClass, octave: i8) -> CanonicalPitch {
        CanonicalPitch { class, octave }
    }

    pub fn class(&self) -> PitchClass {
        self.class
    }

    pub fn octave(&self) -> i8 {
        self.octave
    }

    /// The MIDI note number for this pitch, clamped to the 0-127 range.
    pub fn midi(&self) -> u8 {
        let midi = (self.octave as i16 + 1) * 12 + self.class.semitone() as i16;
        midi.clamp(0, 127) as u8
    }

    /// Builds a pitch from a MIDI note number (middle C = 60 = C4).
    pub fn from_midi(key: u8) -> CanonicalPitch {
        CanonicalPitch {
            class: PitchClass::from_semitone(key % 12),
            octave: (key / 12) as i8 - 1,
        }
    }

    /// Frequency in Hz, equal temperament with A4 = 440 Hz.
    pub fn frequency(&self) -> f64 {
        440.0 * 2f64.powf((self.midi() as f64 - 69.0) / 12.0)
    }
}

impl fmt::Display for CanonicalPitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class.name(), self.octave)
    }
}

impl From<CanonicalPitch> for String {
    fn from(pitch: CanonicalPitch) -> String {
        pitch.to_string()
    }
}

impl TryFrom<String> for CanonicalPitch {
    type Error = String;

    /// Parses a canonical rendering such as `"C#4"`. This is stricter than
    /// [`resolve`]: it is used for config files, where a typo should surface.
    fn try_from(value: String) -> Result<CanonicalPitch, String> {
        let split = value
            .find(|c: char| c == '-' || c.is_ascii_digit())
            .ok_or_else(|| format!("pitch '{}' has no octave", value))?;
        let (token, octave) = value.split_at(split);
        let class = PitchClass::from_token(token)
            .ok_or_else(|| format!("unrecognized note name '{}'", token))?;
        let octave: i8 = octave
            .parse()
            .map_err(|e| format!("bad octave in '{}': {}", value, e))?;
        Ok(CanonicalPitch::new(class, octave))
    }
}

/// Resolves a user-facing note token to a canonical pitch. The octave defaults
/// to 4 when unspecified. An unrecognized token resolves to `C` at the same
/// octave rather than erroring; the playback path is never allowed to fail
/// over a bad note name.
pub fn resolve(token: &str, octave: Option<i8>) -> CanonicalPitch {
    let octave = octave.unwrap_or(DEFAULT_OCTAVE);
    let class = PitchClass::from_token(token).unwrap_or(PitchClass::C);
    CanonicalPitch::new(class, octave)
}
