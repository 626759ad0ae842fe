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

//! Musical durations.
//!
//! Converts duration strings (`"8n"` = eighth note, `"4n"` = quarter note,
//! `"4n."` = dotted quarter) into wall-clock durations using the configured
//! tempo.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// The tempo used when the config doesn't specify one.
pub const DEFAULT_BPM: f64 = 120.0;

/// A tempo in beats (quarter notes) per minute.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub fn new(bpm: f64) -> Tempo {
        Tempo { bpm }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// The wall-clock length of a whole note (four beats) at this tempo.
    pub fn whole_note(&self) -> Duration {
        Duration::from_secs_f64(240.0 / self.bpm)
    }
}

impl Default for Tempo {
    fn default() -> Tempo {
        Tempo { bpm: DEFAULT_BPM }
    }
}

/// Typed error for duration parse failures so callers can distinguish a bad
/// note value from a malformed string.
#[derive(Debug, thiserror::Error)]
pub enum DurationError {
    #[error("duration '{0}' is not of the form <value>n")]
    Malformed(String),
    #[error("unsupported note value '{0}' (expected 1, 2, 4, 8 or 16)")]
    UnsupportedValue(u32),
}

/// A musical duration: a note value with an optional dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationSpec {
    /// Note value as the denominator of a whole note: 4 = quarter note.
    value: u32,
    /// A dotted duration is half again as long.
    dotted: bool,
}

impl DurationSpec {
    pub const WHOLE: DurationSpec = DurationSpec {
        value: 1,
        dotted: false,
    };
    pub const QUARTER: DurationSpec = DurationSpec {
        value: 4,
        dotted: false,
    };
    pub const EIGHTH: DurationSpec = DurationSpec {
        value: 8,
        dotted: false,
    };

    /// Converts this duration to wall-clock time at the given tempo.
    pub fn to_duration(&self, tempo: Tempo) -> Duration {
        let base = tempo.whole_note().div_f64(self.value as f64);
        if self.dotted {
            base.mul_f64(1.5)
        } else {
            base
        }
    }
}

impl FromStr for DurationSpec {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<DurationSpec, DurationError> {
        let (body, dotted) = match s.strip_suffix('.') {
            Some(body) => (body, true),
            None => (s, false),
        };
        let value: u32 = body
            .strip_suffix('n')
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| DurationError::Malformed(s.to_string()))?;
        if !matches!(value, 1 | 2 | 4 | 8 | 16) {
            return Err(DurationError::UnsupportedValue(value));
        }
        Ok(DurationSpec { value, dotted })
    }
}

impl std::fmt::Display for DurationSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}n{}", self.value, if self.dotted { "." } else { "" })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(DurationSpec::QUARTER, "4n".parse().unwrap());
        assert_eq!(DurationSpec::EIGHTH, "8n".parse().unwrap());
        assert_eq!(DurationSpec::WHOLE, "1n".parse().unwrap());

        let dotted: DurationSpec = "4n.".parse().unwrap();
        assert!(dotted.dotted);
        assert_eq!(4, dotted.value);

        assert!("4".parse::<DurationSpec>().is_err());
        assert!("n".parse::<DurationSpec>().is_err());
        assert!("3n".parse::<DurationSpec>().is_err());
        assert!("".parse::<DurationSpec>().is_err());
    }

    #[test]
    fn test_to_duration_at_120_bpm() {
        let tempo = Tempo::default();
        assert_eq!(120.0, tempo.bpm());

        assert_eq!(
            Duration::from_millis(2000),
            DurationSpec::WHOLE.to_duration(tempo)
        );
        assert_eq!(
            Duration::from_millis(500),
            DurationSpec::QUARTER.to_duration(tempo)
        );
        assert_eq!(
            Duration::from_millis(250),
            DurationSpec::EIGHTH.to_duration(tempo)
        );
        assert_eq!(
            Duration::from_millis(750),
            "4n.".parse::<DurationSpec>().unwrap().to_duration(tempo)
        );
    }

    #[test]
    fn test_to_duration_at_other_tempos() {
        let tempo = Tempo::new(60.0);
        assert_eq!(
            Duration::from_secs(1),
            DurationSpec::QUARTER.to_duration(tempo)
        );

        let tempo = Tempo::new(240.0);
        assert_eq!(
            Duration::from_millis(125),
            DurationSpec::EIGHTH.to_duration(tempo)
        );
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["1n", "2n", "4n", "8n", "16n", "4n.", "8n."] {
            let spec: DurationSpec = s.parse().unwrap();
            assert_eq!(s, spec.to_string());
        }
    }
}
