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

//! YAML configuration for the player.

use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::note::CanonicalPitch;
use crate::tempo::Tempo;

const DEFAULT_INSTRUMENT: &str = "piano";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3030";

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The audio device. An empty or missing value selects the host default.
    #[serde(default)]
    device: String,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }
}

/// A YAML representation of a sampled instrument: a sparse map of canonical
/// pitches to sample files. Pitches with no sample are pitch-shifted from the
/// nearest mapped neighbor at playback time.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Instrument {
    /// Sample files by canonical pitch (e.g. `"C4": samples/C4.wav`). Paths
    /// are relative to the config file.
    #[serde(default)]
    samples: HashMap<CanonicalPitch, PathBuf>,
}

impl Instrument {
    /// New will create a new Instrument configuration.
    pub fn new(samples: HashMap<CanonicalPitch, PathBuf>) -> Instrument {
        Instrument { samples }
    }

    /// Returns the sample map.
    pub fn samples(&self) -> &HashMap<CanonicalPitch, PathBuf> {
        &self.samples
    }
}

/// A YAML representation of the persistence API configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Api {
    /// The address the HTTP server listens on.
    #[serde(default = "default_listen_addr")]
    listen_addr: String,
}

impl Api {
    /// Returns the listen address.
    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }
}

impl Default for Api {
    fn default() -> Api {
        Api {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_instrument() -> String {
    DEFAULT_INSTRUMENT.to_string()
}

/// A YAML representation of the player configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Player {
    /// The audio configuration.
    #[serde(default)]
    audio: Audio,

    /// The tempo used to interpret musical durations.
    #[serde(default)]
    tempo: Tempo,

    /// The MIDI input device to take note events from, if any.
    midi_device: Option<String>,

    /// The instrument selected at startup.
    #[serde(default = "default_instrument")]
    instrument: String,

    /// The available instruments by name. An instrument with no samples (or a
    /// name not present here) plays through the built-in synth.
    #[serde(default)]
    instruments: HashMap<String, Instrument>,

    /// The persistence API configuration, if the API should be served.
    api: Option<Api>,

    /// The directory sample paths are resolved against. Set from the config
    /// file location, not from YAML.
    #[serde(skip)]
    base_path: PathBuf,
}

impl Player {
    /// Parses the player configuration from the given YAML file. Relative
    /// sample paths are resolved against the file's directory.
    pub fn deserialize(path: &Path) -> Result<Player, Box<dyn Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("error reading config file {}: {}", path.display(), e))?;
        let mut config: Player = serde_yml::from_str(&contents)
            .map_err(|e| format!("error parsing config file {}: {}", path.display(), e))?;
        config.base_path = path
            .canonicalize()?
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Returns the audio configuration.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Returns the configured tempo.
    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Returns the MIDI input device name, if one is configured.
    pub fn midi_device(&self) -> Option<&str> {
        self.midi_device.as_deref()
    }

    /// Returns the name of the startup instrument.
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Returns the instrument definitions with sample paths resolved to
    /// absolute paths.
    pub fn instruments(&self) -> HashMap<String, Instrument> {
        self.instruments
            .iter()
            .map(|(name, instrument)| {
                let samples = instrument
                    .samples
                    .iter()
                    .map(|(pitch, file)| (*pitch, self.base_path.join(file)))
                    .collect();
                (name.clone(), Instrument::new(samples))
            })
            .collect()
    }

    /// Returns the persistence API configuration, if the API is enabled.
    pub fn api(&self) -> Option<&Api> {
        self.api.as_ref()
    }
}

impl Default for Player {
    /// A configuration for running without a config file: default audio
    /// device, default tempo, synth-only playback, no API.
    fn default() -> Player {
        Player {
            audio: Audio::default(),
            tempo: Tempo::default(),
            midi_device: None,
            instrument: default_instrument(),
            instruments: HashMap::new(),
            api: None,
            base_path: PathBuf::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;
    use crate::note::resolve;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
audio:
  device: mock-device
tempo: 90
midi_device: "Test MIDI"
instrument: piano
instruments:
  piano:
    samples:
      "C4": samples/C4.wav
      "A4": samples/A4.wav
api:
  listen_addr: "0.0.0.0:8080"
"#;
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("player.yaml");
        let mut file = fs::File::create(&path).expect("create failed");
        file.write_all(yaml.as_bytes()).expect("write failed");

        let config = Player::deserialize(&path).expect("parse failed");
        assert_eq!("mock-device", config.audio().device());
        assert_eq!(90.0, config.tempo().bpm());
        assert_eq!(Some("Test MIDI"), config.midi_device());
        assert_eq!("piano", config.instrument());
        assert_eq!(
            Some("0.0.0.0:8080"),
            config.api().map(|api| api.listen_addr())
        );

        let instruments = config.instruments();
        let piano = instruments.get("piano").expect("no piano");
        assert_eq!(2, piano.samples().len());

        // Sample paths resolve against the config file's directory.
        let c4 = piano.samples().get(&resolve("C", None)).expect("no C4");
        assert!(c4.is_absolute());
        assert!(c4.ends_with("samples/C4.wav"));
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Player = serde_yml::from_str("{}").expect("parse failed");
        assert_eq!("", config.audio().device());
        assert_eq!(120.0, config.tempo().bpm());
        assert_eq!(None, config.midi_device());
        assert_eq!("piano", config.instrument());
        assert!(config.instruments().is_empty());
        assert!(config.api().is_none());
    }

    #[test]
    fn test_bad_pitch_key_errors() {
        let yaml = r#"
instruments:
  piano:
    samples:
      "H4": samples/H4.wav
"#;
        assert!(serde_yml::from_str::<Player>(yaml).is_err());
    }
}
