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
#[cfg(feature = "api")]
mod api;
mod audio;
mod config;
mod controller;
mod instrument;
mod midi;
mod note;
mod player;
mod playsync;
mod samples;
#[cfg(feature = "api")]
mod store;
mod tempo;
#[cfg(test)]
mod test;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};

use crate::audio::mixer::Mixer;
use crate::instrument::InstrumentSession;
use crate::player::Player;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "An interactive piano note and chord player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Plays a single note and exits.
    Note {
        /// The note token, e.g. C, C#, Cs.
        token: String,
        /// The octave to play in.
        #[arg(short, long)]
        octave: Option<i8>,
        /// The musical duration, e.g. 8n or 4n.
        #[arg(short, long)]
        duration: Option<String>,
        /// The path to the player config.
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Plays a chord and exits.
    Chord {
        /// The note tokens of the chord, e.g. C E G.
        #[arg(required = true)]
        tokens: Vec<String>,
        /// The octave to play in.
        #[arg(short, long)]
        octave: Option<i8>,
        /// The musical duration, e.g. 4n or 2n.
        #[arg(short, long)]
        duration: Option<String>,
        /// The path to the player config.
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Start will start the interactive player.
    Start {
        /// The path to the player config.
        config_path: Option<String>,
        /// The path to a JSON snapshot to seed the song store from.
        #[cfg(feature = "api")]
        #[arg(long)]
        snapshot: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Note {
            token,
            octave,
            duration,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let player = build_player(&config)?;

            player
                .play_note(&token, octave, duration.as_deref(), None)
                .await;
            wait_for_silence(&player).await;
        }
        Commands::Chord {
            tokens,
            octave,
            duration,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let player = build_player(&config)?;

            player
                .play_chord(&tokens, octave, duration.as_deref(), None)
                .await;
            wait_for_silence(&player).await;
        }
        #[cfg(feature = "api")]
        Commands::Start {
            config_path,
            snapshot,
        } => {
            let config = load_config(config_path.as_deref())?;
            let player = build_player(&config)?;

            if let Some(api_config) = config.api() {
                let store = Arc::new(match snapshot {
                    Some(snapshot) => store::Store::from_snapshot(Path::new(&snapshot))?,
                    None => store::Store::new(),
                });
                let listen_addr = api_config.listen_addr().to_string();
                tokio::spawn(async move {
                    if let Err(e) = api::serve(store, &listen_addr).await {
                        tracing::error!(err = e.as_ref(), "Persistence API failed");
                    }
                });
            }

            start(player, &config).await?;
        }
        #[cfg(not(feature = "api"))]
        Commands::Start { config_path } => {
            let config = load_config(config_path.as_deref())?;
            let player = build_player(&config)?;
            start(player, &config).await?;
        }
    }

    Ok(())
}

/// Loads the config file, or the built-in default when none is given.
fn load_config(path: Option<&str>) -> Result<config::Player, Box<dyn Error>> {
    match path {
        Some(path) => config::Player::deserialize(Path::new(path)),
        None => Ok(config::Player::default()),
    }
}

/// The composition root: audio device, mixer, session, player.
fn build_player(config: &config::Player) -> Result<Arc<Player>, Box<dyn Error>> {
    let device = audio::get_device(config.audio())?;
    let (mixer, source_tx) = Mixer::new(device.num_channels(), device.sample_rate());
    let mixer = Arc::new(mixer);
    device.start(mixer.clone())?;

    let session = Arc::new(InstrumentSession::new(
        mixer,
        source_tx,
        config.instruments(),
        config.instrument(),
    ));
    Ok(Arc::new(Player::new(session, config.tempo())))
}

/// Runs the interactive controllers until they exit.
async fn start(player: Arc<Player>, config: &config::Player) -> Result<(), Box<dyn Error>> {
    let mut controllers = vec![controller::Controller::new(
        player.clone(),
        Arc::new(controller::keyboard::Driver::new()),
    )?];

    if let Some(midi_device) = config.midi_device() {
        let device = midi::get_device(midi_device)?;
        controllers.push(controller::Controller::new(
            player.clone(),
            Arc::new(controller::midi::Driver::new(device)),
        )?);
    }

    for controller in controllers.iter_mut() {
        controller.join().await?;
    }
    Ok(())
}

/// Waits for every sounding note to finish, plus a little extra for the
/// release tails to clear the output buffer.
async fn wait_for_silence(player: &Arc<Player>) {
    let session = player.session();
    while session.sounding_count() > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tokio::time::sleep(Duration::from_millis(400)).await;
}
