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
use std::error::Error;
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, Level};

use crate::player::Player;

pub mod keyboard;
pub mod midi;

/// Controller events that will trigger behavior in the player.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// Plays a note for a musical duration.
    PlayNote {
        token: String,
        octave: Option<i8>,
        duration: Option<String>,
    },

    /// Plays several notes together for a musical duration.
    PlayChord {
        tokens: Vec<String>,
        octave: Option<i8>,
        duration: Option<String>,
    },

    /// Starts a note sounding until the matching NoteOff.
    NoteOn {
        token: String,
        octave: Option<i8>,
        velocity: f32,
    },

    /// Releases a held note.
    NoteOff { token: String, octave: Option<i8> },

    /// Releases everything currently sounding.
    StopAll,

    /// Switches to a different instrument.
    SetInstrument(String),

    /// Sets the master volume.
    SetVolume(f32),
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a player from a stream of controller events.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver. The player's session
    /// is initialized once at startup so the first note doesn't wait for a
    /// sample load.
    pub fn new(player: Arc<Player>, driver: Arc<dyn Driver>) -> Result<Controller, Box<dyn Error>> {
        Ok(Controller {
            handle: tokio::spawn(async move { Controller::trigger_events(player, driver).await }),
        })
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Triggers player events by watching the driver and getting events from it.
    async fn trigger_events(player: Arc<Player>, driver: Arc<dyn Driver>) {
        let span = span!(Level::INFO, "controller");

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx);

        player.initialize().await;
        {
            let _enter = span.enter();
            info!(instrument = player.session().instrument(), "Controller started.");
        }

        loop {
            if let Some(event) = events_rx.recv().await {
                {
                    let _enter = span.enter();
                    info!(event = format!("{:?}", event), "Received event.");
                }

                match event {
                    Event::PlayNote {
                        token,
                        octave,
                        duration,
                    } => player.play_note(&token, octave, duration.as_deref(), None).await,
                    Event::PlayChord {
                        tokens,
                        octave,
                        duration,
                    } => {
                        player
                            .play_chord(&tokens, octave, duration.as_deref(), None)
                            .await
                    }
                    Event::NoteOn {
                        token,
                        octave,
                        velocity,
                    } => player.trigger_attack(&token, octave, velocity),
                    Event::NoteOff { token, octave } => player.trigger_release(&token, octave),
                    Event::StopAll => player.stop_all_notes(),
                    Event::SetInstrument(name) => {
                        player.set_instrument(&name);
                        // Bring the new instrument up right away rather than
                        // on the next note.
                        player.initialize().await;
                    }
                    Event::SetVolume(level) => player.set_volume(level),
                }
            } else {
                let _enter = span.enter();
                info!("Controller closing.");
                if let Err(e) = join_handle.await {
                    tracing::error!("Error waiting for event monitor to stop: {}", e);
                }
                return;
            }
        }
    }
}
