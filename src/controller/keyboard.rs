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
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::player::DEFAULT_NOTE_VELOCITY;

const NOTE: &str = "note";
const CHORD: &str = "chord";
const ON: &str = "on";
const OFF: &str = "off";
const STOP: &str = "stop";
const INSTRUMENT: &str = "instrument";
const VOLUME: &str = "volume";

/// A controller that plays notes from keyboard input. Commands:
///
/// ```text
/// note C# 4 8n     play one note (octave and duration optional)
/// chord C E G      play notes together
/// on C 3           hold a note until "off"
/// off C 3          release a held note
/// stop             release everything
/// instrument organ switch instruments
/// volume 0.5       set the master volume
/// ```
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<(), io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}, {}, {}, {}, {}, {}, {}): ",
            NOTE, CHORD, ON, OFF, STOP, INSTRUMENT, VOLUME,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        reader.read_line(&mut input)?;

        match parse_command(&input) {
            Some(event) => events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
            None => {
                warn!(input = input.trim(), "Unrecognized input");
            }
        }
        Ok(())
    }
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new()
    }
}

/// Parses one input line into an event. Note arguments after the token are
/// positional-free: a signed integer is the octave, anything else is taken as
/// a duration.
fn parse_command(input: &str) -> Option<Event> {
    let mut parts = input.split_whitespace();

    match parts.next()? {
        NOTE => {
            let token = parts.next()?.to_string();
            let mut octave = None;
            let mut duration = None;
            for arg in parts {
                match arg.parse::<i8>() {
                    Ok(parsed) => octave = Some(parsed),
                    Err(_) => duration = Some(arg.to_string()),
                }
            }
            Some(Event::PlayNote {
                token,
                octave,
                duration,
            })
        }
        CHORD => {
            let tokens: Vec<String> = parts.map(str::to_string).collect();
            if tokens.is_empty() {
                return None;
            }
            Some(Event::PlayChord {
                tokens,
                octave: None,
                duration: None,
            })
        }
        ON => Some(Event::NoteOn {
            token: parts.next()?.to_string(),
            octave: parts.next().and_then(|arg| arg.parse().ok()),
            velocity: DEFAULT_NOTE_VELOCITY,
        }),
        OFF => Some(Event::NoteOff {
            token: parts.next()?.to_string(),
            octave: parts.next().and_then(|arg| arg.parse().ok()),
        }),
        STOP => Some(Event::StopAll),
        INSTRUMENT => Some(Event::SetInstrument(parts.next()?.to_string())),
        VOLUME => Some(Event::SetVolume(parts.next()?.parse().ok()?)),
        _ => None,
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            loop {
                Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())?;
            }
        })
    }
}
