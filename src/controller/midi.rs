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
use std::{io, sync::Arc};

use midly::{live::LiveEvent, MidiMessage};
use tokio::{sync::mpsc, sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Level};

use super::Event;
use crate::midi::Device;
use crate::note::CanonicalPitch;

/// A controller that plays notes from a MIDI keyboard. NoteOn maps to a held
/// attack with the velocity scaled to [0, 1]; NoteOff (or the NoteOn-with-
/// velocity-zero spelling of it) releases the note.
pub struct Driver {
    /// The MIDI input device.
    midi_device: Arc<dyn Device>,
}

impl Driver {
    pub fn new(midi_device: Arc<dyn Device>) -> Driver {
        Driver { midi_device }
    }
}

/// Translates a raw MIDI message into a controller event.
fn translate(raw_event: &[u8]) -> Option<Event> {
    let event = match LiveEvent::parse(raw_event) {
        Ok(event) => event,
        Err(e) => {
            error!(err = format!("{:?}", e), "Error parsing event.");
            return None;
        }
    };

    let message = match event {
        LiveEvent::Midi { message, .. } => message,
        _ => return None,
    };

    match message {
        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
            let pitch = CanonicalPitch::from_midi(key.as_int());
            Some(Event::NoteOn {
                token: pitch.class().name().to_string(),
                octave: Some(pitch.octave()),
                velocity: vel.as_int() as f32 / 127.0,
            })
        }
        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
            let pitch = CanonicalPitch::from_midi(key.as_int());
            Some(Event::NoteOff {
                token: pitch.class().name().to_string(),
                octave: Some(pitch.octave()),
            })
        }
        _ => None,
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let device = self.midi_device.clone();
        let (midi_events_tx, mut midi_events_rx) = mpsc::channel::<Vec<u8>>(64);

        tokio::spawn(async move {
            let span = span!(Level::INFO, "MIDI driver");
            {
                let _enter = span.enter();
                info!(device = device.name(), "MIDI driver started.");
            }

            device
                .watch_events(midi_events_tx)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

            loop {
                let raw_event = match midi_events_rx.recv().await {
                    Some(raw_event) => raw_event,
                    None => {
                        let _enter = span.enter();
                        info!("MIDI watcher closed.");
                        device.stop_watch_events();
                        return Ok(());
                    }
                };

                if let Some(event) = translate(&raw_event) {
                    if events_tx.send(event).await.is_err() {
                        device.stop_watch_events();
                        return Ok(());
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::super::Driver as _;
    use super::*;
    use crate::midi::test::Device as MockDevice;
    use crate::test::eventually;

    fn raw(message: MidiMessage) -> Vec<u8> {
        let event = LiveEvent::Midi {
            channel: 0.into(),
            message,
        };
        let mut buf = Vec::new();
        event.write(&mut buf).expect("error writing event");
        buf
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_midi_note_events() {
        let device = MockDevice::get("mock-midi");
        let driver = super::Driver::new(Arc::new(device.clone()));

        let (events_tx, mut events_rx) = mpsc::channel::<Event>(16);
        let _handle = driver.monitor_events(events_tx);
        eventually(|| device.is_watching(), "watcher never registered");

        // Middle C down at velocity 100.
        device.mock_event(&raw(MidiMessage::NoteOn {
            key: 60.into(),
            vel: 100.into(),
        }));
        assert_eq!(
            Some(Event::NoteOn {
                token: "C".to_string(),
                octave: Some(4),
                velocity: 100.0 / 127.0,
            }),
            events_rx.recv().await
        );

        // And back up.
        device.mock_event(&raw(MidiMessage::NoteOff {
            key: 60.into(),
            vel: 0.into(),
        }));
        assert_eq!(
            Some(Event::NoteOff {
                token: "C".to_string(),
                octave: Some(4),
            }),
            events_rx.recv().await
        );

        // A NoteOn with zero velocity is a release.
        device.mock_event(&raw(MidiMessage::NoteOn {
            key: 61.into(),
            vel: 0.into(),
        }));
        assert_eq!(
            Some(Event::NoteOff {
                token: "C#".to_string(),
                octave: Some(4),
            }),
            events_rx.recv().await
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_midi_ignores_other_messages() {
        let device = MockDevice::get("mock-midi");
        let driver = super::Driver::new(Arc::new(device.clone()));

        let (events_tx, mut events_rx) = mpsc::channel::<Event>(16);
        let _handle = driver.monitor_events(events_tx);
        eventually(|| device.is_watching(), "watcher never registered");

        device.mock_event(&raw(MidiMessage::Controller {
            controller: 64.into(),
            value: 127.into(),
        }));
        // Garbage bytes are logged and skipped.
        device.mock_event(&[1, 2, 3, 4]);

        // The next real note comes through, nothing queued before it.
        device.mock_event(&raw(MidiMessage::NoteOn {
            key: 69.into(),
            vel: 64.into(),
        }));
        assert_eq!(
            Some(Event::NoteOn {
                token: "A".to_string(),
                octave: Some(4),
                velocity: 64.0 / 127.0,
            }),
            events_rx.recv().await
        );
    }
}
