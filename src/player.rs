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

//! The playback facade.
//!
//! The one-shot entry points (`play_note`, `play_chord`) initialize the
//! session on demand, trigger the attacks, and schedule the matching releases
//! on the runtime. Scheduled releases are never cancelled; a stop-all between
//! attack and timer simply makes the timer's release redundant. The held-note
//! entry points (`trigger_attack`, `trigger_release`) are synchronous and do
//! not initialize, so a controller can drive them from a callback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, span, warn, Level, Span};

use crate::instrument::InstrumentSession;
use crate::note::{resolve, CanonicalPitch};
use crate::tempo::{DurationSpec, Tempo};

/// Duration of a note played without one.
pub const DEFAULT_NOTE_DURATION: DurationSpec = DurationSpec::EIGHTH;
/// Velocity of a note played without one.
pub const DEFAULT_NOTE_VELOCITY: f32 = 0.8;
/// Duration of a chord played without one.
pub const DEFAULT_CHORD_DURATION: DurationSpec = DurationSpec::QUARTER;
/// Velocity of a chord played without one.
pub const DEFAULT_CHORD_VELOCITY: f32 = 0.6;

/// Plays notes and chords through an instrument session.
pub struct Player {
    session: Arc<InstrumentSession>,
    tempo: Tempo,
    span: Span,
}

impl Player {
    /// Creates a new player for the given session.
    pub fn new(session: Arc<InstrumentSession>, tempo: Tempo) -> Player {
        Player {
            session,
            tempo,
            span: span!(Level::INFO, "player"),
        }
    }

    /// The session this player drives.
    pub fn session(&self) -> Arc<InstrumentSession> {
        self.session.clone()
    }

    /// The tempo used to interpret durations.
    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Initializes the session if it isn't playable yet.
    pub async fn initialize(&self) {
        self.session.initialize().await;
    }

    /// Returns true if playback will produce sound.
    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    /// Returns true if an initialize is in flight.
    pub fn is_loading(&self) -> bool {
        self.session.is_loading()
    }

    /// Plays a single note for a musical duration. Initializes the session
    /// on first use. The release is scheduled on the runtime and fires even
    /// if the note is stopped early in the meantime.
    pub async fn play_note(
        &self,
        token: &str,
        octave: Option<i8>,
        duration: Option<&str>,
        velocity: Option<f32>,
    ) {
        self.session.initialize().await;

        let _enter = self.span.enter();
        let pitch = resolve(token, octave);
        let velocity = velocity.unwrap_or(DEFAULT_NOTE_VELOCITY);
        let length = self.parse_duration(duration, DEFAULT_NOTE_DURATION);

        info!(pitch = %pitch, length = ?length, velocity, "Playing note");
        self.session.attack(pitch, velocity);
        self.schedule_release(vec![pitch], length);
    }

    /// Plays several notes together for a musical duration. All attacks
    /// happen before a single shared release timer is scheduled, so the
    /// chord starts and ends as one.
    pub async fn play_chord(
        &self,
        tokens: &[String],
        octave: Option<i8>,
        duration: Option<&str>,
        velocity: Option<f32>,
    ) {
        self.session.initialize().await;

        let _enter = self.span.enter();
        let pitches: Vec<CanonicalPitch> =
            tokens.iter().map(|token| resolve(token, octave)).collect();
        if pitches.is_empty() {
            debug!("Ignoring empty chord");
            return;
        }
        let velocity = velocity.unwrap_or(DEFAULT_CHORD_VELOCITY);
        let length = self.parse_duration(duration, DEFAULT_CHORD_DURATION);

        info!(chord = ?pitches.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
            length = ?length, velocity, "Playing chord");
        for pitch in &pitches {
            self.session.attack(*pitch, velocity);
        }
        self.schedule_release(pitches, length);
    }

    /// Starts a note sounding until released. Does not initialize; before the
    /// session is playable this is a logged no-op.
    pub fn trigger_attack(&self, token: &str, octave: Option<i8>, velocity: f32) {
        let _enter = self.span.enter();
        self.session.attack(resolve(token, octave), velocity);
    }

    /// Releases a held note.
    pub fn trigger_release(&self, token: &str, octave: Option<i8>) {
        let _enter = self.span.enter();
        self.session.release(resolve(token, octave));
    }

    /// Releases everything currently sounding. Pending timed releases are
    /// left to fire; releasing an already-released note is harmless.
    pub fn stop_all_notes(&self) {
        let _enter = self.span.enter();
        self.session.stop_all();
    }

    /// Sets the master volume.
    pub fn set_volume(&self, level: f32) {
        self.session.set_volume(level);
    }

    /// Switches to a different instrument. The new instrument loads on the
    /// next play or initialize.
    pub fn set_instrument(&self, name: &str) {
        let _enter = self.span.enter();
        self.session.set_instrument(name);
    }

    /// Parses an optional duration string, falling back to the operation's
    /// default when it is absent or malformed.
    fn parse_duration(&self, duration: Option<&str>, default: DurationSpec) -> Duration {
        let spec = match duration {
            Some(duration) => match duration.parse::<DurationSpec>() {
                Ok(spec) => spec,
                Err(e) => {
                    warn!(err = %e, default = %default, "Bad duration, using default");
                    default
                }
            },
            None => default,
        };
        spec.to_duration(self.tempo)
    }

    /// Schedules one release for the given pitches.
    fn schedule_release(&self, pitches: Vec<CanonicalPitch>, length: Duration) {
        let session = self.session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(length).await;
            for pitch in pitches {
                session.release(pitch);
            }
        });
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("session", &self.session)
            .field("tempo", &self.tempo.bpm())
            .finish()
    }
}
