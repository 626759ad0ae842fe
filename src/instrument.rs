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

//! The instrument session.
//!
//! Owns the readiness state machine and the sounding voices. A session starts
//! uninitialized and becomes playable through [`InstrumentSession::initialize`],
//! which loads the selected instrument's samples. A failed or empty sample
//! load never surfaces to callers; the session falls back to a synthesized
//! voice and reports itself ready. Changing the instrument is the only way a
//! playable session becomes unplayable again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::audio::mixer::{Mixer, SourceSender};
use crate::audio::source::{OscillatorSource, SampleSource, Source};
use crate::config;
use crate::note::CanonicalPitch;
use crate::playsync::ReleaseHandle;
use crate::samples::{LoadedSample, SampleLoader};

/// Gain trim for the synthesized voice. A raw triangle wave is much louder
/// than a typical piano sample.
const SYNTH_GAIN: f32 = 0.3;

/// The readiness of an instrument session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No voice exists yet. Playback requests are ignored.
    Uninitialized,
    /// An initialize is in flight.
    Initializing,
    /// The sampled voice is loaded and playable.
    Ready,
    /// The sampled voice could not be built; the synth voice is playable.
    FallbackReady,
}

impl SessionState {
    /// Returns true if playback requests will produce sound.
    pub fn is_playable(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::FallbackReady)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Initializing => write!(f, "initializing"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::FallbackReady => write!(f, "ready (synth fallback)"),
        }
    }
}

/// The sound a voice makes.
enum VoiceKind {
    /// Sampled playback, keyed by the MIDI number of each sample's pitch.
    /// Unmapped pitches play the nearest sample shifted by the semitone
    /// difference.
    Sample(HashMap<u8, LoadedSample>),
    /// Triangle oscillator at the pitch's frequency.
    Synth,
}

/// A playable voice. Tracks the sounding notes so that releases and stops can
/// find their handles.
struct Voice {
    kind: VoiceKind,
    /// Release handles of sounding notes by pitch.
    active: Mutex<HashMap<CanonicalPitch, ReleaseHandle>>,
    source_tx: SourceSender,
    /// Output sample rate, for envelope timing and pitch-shift ratios.
    sample_rate: u32,
}

impl Voice {
    fn sample(samples: HashMap<u8, LoadedSample>, source_tx: SourceSender, sample_rate: u32) -> Voice {
        Voice {
            kind: VoiceKind::Sample(samples),
            active: Mutex::new(HashMap::new()),
            source_tx,
            sample_rate,
        }
    }

    fn synth(source_tx: SourceSender, sample_rate: u32) -> Voice {
        Voice {
            kind: VoiceKind::Synth,
            active: Mutex::new(HashMap::new()),
            source_tx,
            sample_rate,
        }
    }

    /// Starts the given pitch sounding. Retriggering a pitch that is already
    /// sounding releases the old note and starts a new one.
    fn attack(&self, pitch: CanonicalPitch, velocity: f32) {
        let velocity = velocity.clamp(0.0, 1.0);
        let handle = ReleaseHandle::new();

        let source: Box<dyn Source> = match &self.kind {
            VoiceKind::Sample(samples) => {
                let target = pitch.midi();
                let nearest = samples
                    .iter()
                    .min_by_key(|(key, _)| (**key as i16 - target as i16).abs());
                let (key, sample) = match nearest {
                    Some(nearest) => nearest,
                    None => {
                        warn!(pitch = %pitch, "Sampled voice has no samples");
                        return;
                    }
                };

                let shift = 2f64.powf((target as f64 - *key as f64) / 12.0);
                let rate = shift * sample.sample_rate() as f64 / self.sample_rate as f64;
                Box::new(SampleSource::new(
                    sample.data(),
                    sample.channel_count(),
                    rate,
                    velocity,
                    self.sample_rate,
                    handle.clone(),
                ))
            }
            VoiceKind::Synth => Box::new(OscillatorSource::new(
                pitch.frequency(),
                velocity * SYNTH_GAIN,
                self.sample_rate,
                handle.clone(),
            )),
        };

        let previous = self.active.lock().insert(pitch, handle);
        if let Some(previous) = previous {
            previous.release();
        }
        if self.source_tx.send(source).is_err() {
            warn!(pitch = %pitch, "Mixer is gone, dropping note");
        }
    }

    /// Releases the given pitch if it is sounding.
    fn release(&self, pitch: CanonicalPitch) {
        if let Some(handle) = self.active.lock().remove(&pitch) {
            handle.release();
        }
    }

    /// Releases every sounding pitch.
    fn stop_all(&self) {
        let mut active = self.active.lock();
        for (_, handle) in active.drain() {
            handle.release();
        }
    }

    /// The number of pitches the session considers sounding. Prunes notes
    /// whose sources have already decayed out of the mixer.
    fn sounding_count(&self) -> usize {
        let mut active = self.active.lock();
        active.retain(|_, handle| !handle.is_finished());
        active.len()
    }
}

/// The instrument session. Thread safe; playback entry points are synchronous
/// so they can be driven from MIDI callbacks.
pub struct InstrumentSession {
    state: RwLock<SessionState>,
    voice: RwLock<Option<Voice>>,
    /// Serializes initialization so concurrent requests collapse into one
    /// load.
    init_lock: tokio::sync::Mutex<()>,
    /// The currently selected instrument name.
    instrument: RwLock<String>,
    /// The available instrument definitions.
    instruments: HashMap<String, config::Instrument>,
    mixer: Arc<Mixer>,
    source_tx: SourceSender,
    /// The number of voice constructions performed.
    initializations: AtomicUsize,
}

impl InstrumentSession {
    /// Creates a new, uninitialized session playing into the given mixer.
    pub fn new(
        mixer: Arc<Mixer>,
        source_tx: SourceSender,
        instruments: HashMap<String, config::Instrument>,
        instrument: &str,
    ) -> InstrumentSession {
        InstrumentSession {
            state: RwLock::new(SessionState::Uninitialized),
            voice: RwLock::new(None),
            init_lock: tokio::sync::Mutex::new(()),
            instrument: RwLock::new(instrument.to_string()),
            instruments,
            mixer,
            source_tx,
            initializations: AtomicUsize::new(0),
        }
    }

    /// The current session state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Returns true if playback requests will produce sound.
    pub fn is_ready(&self) -> bool {
        self.state().is_playable()
    }

    /// Returns true if an initialize is in flight.
    pub fn is_loading(&self) -> bool {
        self.state() == SessionState::Initializing
    }

    /// The currently selected instrument name.
    pub fn instrument(&self) -> String {
        self.instrument.read().clone()
    }

    /// The number of pitches currently sounding.
    pub fn sounding_count(&self) -> usize {
        match &*self.voice.read() {
            Some(voice) => voice.sounding_count(),
            None => 0,
        }
    }

    /// Builds the voice for the selected instrument. Safe to call any number
    /// of times from any number of tasks; concurrent calls collapse into one
    /// load and calls on a playable session return immediately. This never
    /// fails: if the instrument's samples can't be loaded the session falls
    /// back to the synth voice.
    pub async fn initialize(&self) {
        if self.state().is_playable() {
            return;
        }

        let _guard = self.init_lock.lock().await;
        if self.state().is_playable() {
            return;
        }
        *self.state.write() = SessionState::Initializing;
        self.initializations.fetch_add(1, Ordering::Relaxed);

        let name = self.instrument();
        let definition = self
            .instruments
            .get(&name)
            .filter(|instrument| !instrument.samples().is_empty())
            .cloned();

        let samples = match definition {
            Some(instrument) => {
                match tokio::task::spawn_blocking(move || load_samples(&instrument)).await {
                    Ok(Ok(samples)) => Some(samples),
                    Ok(Err(e)) => {
                        warn!(
                            instrument = name,
                            err = e,
                            "Sample load failed, falling back to synth"
                        );
                        None
                    }
                    Err(e) => {
                        warn!(
                            instrument = name,
                            err = e.to_string(),
                            "Sample load task failed, falling back to synth"
                        );
                        None
                    }
                }
            }
            None => {
                debug!(instrument = name, "No samples defined, using synth voice");
                None
            }
        };

        // The instrument may have been changed while the load ran. The check
        // holds the state and voice locks that set_instrument takes, so a
        // switch cannot land between the check and the install.
        let mut state = self.state.write();
        let mut voice = self.voice.write();
        if *self.instrument.read() != name {
            debug!(instrument = name, "Instrument changed during load, discarding");
            *state = SessionState::Uninitialized;
            return;
        }

        let (new_voice, new_state) = match samples {
            Some(samples) => {
                info!(instrument = name, samples = samples.len(), "Instrument ready");
                (
                    Voice::sample(samples, self.source_tx.clone(), self.mixer.sample_rate()),
                    SessionState::Ready,
                )
            }
            None => {
                info!(instrument = name, "Instrument ready (synth fallback)");
                (
                    Voice::synth(self.source_tx.clone(), self.mixer.sample_rate()),
                    SessionState::FallbackReady,
                )
            }
        };

        *voice = Some(new_voice);
        *state = new_state;
    }

    /// Starts the given pitch sounding. Ignored with a log line when the
    /// session isn't playable.
    pub fn attack(&self, pitch: CanonicalPitch, velocity: f32) {
        if !self.state().is_playable() {
            debug!(pitch = %pitch, state = %self.state(), "Attack ignored");
            return;
        }
        if let Some(voice) = &*self.voice.read() {
            voice.attack(pitch, velocity);
        }
    }

    /// Releases the given pitch. Ignored when the session isn't playable or
    /// the pitch isn't sounding.
    pub fn release(&self, pitch: CanonicalPitch) {
        if !self.state().is_playable() {
            debug!(pitch = %pitch, state = %self.state(), "Release ignored");
            return;
        }
        if let Some(voice) = &*self.voice.read() {
            voice.release(pitch);
        }
    }

    /// Releases every sounding pitch. Notes with a release already scheduled
    /// elsewhere simply see a redundant, harmless release.
    pub fn stop_all(&self) {
        if !self.state().is_playable() {
            debug!(state = %self.state(), "Stop ignored");
            return;
        }
        if let Some(voice) = &*self.voice.read() {
            voice.stop_all();
        }
    }

    /// Sets the master volume, clamped to [0, 1]. Ignored when the session
    /// isn't playable.
    pub fn set_volume(&self, level: f32) {
        if !self.state().is_playable() {
            debug!(state = %self.state(), "Volume change ignored");
            return;
        }
        self.mixer.set_master_gain(level);
    }

    /// Selects a different instrument. Stops all sounding notes and reverts
    /// the session to uninitialized; the next initialize builds the new
    /// voice. Selecting a name with no definition is allowed and results in
    /// the synth voice.
    pub fn set_instrument(&self, name: &str) {
        let mut state = self.state.write();
        let mut voice = self.voice.write();
        if let Some(voice) = voice.take() {
            voice.stop_all();
        }
        *self.instrument.write() = name.to_string();
        *state = SessionState::Uninitialized;
        info!(instrument = name, "Instrument changed, reload required");
    }

    /// The number of voice constructions this session has performed.
    #[cfg(test)]
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for InstrumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentSession")
            .field("state", &self.state())
            .field("instrument", &self.instrument())
            .field("sounding", &self.sounding_count())
            .finish()
    }
}

/// Loads every sample of an instrument into memory. Any unreadable file fails
/// the whole load; the caller falls back to the synth voice.
fn load_samples(instrument: &config::Instrument) -> Result<HashMap<u8, LoadedSample>, String> {
    let mut loader = SampleLoader::new();
    let mut samples = HashMap::new();
    for (pitch, path) in instrument.samples() {
        let loaded = loader.load(path).map_err(|e| e.to_string())?;
        samples.insert(pitch.midi(), loaded);
    }
    debug!(
        samples = samples.len(),
        memory_kb = loader.total_memory_usage() / 1024,
        "Samples loaded"
    );
    Ok(samples)
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use super::*;
    use crate::note::resolve;
    use crate::test::{eventually, write_test_wav};

    /// Enough sample data that a load stays in flight long enough to observe.
    const SLOW_LOAD_FRAMES: u32 = 8_000_000;

    fn session(
        instruments: HashMap<String, config::Instrument>,
        instrument: &str,
    ) -> (Arc<InstrumentSession>, Arc<Mixer>) {
        let (mixer, source_tx) = Mixer::new(2, 44100);
        let mixer = Arc::new(mixer);
        let session = Arc::new(InstrumentSession::new(
            mixer.clone(),
            source_tx,
            instruments,
            instrument,
        ));
        (session, mixer)
    }

    fn sampled_piano(paths: Vec<(&str, PathBuf)>) -> HashMap<String, config::Instrument> {
        let samples = paths
            .into_iter()
            .map(|(pitch, path)| (resolve(pitch, None), path))
            .collect();
        HashMap::from([("piano".to_string(), config::Instrument::new(samples))])
    }

    #[tokio::test]
    async fn test_initialize_without_samples_falls_back() {
        let (session, _) = session(HashMap::new(), "piano");
        assert_eq!(SessionState::Uninitialized, session.state());
        assert!(!session.is_ready());

        session.initialize().await;
        assert_eq!(SessionState::FallbackReady, session.state());
        assert!(session.is_ready());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_initialize_with_samples() {
        let wav = write_test_wav("instrument-ready", 2048, 1, 44100);
        let (session, _) = session(sampled_piano(vec![("C", wav)]), "piano");

        session.initialize().await;
        assert_eq!(SessionState::Ready, session.state());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_is_loading_while_initialize_in_flight() {
        let wav_c = write_test_wav("instrument-loading-c", SLOW_LOAD_FRAMES, 1, 44100);
        let wav_g = write_test_wav("instrument-loading-g", SLOW_LOAD_FRAMES, 1, 44100);
        let (session, _) = session(sampled_piano(vec![("C", wav_c), ("G", wav_g)]), "piano");
        assert!(!session.is_loading());

        let task = {
            let session = session.clone();
            tokio::spawn(async move { session.initialize().await })
        };

        eventually(
            || session.is_loading(),
            "session never reported loading during initialize",
        );
        assert!(!session.is_ready());

        task.await.expect("initialize task failed");
        assert!(!session.is_loading());
        assert_eq!(SessionState::Ready, session.state());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_instrument_during_load_discards_result() {
        let wav = write_test_wav("instrument-mid-load", SLOW_LOAD_FRAMES, 1, 44100);
        let (session, _) = session(sampled_piano(vec![("C", wav)]), "piano");

        let task = {
            let session = session.clone();
            tokio::spawn(async move { session.initialize().await })
        };
        eventually(
            || session.is_loading(),
            "session never reported loading during initialize",
        );

        // The in-flight piano load no longer matches the selection and must
        // not be installed as the organ's voice.
        session.set_instrument("organ");
        task.await.expect("initialize task failed");
        assert_eq!(SessionState::Uninitialized, session.state());
        assert_eq!("organ", session.instrument());

        session.initialize().await;
        assert_eq!(SessionState::FallbackReady, session.state());
        assert_eq!(2, session.initializations());
    }

    #[tokio::test]
    async fn test_unreadable_samples_fall_back() {
        let instruments = sampled_piano(vec![("C", PathBuf::from("/nonexistent/C4.wav"))]);
        let (session, _) = session(instruments, "piano");

        // The failure is absorbed; the session still comes up playable.
        session.initialize().await;
        assert_eq!(SessionState::FallbackReady, session.state());
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_initializes_collapse() {
        let (session, _) = session(HashMap::new(), "piano");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let session = session.clone();
            tasks.push(tokio::spawn(async move { session.initialize().await }));
        }
        for task in tasks {
            task.await.expect("initialize task failed");
        }

        assert_eq!(1, session.initializations());

        // Initializing an already-playable session is a no-op.
        session.initialize().await;
        assert_eq!(1, session.initializations());
    }

    #[tokio::test]
    async fn test_playback_before_initialize_is_ignored() {
        let (session, mixer) = session(HashMap::new(), "piano");

        session.attack(resolve("C", None), 0.8);
        session.release(resolve("C", None));
        session.stop_all();
        session.set_volume(0.5);

        assert_eq!(0, session.sounding_count());
        assert_eq!(0, mixer.active_count());
        assert_eq!(1.0, mixer.master_gain());
    }

    #[tokio::test]
    async fn test_attack_and_release() {
        let (session, mixer) = session(HashMap::new(), "piano");
        session.initialize().await;

        session.attack(resolve("C", None), 0.8);
        assert_eq!(1, session.sounding_count());
        assert_eq!(1, mixer.active_count());

        session.attack(resolve("E", None), 0.8);
        assert_eq!(2, session.sounding_count());

        session.release(resolve("C", None));
        assert_eq!(1, session.sounding_count());

        // Releasing a pitch that isn't sounding is harmless.
        session.release(resolve("C", None));
        assert_eq!(1, session.sounding_count());
    }

    #[tokio::test]
    async fn test_retrigger_replaces_note() {
        let (session, mixer) = session(HashMap::new(), "piano");
        session.initialize().await;

        session.attack(resolve("C", None), 0.8);
        session.attack(resolve("C", None), 0.8);

        // One sounding pitch, but the old source is still decaying in the
        // mixer.
        assert_eq!(1, session.sounding_count());
        assert_eq!(2, mixer.active_count());
    }

    #[tokio::test]
    async fn test_stop_all() {
        let (session, _) = session(HashMap::new(), "piano");
        session.initialize().await;

        for token in ["C", "E", "G"] {
            session.attack(resolve(token, None), 0.6);
        }
        assert_eq!(3, session.sounding_count());

        session.stop_all();
        assert_eq!(0, session.sounding_count());
    }

    #[tokio::test]
    async fn test_set_volume() {
        let (session, mixer) = session(HashMap::new(), "piano");
        session.initialize().await;

        session.set_volume(0.25);
        assert_eq!(0.25, mixer.master_gain());
    }

    #[tokio::test]
    async fn test_set_instrument_reverts_readiness() {
        let (session, _) = session(HashMap::new(), "piano");
        session.initialize().await;
        session.attack(resolve("C", None), 0.8);
        assert!(session.is_ready());

        session.set_instrument("organ");
        assert_eq!(SessionState::Uninitialized, session.state());
        assert!(!session.is_ready());
        assert_eq!(0, session.sounding_count());
        assert_eq!("organ", session.instrument());

        session.initialize().await;
        assert!(session.is_ready());
        assert_eq!(2, session.initializations());
    }

    #[tokio::test]
    async fn test_sampled_voice_shifts_unmapped_pitches() {
        let wav = write_test_wav("instrument-shift", 2048, 1, 44100);
        let (session, mixer) = session(sampled_piano(vec![("C", wav)]), "piano");
        session.initialize().await;

        // E4 has no sample of its own; it plays the C4 sample shifted.
        session.attack(resolve("E", None), 0.8);
        assert_eq!(1, session.sounding_count());
        assert_eq!(1, mixer.active_count());
    }
}
