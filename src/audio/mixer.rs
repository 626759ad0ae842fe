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

//! Core mixing logic shared by the CPAL and mock audio backends.
//!
//! Voices are handed to the mixer over a channel so that triggering a note
//! never contends with the audio callback; the callback drains the channel at
//! the top of each buffer.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::source::Source;

/// Sender half used by the instrument session to add voices.
pub type SourceSender = crossbeam_channel::Sender<Box<dyn Source>>;

/// Mixes active voice sources into interleaved output buffers.
pub struct Mixer {
    /// Active sources. Locked only by the audio callback and `stop` paths.
    sources: Mutex<Vec<Box<dyn Source>>>,
    /// Incoming sources from the instrument session.
    source_rx: crossbeam_channel::Receiver<Box<dyn Source>>,
    /// Master gain, stored as f32 bits for lock-free access.
    master_gain: AtomicU32,
    num_channels: u16,
    sample_rate: u32,
}

impl Mixer {
    /// Creates a new mixer and the sender used to add voices to it.
    pub fn new(num_channels: u16, sample_rate: u32) -> (Mixer, SourceSender) {
        let (source_tx, source_rx) = crossbeam_channel::unbounded();
        (
            Mixer {
                sources: Mutex::new(Vec::new()),
                source_rx,
                master_gain: AtomicU32::new(1.0f32.to_bits()),
                num_channels,
                sample_rate,
            },
            source_tx,
        )
    }

    /// Fills an interleaved output buffer. The mono voice mix is written to
    /// every output channel.
    pub fn fill(&self, buffer: &mut [f32]) {
        let mut sources = self.sources.lock();

        while let Ok(source) = self.source_rx.try_recv() {
            sources.push(source);
        }

        let gain = self.master_gain();
        let channels = self.num_channels as usize;

        for frame in buffer.chunks_mut(channels) {
            let mut mixed = 0.0f32;
            sources.retain_mut(|source| match source.next_sample() {
                Some(sample) => {
                    mixed += sample;
                    true
                }
                None => {
                    source.handle().mark_finished();
                    false
                }
            });

            let value = mixed * gain;
            for out in frame.iter_mut() {
                *out = value;
            }
        }
    }

    /// Sets the master gain, clamped to [0, 1].
    pub fn set_master_gain(&self, gain: f32) {
        let clamped = gain.clamp(0.0, 1.0);
        if clamped != gain {
            debug!(gain, "Master gain clamped");
        }
        self.master_gain.store(clamped.to_bits(), Ordering::Relaxed);
    }

    /// The current master gain.
    pub fn master_gain(&self) -> f32 {
        f32::from_bits(self.master_gain.load(Ordering::Relaxed))
    }

    /// The number of sources currently held by the mixer, including any that
    /// have been sent but not yet picked up by the callback.
    pub fn active_count(&self) -> usize {
        self.sources.lock().len() + self.source_rx.len()
    }

    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("active_sources", &self.active_count())
            .field("num_channels", &self.num_channels)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::audio::source::SampleSource;
    use crate::playsync::ReleaseHandle;

    fn constant_source(value: f32, frames: usize, handle: ReleaseHandle) -> Box<dyn Source> {
        // Rely on the sample attack ramp being shorter than the data.
        Box::new(SampleSource::new(
            Arc::new(vec![value; frames]),
            1,
            1.0,
            1.0,
            44100,
            handle,
        ))
    }

    #[test]
    fn test_mix_sums_sources_and_duplicates_channels() {
        let (mixer, source_tx) = Mixer::new(2, 44100);

        source_tx
            .send(constant_source(0.25, 44100, ReleaseHandle::new()))
            .unwrap();
        source_tx
            .send(constant_source(0.5, 44100, ReleaseHandle::new()))
            .unwrap();

        // Run past the attack ramp, then inspect a fresh buffer.
        let mut warmup = vec![0.0f32; 2 * 1000];
        mixer.fill(&mut warmup);

        let mut buffer = vec![0.0f32; 2 * 4];
        mixer.fill(&mut buffer);
        for frame in buffer.chunks(2) {
            assert!((frame[0] - 0.75).abs() < 1e-5, "mix: {}", frame[0]);
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_master_gain_applies_and_clamps() {
        let (mixer, source_tx) = Mixer::new(1, 44100);
        source_tx
            .send(constant_source(0.5, 44100, ReleaseHandle::new()))
            .unwrap();

        mixer.set_master_gain(0.5);
        assert_eq!(0.5, mixer.master_gain());

        let mut warmup = vec![0.0f32; 1000];
        mixer.fill(&mut warmup);
        let mut buffer = vec![0.0f32; 4];
        mixer.fill(&mut buffer);
        assert!((buffer[0] - 0.25).abs() < 1e-5);

        mixer.set_master_gain(3.0);
        assert_eq!(1.0, mixer.master_gain());
        mixer.set_master_gain(-1.0);
        assert_eq!(0.0, mixer.master_gain());
    }

    #[test]
    fn test_finished_sources_are_dropped_and_marked() {
        let (mixer, source_tx) = Mixer::new(1, 44100);
        let handle = ReleaseHandle::new();
        source_tx.send(constant_source(0.5, 16, handle.clone())).unwrap();

        assert_eq!(1, mixer.active_count());

        let mut buffer = vec![0.0f32; 64];
        mixer.fill(&mut buffer);

        assert_eq!(0, mixer.active_count());
        assert!(handle.is_finished());
    }

    #[test]
    fn test_released_source_decays_out() {
        let (mixer, source_tx) = Mixer::new(1, 44100);
        let handle = ReleaseHandle::new();
        source_tx
            .send(constant_source(0.5, 44100 * 10, handle.clone()))
            .unwrap();

        let mut buffer = vec![0.0f32; 1024];
        mixer.fill(&mut buffer);
        assert_eq!(1, mixer.active_count());

        handle.release();
        // One release ramp is 150ms = 6615 samples at 44.1kHz.
        let mut buffer = vec![0.0f32; 8192];
        mixer.fill(&mut buffer);

        assert_eq!(0, mixer.active_count());
        assert!(handle.is_finished());
    }
}
