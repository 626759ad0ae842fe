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

//! Voice sources mixed into the audio output.
//!
//! Two source kinds exist, matching the two instrument voices: pitch-shifted
//! playback of an in-memory sample, and a triangle oscillator used by the
//! fallback voice. Both run a linear attack/release envelope driven by the
//! shared [`ReleaseHandle`].

use std::sync::Arc;

use crate::playsync::ReleaseHandle;

/// Attack ramp applied to every voice to avoid clicks.
const ATTACK: std::time::Duration = std::time::Duration::from_millis(5);
/// Release ramp for sampled voices.
pub const SAMPLE_RELEASE: std::time::Duration = std::time::Duration::from_millis(150);
/// Release ramp for the synthesized fallback voice.
pub const SYNTH_RELEASE: std::time::Duration = std::time::Duration::from_millis(250);

/// A mono audio source owned by the mixer.
pub trait Source: Send {
    /// Produces the next sample, or `None` once the source has fully decayed
    /// (at which point the mixer drops it and marks its handle finished).
    fn next_sample(&mut self) -> Option<f32>;

    /// The release handle shared with the instrument session.
    fn handle(&self) -> &ReleaseHandle;
}

/// Linear attack/release envelope, advanced once per output sample.
struct Envelope {
    attack_samples: u64,
    release_samples: u64,
    position: u64,
    /// Sample position at which the release started, if it has.
    release_start: Option<(u64, f32)>,
}

impl Envelope {
    fn new(sample_rate: u32, release: std::time::Duration) -> Envelope {
        Envelope {
            attack_samples: (ATTACK.as_secs_f64() * sample_rate as f64) as u64,
            release_samples: ((release.as_secs_f64() * sample_rate as f64) as u64).max(1),
            position: 0,
            release_start: None,
        }
    }

    /// The gain for the current sample, or `None` once the release has run
    /// its course. `released` reflects the voice's release handle.
    fn next_gain(&mut self, released: bool) -> Option<f32> {
        let sustain = if self.position >= self.attack_samples || self.attack_samples == 0 {
            1.0
        } else {
            self.position as f32 / self.attack_samples as f32
        };

        if released && self.release_start.is_none() {
            self.release_start = Some((self.position, sustain));
        }

        let gain = match self.release_start {
            Some((start, level)) => {
                let elapsed = self.position - start;
                if elapsed >= self.release_samples {
                    return None;
                }
                level * (1.0 - elapsed as f32 / self.release_samples as f32)
            }
            None => sustain,
        };

        self.position += 1;
        Some(gain)
    }
}

/// Plays an in-memory sample at an adjustable rate. The rate folds together
/// the sample-rate ratio and the pitch shift away from the sample's recorded
/// pitch, using the same linear interpolation as the sample loader.
pub struct SampleSource {
    /// Interleaved sample data, shared with the loader cache.
    data: Arc<Vec<f32>>,
    channel_count: u16,
    /// Fractional frame position into the data.
    position: f64,
    /// Frames advanced per output sample.
    rate: f64,
    gain: f32,
    envelope: Envelope,
    handle: ReleaseHandle,
}

impl SampleSource {
    pub fn new(
        data: Arc<Vec<f32>>,
        channel_count: u16,
        rate: f64,
        gain: f32,
        sample_rate: u32,
        handle: ReleaseHandle,
    ) -> SampleSource {
        SampleSource {
            data,
            channel_count,
            position: 0.0,
            rate,
            gain,
            envelope: Envelope::new(sample_rate, SAMPLE_RELEASE),
            handle,
        }
    }

    /// Reads the downmixed-to-mono value of the given frame, linearly
    /// interpolated across the fractional position.
    fn frame_at(&self, position: f64) -> Option<f32> {
        let channels = self.channel_count as usize;
        let frames = self.data.len() / channels;
        let frame = position.floor() as usize;
        if frame >= frames {
            return None;
        }

        let frac = position.fract() as f32;
        let mut mixed = 0.0f32;
        for channel in 0..channels {
            let s0 = self.data[frame * channels + channel];
            let s1 = self
                .data
                .get((frame + 1) * channels + channel)
                .copied()
                .unwrap_or(s0);
            mixed += s0 + (s1 - s0) * frac;
        }
        Some(mixed / channels as f32)
    }
}

impl Source for SampleSource {
    fn next_sample(&mut self) -> Option<f32> {
        let gain = self.envelope.next_gain(self.handle.is_released())?;
        let sample = self.frame_at(self.position)?;
        self.position += self.rate;
        Some(sample * self.gain * gain)
    }

    fn handle(&self) -> &ReleaseHandle {
        &self.handle
    }
}

/// A triangle oscillator for the fallback voice. Sustains indefinitely until
/// its handle is released.
pub struct OscillatorSource {
    /// Phase in [0, 1).
    phase: f64,
    /// Phase advance per output sample.
    step: f64,
    gain: f32,
    envelope: Envelope,
    handle: ReleaseHandle,
}

impl OscillatorSource {
    pub fn new(frequency: f64, gain: f32, sample_rate: u32, handle: ReleaseHandle) -> OscillatorSource {
        OscillatorSource {
            phase: 0.0,
            step: frequency / sample_rate as f64,
            gain,
            envelope: Envelope::new(sample_rate, SYNTH_RELEASE),
            handle,
        }
    }
}

impl Source for OscillatorSource {
    fn next_sample(&mut self) -> Option<f32> {
        let gain = self.envelope.next_gain(self.handle.is_released())?;

        let value = if self.phase < 0.5 {
            4.0 * self.phase - 1.0
        } else {
            3.0 - 4.0 * self.phase
        } as f32;

        self.phase += self.step;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        Some(value * self.gain * gain)
    }

    fn handle(&self) -> &ReleaseHandle {
        &self.handle
    }
}
