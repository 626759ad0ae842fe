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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use tracing::info;

use crate::audio::mixer::Mixer;

const MOCK_CHANNELS: u16 = 2;
const MOCK_SAMPLE_RATE: u32 = 44100;

/// A mock device. Produces no sound, but drives the mixer at roughly
/// real-time speed so that envelopes advance and finished voices are dropped.
#[derive(Clone)]
pub struct Device {
    name: String,
    started: Arc<AtomicBool>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns true if the device has been started.
    #[cfg(test)]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }
}

impl crate::audio::Device for Device {
    fn num_channels(&self) -> u16 {
        MOCK_CHANNELS
    }

    fn sample_rate(&self) -> u32 {
        MOCK_SAMPLE_RATE
    }

    fn start(&self, mixer: Arc<Mixer>) -> Result<(), Box<dyn Error>> {
        info!(device = self.name, "Starting mock audio output.");
        self.started.store(true, Ordering::Relaxed);

        thread::spawn(move || {
            // 512 frames at 44.1kHz is ~11.6ms per buffer.
            let mut buffer = vec![0.0f32; 512 * MOCK_CHANNELS as usize];
            loop {
                mixer.fill(&mut buffer);
                thread::sleep(Duration::from_millis(11));
            }
        });

        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
