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
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use tracing::{error, info, span, Level};

use crate::audio::mixer::Mixer;
use crate::config;

/// A real audio output backed by cpal.
pub struct Device {
    name: String,
    num_channels: u16,
    sample_rate: u32,
}

impl Device {
    /// Lists cpal output devices.
    pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn Error>> {
        let host = cpal::default_host();
        let mut devices: Vec<Box<dyn super::Device>> = Vec::new();

        for device in host.output_devices()? {
            let name = device.name()?;
            let config = match device.default_output_config() {
                Ok(config) => config,
                Err(e) => {
                    error!(device = name, err = e.to_string(), "Skipping device");
                    continue;
                }
            };
            devices.push(Box::new(Device {
                name,
                num_channels: config.channels(),
                sample_rate: config.sample_rate().0,
            }));
        }

        Ok(devices)
    }

    /// Gets the configured device, or the host default when the config names
    /// none.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let device = find_output_device(config.device())?;
        let name = device.name()?;
        let output_config = device.default_output_config()?;

        Ok(Device {
            name,
            num_channels: output_config.channels(),
            sample_rate: output_config.sample_rate().0,
        })
    }
}

/// Finds a cpal output device by name, or the default device for an empty or
/// "default" name.
fn find_output_device(name: &str) -> Result<cpal::Device, Box<dyn Error>> {
    let host = cpal::default_host();

    if name.is_empty() || name == "default" {
        return host
            .default_output_device()
            .ok_or_else(|| "no default audio output device".into());
    }

    for device in host.output_devices()? {
        if device.name()? == name {
            return Ok(device);
        }
    }

    Err(format!("no audio output device named '{}'", name).into())
}

impl super::Device for Device {
    fn num_channels(&self) -> u16 {
        self.num_channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Starts the output stream. The stream is created and owned by a
    /// dedicated thread, since cpal streams can't move between threads.
    fn start(&self, mixer: Arc<Mixer>) -> Result<(), Box<dyn Error>> {
        let name = self.name.clone();
        let (started_tx, started_rx) = mpsc::channel::<Result<(), String>>();

        thread::spawn(move || {
            let span = span!(Level::INFO, "cpal output");
            let _enter = span.enter();

            match run_output(&name, mixer) {
                Ok(_stream) => {
                    if started_tx.send(Ok(())).is_err() {
                        return;
                    }
                    info!(device = name, "Audio output started.");
                    // Keep the stream alive for the life of the process.
                    loop {
                        thread::park();
                    }
                }
                Err(e) => {
                    let _ = started_tx.send(Err(e.to_string()));
                }
            }
        });

        started_rx
            .recv_timeout(Duration::from_secs(10))
            .map_err(|e| format!("audio output never started: {}", e))?
            .map_err(|e| e.into())
    }
}

/// Builds and starts the output stream for the named device. Returns the
/// stream so the owning thread can keep it alive.
fn run_output(name: &str, mixer: Arc<Mixer>) -> Result<cpal::Stream, Box<dyn Error>> {
    let device = find_output_device(name)?;
    let config = device.default_output_config()?;
    let stream_config = cpal::StreamConfig {
        channels: mixer.num_channels(),
        sample_rate: cpal::SampleRate(mixer.sample_rate()),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, mixer)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, mixer)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, mixer)?,
        format => return Err(format!("unsupported sample format {:?}", format).into()),
    };

    stream.play()?;
    Ok(stream)
}

/// Builds an output stream that fills from the mixer and converts from f32 to
/// the stream's sample type.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mixer>,
) -> Result<cpal::Stream, Box<dyn Error>>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            mixer.fill(&mut scratch);
            for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                *out = T::from_sample(*sample);
            }
        },
        |err| error!(err = err.to_string(), "Output stream error"),
        None,
    )?;
    Ok(stream)
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (channels={}, rate={})",
            self.name, self.num_channels, self.sample_rate
        )
    }
}
