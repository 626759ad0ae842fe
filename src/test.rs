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
    path::PathBuf,
    thread,
    time::{Duration, SystemTime},
};

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed().expect("System time error");

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}

/// Writes a 16-bit PCM WAV file into the temp directory and returns its
/// path. The data is a low-amplitude ramp so it is non-silent.
pub fn write_test_wav(name: &str, frames: u32, channels: u16, sample_rate: u32) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "klavier-test-{}-{}x{}-{}.wav",
        name, frames, channels, sample_rate
    ));

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("failed to create test wav");
    for i in 0..(frames * channels as u32) {
        let value = ((i % 100) as i16) * 300;
        writer.write_sample(value).expect("failed to write sample");
    }
    writer.finalize().expect("failed to finalize test wav");
    path
}
