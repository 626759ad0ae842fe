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
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A release handle is shared between the instrument session and a sounding
/// voice in the mixer. Releasing it asks the voice to enter its release
/// envelope; the mixer marks the handle finished once the voice has fully
/// decayed and been dropped. Releasing an already-released or finished voice
/// is a no-op, which lets redundant releases (e.g. a chord timer firing after
/// a stop-all) stay harmless.
#[derive(Clone)]
pub struct ReleaseHandle {
    /// Set once the session has requested the release envelope.
    released: Arc<AtomicBool>,
    /// Set by the mixer once the voice has decayed to silence.
    finished: Arc<AtomicBool>,
}

impl ReleaseHandle {
    /// Creates a new release handle.
    pub fn new() -> ReleaseHandle {
        ReleaseHandle {
            released: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests the voice's release envelope. Idempotent.
    pub fn release(&self) {
        self.released.store(true, Ordering::Relaxed);
    }

    /// Returns true if a release has been requested.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Relaxed)
    }

    /// Marks the voice as fully decayed. Called from the audio callback.
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    /// Returns true if the voice has fully decayed.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

impl Default for ReleaseHandle {
    fn default() -> ReleaseHandle {
        ReleaseHandle::new()
    }
}
