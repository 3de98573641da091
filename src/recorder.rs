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
use tokio::time::Instant;
use tracing::{debug, info, span, Level, Span};

use crate::tracks::{Loop, TimedMessage};

/// Captures a live performance. The recorder notes the instant it was started
/// and stores each incoming message with its offset from that instant;
/// finishing freezes the capture into a [`Loop`]. The looper owns at most one
/// recorder at a time.
pub struct Recorder {
    start: Instant,
    messages: Vec<TimedMessage>,
    span: Span,
}

impl Recorder {
    /// Starts a new recording at the given instant.
    pub fn start(now: Instant) -> Recorder {
        Recorder {
            start: now,
            messages: Vec::new(),
            span: span!(Level::INFO, "recorder"),
        }
    }

    /// Captures a message stamped with its arrival instant. Offsets are
    /// relative to the start of the recording and non-decreasing as long as
    /// messages arrive in order.
    pub fn record(&mut self, at: Instant, raw: Vec<u8>) {
        let _enter = self.span.enter();

        let offset = at.duration_since(self.start);
        debug!(offset = format!("{:?}", offset), "Captured message.");
        self.messages.push(TimedMessage { offset, raw });
    }

    /// Finishes the recording, freezing the captured messages into a loop
    /// whose cycle duration is the total time the recorder ran.
    pub fn finish(self, now: Instant) -> Loop {
        let _enter = self.span.enter();

        let duration = now.duration_since(self.start);
        info!(
            messages = self.messages.len(),
            duration = format!("{:?}", duration),
            "Recording finished."
        );
        Loop::new(self.messages, duration)
    }
}
