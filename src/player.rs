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
use std::error::Error;
use std::sync::Arc;

use midly::live::LiveEvent;
use midly::MidiMessage;
use tokio::time::Instant;
use tracing::{debug, info, span, Level, Span};

use crate::midi;
use crate::tracks::Loop;

/// The All Notes Off controller number, sent when playback stops so no notes
/// are left hanging.
const ALL_NOTES_OFF: u8 = 123;

/// The playback state for one loop: which loop and slot, when the current
/// cycle started, and which delivery is due next. At most one session exists
/// at a time.
struct Session {
    track: Arc<Loop>,
    index: usize,
    /// The instant the current cycle started. Rebased to "now" on every
    /// cycle restart.
    start: Instant,
    /// Index of the next message to deliver. Equal to the message count when
    /// the next step is the cycle restart.
    next: usize,
    /// When the next delivery is due.
    deadline: Instant,
}

/// Replays a loop's messages at their recorded offsets, cycling until
/// stopped. The player holds no timer of its own: the looper task is the only
/// caller, sleeps until [`Player::deadline`], and then calls
/// [`Player::fire`], so sends always happen in deadline order on that task.
pub struct Player {
    device: Arc<dyn midi::Device>,
    session: Option<Session>,
    span: Span,
}

impl Player {
    /// Creates a player that sends through the given output device.
    pub fn new(device: Arc<dyn midi::Device>) -> Player {
        Player {
            device,
            session: None,
            span: span!(Level::INFO, "player"),
        }
    }

    /// Starts playing the given loop from the beginning, replacing any
    /// current session. The first delivery is the first message, or the cycle
    /// restart itself for a loop with no messages: a rest loop still elapses
    /// and restarts.
    pub fn play(&mut self, index: usize, track: Arc<Loop>) {
        let _enter = self.span.enter();

        let start = Instant::now();
        let deadline = match track.messages().first() {
            Some(first) => start + first.offset,
            None => start + track.duration(),
        };

        info!(track = format!("{}", track), slot = index, "Starting playback.");
        self.session = Some(Session {
            track,
            index,
            start,
            next: 0,
            deadline,
        });
    }

    /// Stops playback. If a session was active, its pending delivery is
    /// discarded and an All Notes Off is sent; once this returns, the old
    /// session can never send again. Stopping an idle player is a no-op.
    pub fn stop(&mut self) -> Result<(), Box<dyn Error>> {
        let _enter = self.span.enter();

        match self.session.take() {
            Some(session) => {
                info!(slot = session.index, "Stopping playback.");
                self.send_all_notes_off()
            }
            None => Ok(()),
        }
    }

    /// The slot of the loop being played, if any.
    pub fn track_index(&self) -> Option<usize> {
        self.session.as_ref().map(|session| session.index)
    }

    /// The instant the next delivery is due, if a loop is playing.
    pub fn deadline(&self) -> Option<Instant> {
        self.session.as_ref().map(|session| session.deadline)
    }

    /// Delivers the next due step: sends the message whose deadline was
    /// reached and schedules the following one, or restarts the cycle. One
    /// step per call, so a backlog drains in order through the caller's loop
    /// rather than bursting here.
    pub fn fire(&mut self) -> Result<(), Box<dyn Error>> {
        let _enter = self.span.enter();

        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return Ok(()),
        };

        let messages = session.track.messages();
        if session.next < messages.len() {
            self.device.send(&messages[session.next].raw)?;

            session.next += 1;
            session.deadline = if session.next < messages.len() {
                session.start + messages[session.next].offset
            } else {
                session.start + session.track.duration()
            };
        } else {
            // Restart the cycle, rebasing the start instant to now rather
            // than advancing it by the loop duration.
            session.start = Instant::now();
            session.next = 0;
            session.deadline = match messages.first() {
                Some(first) => session.start + first.offset,
                None => session.start + session.track.duration(),
            };
            debug!(slot = session.index, "Loop cycle restarted.");
        }

        Ok(())
    }

    fn send_all_notes_off(&self) -> Result<(), Box<dyn Error>> {
        let event = LiveEvent::Midi {
            channel: 0.into(),
            message: MidiMessage::Controller {
                controller: ALL_NOTES_OFF.into(),
                value: 0.into(),
            },
        };

        let mut buf: Vec<u8> = Vec::with_capacity(8);
        event.write(&mut buf)?;
        self.device.send(&buf)
    }
}
