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
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::util;

/// The number of track slots available to the looper.
pub const NUM_TRACKS: usize = 10;

/// A raw MIDI message captured during recording, with its offset from the
/// start of the recording cycle.
#[derive(Debug, Clone)]
pub struct TimedMessage {
    /// Time elapsed between the start of the cycle and this message.
    pub offset: Duration,
    /// The raw MIDI message bytes, replayed verbatim.
    pub raw: Vec<u8>,
}

/// A captured performance: an ordered sequence of timed messages plus the
/// total cycle duration. Immutable once built; shared between the track store
/// and the player as `Arc<Loop>`.
pub struct Loop {
    messages: Vec<TimedMessage>,
    duration: Duration,
}

impl Loop {
    /// Creates a new loop. Messages must be in capture order; the duration is
    /// the full cycle length, which is normally at least the last offset.
    pub fn new(messages: Vec<TimedMessage>, duration: Duration) -> Loop {
        Loop { messages, duration }
    }

    /// The captured messages in capture order.
    pub fn messages(&self) -> &[TimedMessage] {
        &self.messages
    }

    /// The total cycle duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl fmt::Display for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} messages, {}",
            self.messages.len(),
            util::duration_minutes_seconds(self.duration)
        )
    }
}

/// The looper's track storage: a fixed set of slots, each of which may hold
/// one recorded loop, plus the currently selected slot. Only the looper task
/// mutates this.
pub struct Tracks {
    slots: [Option<Arc<Loop>>; NUM_TRACKS],
    selected: usize,
}

impl Tracks {
    /// Creates an empty track store with the first slot selected.
    pub fn new() -> Tracks {
        Tracks {
            slots: Default::default(),
            selected: 0,
        }
    }

    /// The currently selected slot index.
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Moves the selection cursor. Callers validate the index against
    /// [`NUM_TRACKS`] before calling.
    pub fn select(&mut self, index: usize) {
        self.selected = index;
    }

    /// Stores a loop in the selected slot, replacing whatever it held.
    pub fn store(&mut self, track: Arc<Loop>) {
        self.slots[self.selected] = Some(track);
    }

    /// Returns the loop held by the given slot, if any.
    pub fn get(&self, index: usize) -> Option<Arc<Loop>> {
        self.slots.get(index).and_then(|slot| slot.clone())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{Loop, TimedMessage, Tracks, NUM_TRACKS};

    fn short_loop(messages: usize) -> Arc<Loop> {
        let messages = (0..messages)
            .map(|i| TimedMessage {
                offset: Duration::from_millis(i as u64 * 100),
                raw: vec![0x90, 60 + i as u8, 100],
            })
            .collect();
        Arc::new(Loop::new(messages, Duration::from_secs(1)))
    }

    #[test]
    fn test_store_uses_selected_slot() {
        let mut tracks = Tracks::new();
        assert_eq!(tracks.selected(), 0);
        assert!(tracks.get(0).is_none());

        tracks.store(short_loop(1));
        assert_eq!(tracks.get(0).expect("expected loop").messages().len(), 1);

        tracks.select(7);
        tracks.store(short_loop(2));
        assert_eq!(tracks.get(7).expect("expected loop").messages().len(), 2);
        assert_eq!(tracks.get(0).expect("expected loop").messages().len(), 1);

        // Storing again replaces the slot contents.
        tracks.store(short_loop(3));
        assert_eq!(tracks.get(7).expect("expected loop").messages().len(), 3);
    }

    #[test]
    fn test_get_out_of_range_is_none() {
        let tracks = Tracks::new();
        assert!(tracks.get(NUM_TRACKS).is_none());
        assert!(tracks.get(usize::MAX).is_none());
    }

    #[test]
    fn test_loop_display() {
        assert_eq!(format!("{}", short_loop(2)), "2 messages, 0:01");
        assert_eq!(
            format!("{}", Loop::new(Vec::new(), Duration::from_secs(65))),
            "0 messages, 1:05"
        );
    }
}
