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
use std::future;
use std::sync::Arc;

use tokio::sync::mpsc::Receiver;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, span, warn, Level, Span};

use crate::controller::Event;
use crate::midi;
use crate::player::Player;
use crate::recorder::Recorder;
use crate::tracks::{Tracks, NUM_TRACKS};

/// The looper is in exactly one of these states; recording and playing are
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Recording,
    Playing(usize),
}

/// The looper state machine. Owns the track store, the active recorder and
/// the player; every mutation and every output send happens on the single
/// task running [`Looper::run`]. Other threads hand requests over through the
/// event channel, never by touching this directly.
pub struct Looper {
    tracks: Tracks,
    recorder: Option<Recorder>,
    player: Player,
    span: Span,
}

impl Looper {
    /// Creates a looper that plays through the given output device.
    pub fn new(output: Arc<dyn midi::Device>) -> Looper {
        Looper {
            tracks: Tracks::new(),
            recorder: None,
            player: Player::new(output),
            span: span!(Level::INFO, "looper"),
        }
    }

    /// Returns the current state of the state machine.
    pub fn state(&self) -> State {
        if self.recorder.is_some() {
            State::Recording
        } else if let Some(index) = self.player.track_index() {
            State::Playing(index)
        } else {
            State::Idle
        }
    }

    /// Runs the looper until the event channel closes. This loop interleaves
    /// control handling with playback deliveries, so sends happen strictly in
    /// deadline order with no concurrent overlap. A delivery whose deadline
    /// has already passed fires on the next turn; one delivery per turn keeps
    /// a backlog from starving control events.
    pub async fn run(mut self, mut events: Receiver<Event>) {
        info!("Looper started.");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("Looper closing.");
                        if let Err(e) = self.player.stop() {
                            error!(err = e.as_ref(), "Error stopping playback.");
                        }
                        return;
                    }
                },
                _ = next_delivery(self.player.deadline()) => {
                    if let Err(e) = self.player.fire() {
                        error!(err = e.as_ref(), "Error delivering loop message.");
                    }
                }
            }
        }
    }

    /// Handles a single control or performance event.
    fn handle_event(&mut self, event: Event) {
        let _enter = self.span.clone().entered();

        match event {
            Event::Performance { at, raw } => {
                // Without an active recorder, performance messages are dropped.
                if let Some(recorder) = self.recorder.as_mut() {
                    recorder.record(at, raw);
                }
            }
            Event::ToggleRecording => self.toggle_recording(),
            Event::SelectTrack(index) => self.select_track(index),
        }

        debug!(state = format!("{:?}", self.state()), "Handled event.");
    }

    /// Starts a recording, or finishes the one in progress, stores the loop
    /// at the selected track and plays it back. Any active playback is
    /// stopped first, so recording and playing never overlap.
    fn toggle_recording(&mut self) {
        if let Err(e) = self.player.stop() {
            error!(err = e.as_ref(), "Error stopping playback.");
        }

        match self.recorder.take() {
            None => {
                info!("Recording started.");
                self.recorder = Some(Recorder::start(Instant::now()));
            }
            Some(recorder) => {
                let track = Arc::new(recorder.finish(Instant::now()));
                info!(
                    track = format!("{}", track),
                    slot = self.tracks.selected(),
                    "Recording stored."
                );
                self.tracks.store(track);
                self.play_track(self.tracks.selected());
            }
        }
    }

    /// Selects a track. While recording this only moves the destination slot
    /// for the recording in progress; otherwise the selected slot is played
    /// if it holds a loop.
    fn select_track(&mut self, index: u8) {
        let index = index as usize;
        if index >= NUM_TRACKS {
            warn!(index, "Not a valid track.");
            return;
        }

        if self.recorder.is_some() {
            info!(index, "Recording destination changed.");
            self.tracks.select(index);
        } else {
            self.play_track(index);
        }
    }

    /// Plays the loop in the given slot, replacing any active playback. An
    /// empty slot is a no-op: whatever was playing keeps playing and no play
    /// attempt is made.
    fn play_track(&mut self, index: usize) {
        let track = match self.tracks.get(index) {
            Some(track) => track,
            None => {
                info!(index, "No loop in slot, nothing to play.");
                return;
            }
        };

        if let Err(e) = self.player.stop() {
            error!(err = e.as_ref(), "Error stopping playback.");
        }
        self.player.play(index, track);
    }
}

/// Waits until the given deadline, or forever if there is none. Keeps the
/// select in [`Looper::run`] quiet while nothing is playing.
async fn next_delivery(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::{self, Instant};

    use crate::controller::Event;
    use crate::midi;

    use super::{Looper, State};

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn note_on(key: u8) -> Vec<u8> {
        vec![0x90, key, 100]
    }

    fn performance(at: Instant, raw: Vec<u8>) -> Event {
        Event::Performance { at, raw }
    }

    fn looper_with_device() -> (Looper, Arc<midi::test::Device>) {
        let device = Arc::new(midi::test::Device::get("mock-looper-out"));
        (Looper::new(device.clone()), device)
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_recording_cycle() {
        let (mut looper, device) = looper_with_device();
        assert_eq!(looper.state(), State::Idle);

        looper.handle_event(Event::ToggleRecording);
        assert_eq!(looper.state(), State::Recording);

        let start = Instant::now();
        looper.handle_event(performance(start, note_on(60)));
        looper.handle_event(performance(start + ms(500), note_on(62)));
        time::advance(ms(1000)).await;

        looper.handle_event(Event::ToggleRecording);
        assert_eq!(looper.state(), State::Playing(0));

        // Starting playback by itself sends nothing; deliveries happen on the
        // run loop.
        assert!(device.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_while_playing_stops_player_first() {
        let (mut looper, device) = looper_with_device();

        // Record a loop into slot 0 and let it start playing.
        looper.handle_event(Event::ToggleRecording);
        looper.handle_event(performance(Instant::now(), note_on(60)));
        time::advance(ms(200)).await;
        looper.handle_event(Event::ToggleRecording);
        assert_eq!(looper.state(), State::Playing(0));

        // Toggling again stops playback with an All Notes Off and starts a
        // fresh recording.
        looper.handle_event(Event::ToggleRecording);
        assert_eq!(looper.state(), State::Recording);

        let sent = device.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, vec![0xB0, 123, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_while_recording_moves_destination_only() {
        let (mut looper, _device) = looper_with_device();

        looper.handle_event(Event::ToggleRecording);
        let start = Instant::now();
        looper.handle_event(performance(start, note_on(60)));
        looper.handle_event(performance(start + ms(100), note_on(62)));

        // Selection while recording changes the destination slot but not the
        // captured sequence or the state.
        looper.handle_event(Event::SelectTrack(5));
        assert_eq!(looper.state(), State::Recording);

        time::advance(ms(400)).await;
        looper.handle_event(Event::ToggleRecording);
        assert_eq!(looper.state(), State::Playing(5));

        let track = looper.tracks.get(5).expect("expected loop in slot 5");
        assert!(looper.tracks.get(0).is_none());
        assert_eq!(track.messages().len(), 2);
        assert_eq!(track.messages()[0].offset, ms(0));
        assert_eq!(track.messages()[1].offset, ms(100));
        assert_eq!(track.duration(), ms(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_empty_slot_is_a_noop() {
        let (mut looper, device) = looper_with_device();

        // While idle: nothing to play, no crash, state unchanged.
        looper.handle_event(Event::SelectTrack(3));
        assert_eq!(looper.state(), State::Idle);
        assert!(device.sent().is_empty());

        // While playing: the current playback keeps running untouched.
        looper.handle_event(Event::ToggleRecording);
        looper.handle_event(performance(Instant::now(), note_on(60)));
        time::advance(ms(200)).await;
        looper.handle_event(Event::ToggleRecording);
        assert_eq!(looper.state(), State::Playing(0));

        looper.handle_event(Event::SelectTrack(4));
        assert_eq!(looper.state(), State::Playing(0));
        assert!(device.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_out_of_range_is_rejected() {
        let (mut looper, _device) = looper_with_device();

        looper.handle_event(Event::SelectTrack(10));
        assert_eq!(looper.state(), State::Idle);

        // An in-flight recording continues unaffected, with its destination
        // unchanged.
        looper.handle_event(Event::ToggleRecording);
        looper.handle_event(Event::SelectTrack(127));
        assert_eq!(looper.state(), State::Recording);

        time::advance(ms(100)).await;
        looper.handle_event(Event::ToggleRecording);
        assert_eq!(looper.state(), State::Playing(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_occupied_slot_switches_playback() {
        let (mut looper, device) = looper_with_device();

        // Record into slot 0, then into slot 1.
        looper.handle_event(Event::ToggleRecording);
        looper.handle_event(performance(Instant::now(), note_on(60)));
        time::advance(ms(200)).await;
        looper.handle_event(Event::ToggleRecording);

        looper.handle_event(Event::ToggleRecording);
        looper.handle_event(Event::SelectTrack(1));
        looper.handle_event(performance(Instant::now(), note_on(62)));
        time::advance(ms(200)).await;
        looper.handle_event(Event::ToggleRecording);
        assert_eq!(looper.state(), State::Playing(1));

        device.clear_sent();

        // Selecting the other occupied slot stops the current playback and
        // starts the new one.
        looper.handle_event(Event::SelectTrack(0));
        assert_eq!(looper.state(), State::Playing(0));

        let sent = device.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, vec![0xB0, 123, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_replay_fidelity() -> Result<(), Box<dyn Error>> {
        let device = Arc::new(midi::test::Device::get("mock-looper-out"));
        let output: Arc<dyn midi::Device> = device.clone();
        let (events_tx, events_rx) = mpsc::channel(16);
        let handle = tokio::spawn(Looper::new(output).run(events_rx));

        // Record two note-ons at 0ms and 500ms and finish at 1000ms.
        let start = Instant::now();
        events_tx.send(Event::ToggleRecording).await?;
        events_tx.send(performance(start, note_on(60))).await?;
        events_tx
            .send(performance(start + ms(500), note_on(62)))
            .await?;
        time::sleep(ms(1000)).await;
        events_tx.send(Event::ToggleRecording).await?;

        // Let playback run for a bit over two cycles.
        time::sleep(ms(2250)).await;

        let playback_start = start + ms(1000);
        let sent = device.sent();
        let offsets: Vec<Duration> = sent
            .iter()
            .map(|(at, _)| at.duration_since(playback_start))
            .collect();
        assert_eq!(offsets, vec![ms(0), ms(500), ms(1000), ms(1500), ms(2000)]);
        assert_eq!(sent[0].1, note_on(60));
        assert_eq!(sent[1].1, note_on(62));
        assert_eq!(sent[2].1, note_on(60));

        // Starting a new recording stops the loop: an All Notes Off goes out
        // and the old session never sends again.
        events_tx.send(Event::ToggleRecording).await?;
        time::sleep(ms(1500)).await;

        let sent = device.sent();
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[5].1, vec![0xB0, 123, 0]);

        drop(events_tx);
        handle.await?;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_rest_loop_cycles_silently() -> Result<(), Box<dyn Error>> {
        let device = Arc::new(midi::test::Device::get("mock-looper-out"));
        let output: Arc<dyn midi::Device> = device.clone();
        let (events_tx, events_rx) = mpsc::channel(16);
        let handle = tokio::spawn(Looper::new(output).run(events_rx));

        // An empty recording becomes a rest loop: it plays without sending.
        events_tx.send(Event::ToggleRecording).await?;
        time::sleep(ms(300)).await;
        events_tx.send(Event::ToggleRecording).await?;
        time::sleep(ms(1000)).await;
        assert!(device.sent().is_empty());

        // It still counts as active playback: stopping it sends the panic
        // message.
        events_tx.send(Event::ToggleRecording).await?;
        time::sleep(ms(100)).await;
        let sent = device.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, vec![0xB0, 123, 0]);

        drop(events_tx);
        handle.await?;
        Ok(())
    }
}
