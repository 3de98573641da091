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

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{error, info, span, Level};

use crate::config::Controls;
use crate::looper::Looper;
use crate::midi;

pub mod dispatch;

/// Events interpreted by the looper. Performance events feed the recorder;
/// the rest drive state transitions.
#[derive(Debug)]
pub enum Event {
    /// A performance message to capture, stamped with its arrival instant.
    Performance { at: Instant, raw: Vec<u8> },

    /// Starts recording, or finishes the recording in progress and plays it.
    ToggleRecording,

    /// Selects a track slot: the recording destination while recording,
    /// otherwise the track to play.
    SelectTrack(u8),
}

/// Wires the input device through the dispatcher to the looper and runs the
/// whole pipeline.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller recording from the input device and playing
    /// through the output device.
    pub fn new(
        input: Arc<dyn midi::Device>,
        output: Arc<dyn midi::Device>,
        controls: Controls,
    ) -> Result<Controller, Box<dyn Error>> {
        Ok(Controller {
            handle: tokio::spawn(
                async move { Controller::run(input, output, controls).await },
            ),
        })
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Runs the watcher, the dispatcher and the looper until the input
    /// closes. Everything downstream of the input callback shuts down in
    /// order once the raw event channel does.
    async fn run(
        input: Arc<dyn midi::Device>,
        output: Arc<dyn midi::Device>,
        controls: Controls,
    ) {
        let (raw_tx, raw_rx) = mpsc::channel::<midi::InputEvent>(64);
        {
            let input = input.clone();
            tokio::task::spawn_blocking(move || {
                let span = span!(Level::INFO, "MIDI watcher");
                let _enter = span.enter();

                if let Err(e) = input.watch_events(raw_tx) {
                    error!(err = e.to_string(), "Error watching MIDI events");
                }
            });
        }

        let (events_tx, events_rx) = mpsc::channel::<Event>(16);
        info!(
            input = input.name(),
            output = output.name(),
            "Controller started."
        );
        let dispatcher = tokio::spawn(dispatch::run(raw_rx, events_tx, controls, input));

        Looper::new(output).run(events_rx).await;

        if let Err(e) = dispatcher.await {
            error!("Error waiting for dispatcher to stop: {}", e);
        }
    }
}
