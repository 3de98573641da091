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
use std::sync::Arc;

use midly::live::LiveEvent;
use midly::MidiMessage;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::Controls;
use crate::midi::{Device, InputEvent};

use super::Event;

/// Classifies a raw incoming message. Channel-voice performance categories
/// are forwarded for capture with their arrival instant intact; control
/// changes are looked up in the control mapping. Returns None for everything
/// the looper has no use for, including messages that fail to parse — nothing
/// here may fault.
pub fn classify(controls: &Controls, event: InputEvent) -> Option<Event> {
    let message = match LiveEvent::parse(&event.raw) {
        Ok(LiveEvent::Midi { message, .. }) => message,
        Ok(parsed) => {
            debug!(
                event = format!("{:?}", parsed),
                "Ignoring non-channel MIDI message."
            );
            return None;
        }
        Err(e) => {
            warn!(
                err = format!("{:?}", e),
                "Dropping malformed MIDI message."
            );
            return None;
        }
    };

    match message {
        MidiMessage::NoteOn { .. }
        | MidiMessage::NoteOff { .. }
        | MidiMessage::Aftertouch { .. }
        | MidiMessage::PitchBend { .. }
        | MidiMessage::ChannelAftertouch { .. } => Some(Event::Performance {
            at: event.at,
            raw: event.raw,
        }),
        MidiMessage::Controller { controller, value } => {
            let controller = controller.as_int();
            if controller == controls.toggle_record() {
                Some(Event::ToggleRecording)
            } else if controller == controls.select_track() {
                Some(Event::SelectTrack(value.as_int()))
            } else {
                warn!(controller, "Can't handle control change.");
                None
            }
        }
        _ => {
            debug!(
                message = format!("{:?}", message),
                "Ignoring channel message."
            );
            None
        }
    }
}

/// Receives raw input events and forwards the classified ones to the looper.
/// Stops watching the device once either side of the pipeline closes.
pub async fn run(
    mut raw_events: Receiver<InputEvent>,
    events: Sender<Event>,
    controls: Controls,
    device: Arc<dyn Device>,
) {
    loop {
        let raw_event = match raw_events.recv().await {
            Some(raw_event) => raw_event,
            None => {
                info!("MIDI watcher closed.");
                device.stop_watch_events();
                return;
            }
        };

        if let Some(event) = classify(&controls, raw_event) {
            if events.send(event).await.is_err() {
                info!("Looper closed, dispatcher stopping.");
                device.stop_watch_events();
                return;
            }
        }
    }
}
