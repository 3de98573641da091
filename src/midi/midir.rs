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
    collections::HashMap,
    error::Error,
    fmt, mem,
    sync::Mutex,
};

use midir::os::unix::{VirtualInput, VirtualOutput};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use tokio::sync::mpsc::Sender;
use tokio::time::Instant;
use tracing::{info, span, warn, Level};

use super::InputEvent;

/// A MIDI device backed by midir virtual ports. The input and output sides
/// are opened lazily, each under the port name the device was created with.
pub struct Device {
    name: String,
    event_connection: Mutex<Option<MidiInputConnection<()>>>,
    output_connection: Mutex<Option<MidiOutputConnection>>,
}

impl Device {
    /// Gets a device that will open virtual ports with the given name.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            event_connection: Mutex::new(None),
            output_connection: Mutex::new(None),
        }
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    /// Watches MIDI input for events and sends them to the given sender. The
    /// callback runs on the transport's thread and must never block, so a
    /// full channel drops the message instead of waiting.
    fn watch_events(&self, sender: Sender<InputEvent>) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "watch events (midir)");
        let _enter = span.enter();

        let mut event_connection = self.event_connection.lock().expect("unable to get lock");
        if event_connection.is_some() {
            return Err("Already watching events.".into());
        }

        info!(port = self.name, "Opening virtual MIDI input.");

        let input = MidiInput::new("mloop input")?;
        *event_connection = Some(input.create_virtual(
            &self.name,
            move |_, raw_event, _| {
                let event = InputEvent {
                    at: Instant::now(),
                    raw: Vec::from(raw_event),
                };
                if let Err(e) = sender.try_send(event) {
                    warn!(
                        err = format!("{:?}", e),
                        "Input queue full, dropping MIDI event."
                    );
                }
            },
            (),
        )?);

        Ok(())
    }

    /// Stops watching events.
    fn stop_watch_events(&self) {
        // Explicitly drop the connection, closing the virtual port.
        let event_connection = self
            .event_connection
            .lock()
            .expect("error getting mutex")
            .take();

        mem::drop(event_connection);
    }

    /// Sends a raw MIDI message, opening the virtual output port on first use
    /// and keeping it open for the lifetime of the device.
    fn send(&self, raw: &[u8]) -> Result<(), Box<dyn Error>> {
        let mut output_connection = self.output_connection.lock().expect("unable to get lock");

        if output_connection.is_none() {
            let output = MidiOutput::new("mloop output")?;
            *output_connection = Some(output.create_virtual(&self.name)?);
            info!(port = self.name, "Opened virtual MIDI output.");
        }

        if let Some(connection) = output_connection.as_mut() {
            connection.send(raw)?;
        }

        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Virtual)", self.name)
    }
}

/// Lists the midir ports visible to this process, merging input and output
/// sides that share a name.
pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
    let input = MidiInput::new("mloop input listing")?;
    let output = MidiOutput::new("mloop output listing")?;

    let mut ports: HashMap<String, (bool, bool)> = HashMap::new();
    for port in input.ports() {
        ports.entry(input.port_name(&port)?).or_insert((false, false)).0 = true;
    }
    for port in output.ports() {
        ports.entry(output.port_name(&port)?).or_insert((false, false)).1 = true;
    }

    let mut devices = ports
        .into_iter()
        .map(|(name, (has_input, has_output))| {
            let mut capabilities: Vec<&str> = Vec::new();
            if has_input {
                capabilities.push("Input");
            }
            if has_output {
                capabilities.push("Output");
            }
            format!("{} ({})", name, capabilities.join("/"))
        })
        .collect::<Vec<String>>();
    devices.sort();

    Ok(devices)
}
