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
use std::{error::Error, fmt, sync::Arc};

use tokio::sync::mpsc::Sender;
use tokio::time::Instant;

mod midir;
mod mock;

/// A raw MIDI message received from an input port. The instant is stamped in
/// the input callback itself, so downstream processing latency never skews
/// recorded timing. The transport's own delta timestamps are too coarse for
/// loop capture and are ignored.
#[derive(Debug, Clone)]
pub struct InputEvent {
    /// When the message arrived.
    pub at: Instant,
    /// The raw MIDI message bytes.
    pub raw: Vec<u8>,
}

/// A MIDI device that can listen for input events and send raw messages.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<InputEvent>) -> Result<(), Box<dyn Error>>;

    /// Stops watching events.
    fn stop_watch_events(&self);

    /// Sends a raw MIDI message through the output.
    fn send(&self, raw: &[u8]) -> Result<(), Box<dyn Error>>;
}

/// Lists the MIDI ports known to midir.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    midir::list()
}

/// Gets a device that opens a virtual port with the given name, so that other
/// MIDI software can connect to the looper rather than the other way around.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    Ok(Arc::new(midir::Device::get(name)))
}
