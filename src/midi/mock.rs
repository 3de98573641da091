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
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Barrier, Mutex,
    },
};

use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::InputEvent;

/// A mock device. Input events are injected by tests and output sends are
/// captured with the instant each one happened, instead of reaching a port.
#[derive(Clone)]
pub struct Device {
    name: String,
    barrier: Arc<Barrier>,
    closed: Arc<AtomicBool>,
    event: Arc<Mutex<Vec<u8>>>,
    sent: Arc<Mutex<Vec<(Instant, Vec<u8>)>>>,
    event_thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            barrier: Arc::new(Barrier::new(2)),
            closed: Arc::new(AtomicBool::new(false)),
            event: Arc::new(Mutex::new(Vec::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            event_thread: Arc::new(Mutex::new(None)),
        }
    }

    #[cfg(test)]
    /// Sends the mock event through to the sender.
    pub fn mock_event(&self, event: &[u8]) {
        {
            let mut mutex_event = self.event.lock().expect("unable to get event lock");
            *mutex_event = event.to_vec();
        }
        // Wait until the thread goes to receive the event.
        self.barrier.wait();
        // Wait until the thread has locked the mutex.
        self.barrier.wait();
    }

    #[cfg(test)]
    /// Returns the messages sent through the output so far, with the instant
    /// each send happened.
    pub fn sent(&self) -> Vec<(Instant, Vec<u8>)> {
        self.sent.lock().expect("unable to get sent lock").clone()
    }

    #[cfg(test)]
    /// Forgets the sends captured so far.
    pub fn clear_sent(&self) {
        self.sent.lock().expect("unable to get sent lock").clear();
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<InputEvent>) -> Result<(), Box<dyn Error>> {
        let mut event_thread = self.event_thread.lock().expect("unable to get lock");
        if event_thread.is_some() {
            return Err("Already watching events.".into());
        }

        let barrier = self.barrier.clone();
        let event = self.event.clone();
        let closed = self.closed.clone();
        *event_thread = Some(tokio::task::spawn_blocking(move || loop {
            barrier.wait();

            {
                if closed.load(Ordering::Relaxed) {
                    return;
                }
                let event = event.lock().expect("unable to get event lock");
                sender
                    .blocking_send(InputEvent {
                        at: Instant::now(),
                        raw: event.to_vec(),
                    })
                    .expect("error sending event");
            }
            barrier.wait();
        }));

        Ok(())
    }

    /// Stops watching events. Safe to call more than once; only the first
    /// call performs the rendezvous with the watcher thread.
    fn stop_watch_events(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        if self.event_thread.lock().expect("unable to get lock").is_none() {
            return;
        }
        // Wait for the watcher thread to move to its next loop iteration.
        self.barrier.wait();
    }

    /// Captures a send instead of delivering it anywhere.
    fn send(&self, raw: &[u8]) -> Result<(), Box<dyn Error>> {
        let mut sent = self.sent.lock().expect("unable to get sent lock");
        sent.push((Instant::now(), raw.to_vec()));
        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
