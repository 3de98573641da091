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
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::controller::Controller;
use crate::midi;

/// The default name for the virtual input port.
const DEFAULT_INPUT_PORT: &str = "Looper in";
/// The default name for the virtual output port.
const DEFAULT_OUTPUT_PORT: &str = "Looper out";

/// The default controller number that toggles recording.
const DEFAULT_TOGGLE_RECORD: u8 = 0x01;
/// The default controller number that selects a track.
const DEFAULT_SELECT_TRACK: u8 = 0x02;

/// Typed error for config load/parse failures so callers can distinguish
/// e.g. file-not-found from parse errors without string matching.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config read error: {0}")]
    Read(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_yml::Error),
}

/// A YAML representation of the looper configuration. Every field is
/// optional; the defaults match the stock port names and control mapping.
#[derive(Deserialize, Clone, Default)]
pub struct Config {
    /// The name of the virtual input port.
    input_port: Option<String>,

    /// The name of the virtual output port.
    output_port: Option<String>,

    /// The control change mapping.
    controls: Option<Controls>,
}

impl Config {
    /// Loads a configuration from the given YAML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_yml::from_str(&contents)?)
    }

    /// Returns the input port name from the configuration.
    pub fn input_port(&self) -> &str {
        self.input_port.as_deref().unwrap_or(DEFAULT_INPUT_PORT)
    }

    /// Returns the output port name from the configuration.
    pub fn output_port(&self) -> &str {
        self.output_port.as_deref().unwrap_or(DEFAULT_OUTPUT_PORT)
    }

    /// Returns the control mapping from the configuration.
    pub fn controls(&self) -> Controls {
        self.controls.clone().unwrap_or_default()
    }
}

/// The control change controller numbers the looper listens to. These arrive
/// on the input port alongside the performance and are consumed as commands
/// rather than recorded.
#[derive(Deserialize, Clone, Default)]
pub struct Controls {
    /// Toggles recording on and off.
    toggle_record: Option<u8>,

    /// Selects a track; the value byte is the track index.
    select_track: Option<u8>,
}

impl Controls {
    #[cfg(test)]
    /// Creates a control mapping with explicit controller numbers.
    pub fn new(toggle_record: u8, select_track: u8) -> Controls {
        Controls {
            toggle_record: Some(toggle_record),
            select_track: Some(select_track),
        }
    }

    /// The controller number that toggles recording.
    pub fn toggle_record(&self) -> u8 {
        self.toggle_record.unwrap_or(DEFAULT_TOGGLE_RECORD)
    }

    /// The controller number that selects a track.
    pub fn select_track(&self) -> u8 {
        self.select_track.unwrap_or(DEFAULT_SELECT_TRACK)
    }
}

/// Initializes the looper and controller from the given config file and
/// returns the controller, which can be waited on until it exits.
/// Realistically, the controller is not expected to exit.
pub fn init_looper(config_path: Option<&Path>) -> Result<Controller, Box<dyn Error>> {
    let config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let input = midi::get_device(config.input_port())?;
    let output = midi::get_device(config.output_port())?;

    Controller::new(input, output, config.controls())
}
