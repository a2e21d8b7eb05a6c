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
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::info;

use crate::settings::{Quality, Settings, Value};

pub mod error;

pub use self::error::ConfigError;

/// Prefix of the environment variables that override the session file.
const ENV_PREFIX: &str = "FLUIDBIND";

/// A scalar settings value as written in YAML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(String),
}

impl From<&SettingValue> for Value {
    fn from(value: &SettingValue) -> Self {
        match value {
            SettingValue::Bool(bool) => Value::from(*bool),
            SettingValue::Int(int) => match i32::try_from(*int) {
                Ok(int) => Value::Int(int),
                Err(_) => Value::Num(*int as f64),
            },
            SettingValue::Num(num) => Value::Num(*num),
            SettingValue::Str(string) => Value::Str(string.clone()),
        }
    }
}

/// Settings may be written as dotted keys or as nested tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SettingNode {
    Value(SettingValue),
    Table(BTreeMap<String, SettingNode>),
}

fn flatten(prefix: &str, nodes: &BTreeMap<String, SettingNode>, out: &mut BTreeMap<String, SettingValue>) {
    for (key, node) in nodes {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match node {
            SettingNode::Value(value) => {
                out.insert(key, value.clone());
            }
            SettingNode::Table(table) => flatten(&key, table, out),
        }
    }
}

/// The configuration for a synthesizer session.
#[derive(Debug, Default, Deserialize)]
pub struct Session {
    /// Path of the FluidSynth library, or a name starting with "mock".
    library: Option<String>,

    /// Quality preset applied before the individual settings.
    quality: Option<String>,

    #[serde(default)]
    settings: BTreeMap<String, SettingNode>,

    /// Soundfonts to load into the synth.
    #[serde(default)]
    soundfonts: Vec<PathBuf>,
}

impl Session {
    /// Parses a session from a YAML file, with FLUIDBIND_* environment
    /// variables taking precedence.
    pub fn deserialize(path: &Path) -> Result<Session, ConfigError> {
        let session = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize::<Session>()?;

        info!(path = ?path, "Loaded session config.");
        Ok(session)
    }

    /// Builds a session from FLUIDBIND_* environment variables alone.
    pub fn from_environment() -> Result<Session, ConfigError> {
        Ok(Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize::<Session>()?)
    }

    pub fn library(&self) -> Option<&str> {
        self.library.as_deref()
    }

    pub fn set_library(&mut self, library: String) {
        self.library = Some(library);
    }

    /// Returns the configured quality preset, if any.
    pub fn quality(&self) -> Result<Option<Quality>, ConfigError> {
        self.quality
            .as_deref()
            .map(|quality| quality.parse::<Quality>().map_err(ConfigError::Quality))
            .transpose()
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.quality = Some(quality.to_string());
    }

    /// Returns the settings with nested tables flattened to dotted keys.
    pub fn settings(&self) -> BTreeMap<String, SettingValue> {
        let mut out = BTreeMap::new();
        flatten("", &self.settings, &mut out);
        out
    }

    pub fn soundfonts(&self) -> &[PathBuf] {
        &self.soundfonts
    }

    pub fn add_soundfont(&mut self, path: PathBuf) {
        if !self.soundfonts.contains(&path) {
            self.soundfonts.push(path);
        }
    }

    /// Applies the quality preset and then each setting in key order.
    pub fn apply(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(quality) = self.quality()? {
            settings.set_quality(quality)?;
        }

        for (key, value) in self.settings() {
            settings.set(&key, Value::from(&value))?;
        }

        Ok(())
    }
}
