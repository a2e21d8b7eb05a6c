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
use std::{ffi::NulError, path::PathBuf};

/// Typed error for every failure the FluidSynth wrappers surface, so callers can
/// tell a missing library from a bad settings key without string matching.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unable to load FluidSynth library {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("Settings key not found: {0}")]
    KeyNotFound(String),

    #[error("Soundfont error for {}: {reason}", path.display())]
    Soundfont { path: PathBuf, reason: String },

    #[error("Couldn't unload soundfonts: {}", display_paths(.0))]
    Teardown(Vec<PathBuf>),

    #[error("Fatal teardown error: {0}")]
    FatalTeardown(String),

    #[error("Native {0} could not be created")]
    Create(&'static str),

    #[error("The {0} belongs to a different FluidSynth instance")]
    MismatchedBackend(&'static str),

    #[error("Player error for {path}: {reason}")]
    Player { path: String, reason: String },

    #[error("Sequencer error: {0}")]
    Sequencer(String),

    #[error("Invalid string: {0}")]
    InvalidString(#[from] NulError),
}

pub type Result<T> = std::result::Result<T, Error>;

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use super::Error;

    #[test]
    fn test_teardown_lists_paths() {
        let err = Error::Teardown(vec![PathBuf::from("a.sf2"), PathBuf::from("b.sf2")]);
        assert_eq!("Couldn't unload soundfonts: a.sf2, b.sf2", err.to_string());
    }

    #[test]
    fn test_soundfont_message() {
        let err = Error::Soundfont {
            path: PathBuf::from("piano.sf2"),
            reason: "never loaded".to_string(),
        };
        assert_eq!("Soundfont error for piano.sf2: never loaded", err.to_string());
    }
}
