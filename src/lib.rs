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
//! Runtime-loaded bindings for the FluidSynth software synthesizer.
//!
//! The shared library is located and bound when [fluid::open] is called. The
//! wrappers own one native object each and borrow whatever they depend on, so
//! native objects are always torn down in a valid order:
//!
//! ```no_run
//! use fluidbind::{audio::AudioDriver, fluid, settings::Settings, synth::Synth};
//!
//! let fluid = fluid::open(None)?;
//! let settings = Settings::new(fluid)?;
//! let synth = Synth::new(&settings)?;
//! let _driver = AudioDriver::new(&synth, &settings)?;
//! synth.load_soundfont("FluidR3_GM.sf2", true)?;
//! synth.note_on(0, 60, 1.0);
//! # Ok::<(), fluidbind::error::Error>(())
//! ```
pub mod audio;
pub mod config;
pub mod error;
pub mod event;
pub mod fluid;
pub mod player;
pub mod sequencer;
pub mod settings;
pub mod synth;
pub mod util;
