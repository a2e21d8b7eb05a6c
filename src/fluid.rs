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
//! The native FluidSynth surface.
//!
//! Everything the wrappers need from FluidSynth goes through the [Fluid] trait.
//! [Library] implements it against the real shared library and [mock::Fluid]
//! implements it in-process so the wrappers can be exercised without audio
//! hardware or a FluidSynth installation.
#![allow(non_camel_case_types)]

use std::{
    ffi::{c_char, c_double, c_int, c_short, c_uint, c_void, CStr},
    path::Path,
    sync::Arc,
};

use tracing::info;

use crate::error::Result;

pub mod library;
pub mod mock;

pub use library::Library;

/// Opaque native settings object.
#[repr(C)]
pub struct fluid_settings_t {
    _private: [u8; 0],
}

/// Opaque native synthesizer.
#[repr(C)]
pub struct fluid_synth_t {
    _private: [u8; 0],
}

/// Opaque native audio driver.
#[repr(C)]
pub struct fluid_audio_driver_t {
    _private: [u8; 0],
}

/// Opaque native MIDI file player.
#[repr(C)]
pub struct fluid_player_t {
    _private: [u8; 0],
}

/// Opaque native sequencer event.
#[repr(C)]
pub struct fluid_event_t {
    _private: [u8; 0],
}

/// Opaque native sequencer.
#[repr(C)]
pub struct fluid_sequencer_t {
    _private: [u8; 0],
}

/// Sequencer client id (`fluid_seq_id_t`).
pub type ClientId = c_short;

/// Callback invoked by the sequencer for events addressed to a registered client.
pub type EventCallback = unsafe extern "C" fn(
    time: c_uint,
    event: *mut fluid_event_t,
    seq: *mut fluid_sequencer_t,
    data: *mut c_void,
);

pub const FLUID_OK: c_int = 0;
pub const FLUID_FAILED: c_int = -1;

pub const FLUID_FALSE: c_int = 0;
pub const FLUID_TRUE: c_int = 1;

pub const FLUID_NO_TYPE: c_int = -1;
pub const FLUID_NUM_TYPE: c_int = 0;
pub const FLUID_INT_TYPE: c_int = 1;
pub const FLUID_STR_TYPE: c_int = 2;
pub const FLUID_SET_TYPE: c_int = 3;

pub const FLUID_PLAYER_READY: c_int = 0;
pub const FLUID_PLAYER_PLAYING: c_int = 1;

// fluid_seq_event_type values as of FluidSynth 2.x.
pub const FLUID_SEQ_NOTE: c_int = 0;
pub const FLUID_SEQ_NOTEON: c_int = 1;
pub const FLUID_SEQ_NOTEOFF: c_int = 2;
pub const FLUID_SEQ_PROGRAMCHANGE: c_int = 6;
pub const FLUID_SEQ_PITCHBEND: c_int = 8;
pub const FLUID_SEQ_PITCHWHEELSENS: c_int = 9;
pub const FLUID_SEQ_VOLUME: c_int = 14;
pub const FLUID_SEQ_TIMER: c_int = 17;
/// Sent to a callback client as it is unregistered, including when its
/// sequencer is deleted.
pub const FLUID_SEQ_UNREGISTERING: c_int = 21;

/// The FluidSynth functions used by the wrappers.
///
/// # Safety
///
/// Every handle passed to a method must have been returned by the matching
/// constructor of the same implementation and must not have been deleted yet.
/// Out buffers and callbacks follow the contracts of the FluidSynth C API.
pub trait Fluid: Send + Sync {
    /// Describes where the implementation came from, for logging.
    fn describe(&self) -> String;

    // settings.h
    unsafe fn new_settings(&self) -> *mut fluid_settings_t;
    unsafe fn delete_settings(&self, settings: *mut fluid_settings_t);
    unsafe fn settings_get_type(&self, settings: *mut fluid_settings_t, name: &CStr) -> c_int;
    unsafe fn settings_getnum(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: &mut c_double,
    ) -> c_int;
    unsafe fn settings_getint(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: &mut c_int,
    ) -> c_int;
    unsafe fn settings_copystr(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        buf: &mut [u8],
    ) -> c_int;
    unsafe fn settings_setnum(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: c_double,
    ) -> c_int;
    unsafe fn settings_setint(&self, settings: *mut fluid_settings_t, name: &CStr, val: c_int)
        -> c_int;
    unsafe fn settings_setstr(&self, settings: *mut fluid_settings_t, name: &CStr, val: &CStr)
        -> c_int;

    // synth.h
    unsafe fn new_synth(&self, settings: *mut fluid_settings_t) -> *mut fluid_synth_t;
    unsafe fn delete_synth(&self, synth: *mut fluid_synth_t);
    unsafe fn synth_sfload(&self, synth: *mut fluid_synth_t, filename: &CStr, reset: c_int)
        -> c_int;
    unsafe fn synth_sfreload(&self, synth: *mut fluid_synth_t, id: c_int) -> c_int;
    unsafe fn synth_sfunload(&self, synth: *mut fluid_synth_t, id: c_int, reset: c_int) -> c_int;
    unsafe fn synth_noteon(&self, synth: *mut fluid_synth_t, chan: c_int, key: c_int, vel: c_int)
        -> c_int;
    unsafe fn synth_noteoff(&self, synth: *mut fluid_synth_t, chan: c_int, key: c_int) -> c_int;
    unsafe fn synth_cc(&self, synth: *mut fluid_synth_t, chan: c_int, num: c_int, val: c_int)
        -> c_int;
    unsafe fn synth_pitch_bend(&self, synth: *mut fluid_synth_t, chan: c_int, val: c_int)
        -> c_int;
    unsafe fn synth_pitch_wheel_sens(&self, synth: *mut fluid_synth_t, chan: c_int, val: c_int)
        -> c_int;
    unsafe fn synth_program_change(&self, synth: *mut fluid_synth_t, chan: c_int, program: c_int)
        -> c_int;
    unsafe fn synth_bank_select(&self, synth: *mut fluid_synth_t, chan: c_int, bank: c_int)
        -> c_int;
    unsafe fn synth_program_select(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        sfont_id: c_int,
        bank: c_int,
        preset: c_int,
    ) -> c_int;

    // audio.h
    unsafe fn new_audio_driver(
        &self,
        settings: *mut fluid_settings_t,
        synth: *mut fluid_synth_t,
    ) -> *mut fluid_audio_driver_t;
    unsafe fn delete_audio_driver(&self, driver: *mut fluid_audio_driver_t);

    // midi.h
    unsafe fn new_player(&self, synth: *mut fluid_synth_t) -> *mut fluid_player_t;
    unsafe fn delete_player(&self, player: *mut fluid_player_t) -> c_int;
    unsafe fn player_add(&self, player: *mut fluid_player_t, midifile: &CStr) -> c_int;
    unsafe fn player_play(&self, player: *mut fluid_player_t) -> c_int;
    unsafe fn player_stop(&self, player: *mut fluid_player_t) -> c_int;
    unsafe fn player_join(&self, player: *mut fluid_player_t) -> c_int;
    unsafe fn player_get_status(&self, player: *mut fluid_player_t) -> c_int;
    unsafe fn player_set_loop(&self, player: *mut fluid_player_t, loop_count: c_int) -> c_int;

    // event.h
    unsafe fn new_event(&self) -> *mut fluid_event_t;
    unsafe fn delete_event(&self, evt: *mut fluid_event_t);
    unsafe fn event_timer(&self, evt: *mut fluid_event_t, data: *mut c_void);
    unsafe fn event_volume(&self, evt: *mut fluid_event_t, channel: c_int, val: c_int);
    unsafe fn event_note(
        &self,
        evt: *mut fluid_event_t,
        channel: c_int,
        key: c_short,
        vel: c_short,
        duration: c_uint,
    );
    unsafe fn event_noteon(&self, evt: *mut fluid_event_t, channel: c_int, key: c_short, vel: c_short);
    unsafe fn event_noteoff(&self, evt: *mut fluid_event_t, channel: c_int, key: c_short);
    unsafe fn event_pitch_bend(&self, evt: *mut fluid_event_t, channel: c_int, val: c_int);
    unsafe fn event_pitch_wheelsens(&self, evt: *mut fluid_event_t, channel: c_int, val: c_int);
    unsafe fn event_program_change(&self, evt: *mut fluid_event_t, channel: c_int, program: c_int);
    unsafe fn event_get_type(&self, evt: *mut fluid_event_t) -> c_int;
    unsafe fn event_get_source(&self, evt: *mut fluid_event_t) -> ClientId;
    unsafe fn event_set_source(&self, evt: *mut fluid_event_t, src: ClientId);
    unsafe fn event_get_dest(&self, evt: *mut fluid_event_t) -> ClientId;
    unsafe fn event_set_dest(&self, evt: *mut fluid_event_t, dest: ClientId);

    // seq.h, seqbind.h
    unsafe fn new_sequencer(&self, use_system_timer: c_int) -> *mut fluid_sequencer_t;
    unsafe fn delete_sequencer(&self, seq: *mut fluid_sequencer_t);
    unsafe fn sequencer_count_clients(&self, seq: *mut fluid_sequencer_t) -> c_int;
    unsafe fn sequencer_get_client_id(&self, seq: *mut fluid_sequencer_t, index: c_int) -> ClientId;
    unsafe fn sequencer_get_client_name(
        &self,
        seq: *mut fluid_sequencer_t,
        id: ClientId,
    ) -> *const c_char;
    unsafe fn sequencer_client_is_dest(&self, seq: *mut fluid_sequencer_t, id: ClientId) -> c_int;
    unsafe fn sequencer_register_client(
        &self,
        seq: *mut fluid_sequencer_t,
        name: &CStr,
        callback: Option<EventCallback>,
        data: *mut c_void,
    ) -> ClientId;
    unsafe fn sequencer_unregister_client(&self, seq: *mut fluid_sequencer_t, id: ClientId);
    unsafe fn sequencer_send_now(&self, seq: *mut fluid_sequencer_t, evt: *mut fluid_event_t);
    unsafe fn sequencer_send_at(
        &self,
        seq: *mut fluid_sequencer_t,
        evt: *mut fluid_event_t,
        time: c_uint,
        absolute: c_int,
    ) -> c_int;
    unsafe fn sequencer_get_time_scale(&self, seq: *mut fluid_sequencer_t) -> c_double;
    unsafe fn sequencer_set_time_scale(&self, seq: *mut fluid_sequencer_t, scale: c_double);
    unsafe fn sequencer_get_tick(&self, seq: *mut fluid_sequencer_t) -> c_uint;
    unsafe fn sequencer_register_fluidsynth(
        &self,
        seq: *mut fluid_sequencer_t,
        synth: *mut fluid_synth_t,
    ) -> ClientId;
}

/// Returns true if both refer to the same implementation instance, and so
/// handles from one are valid for the other.
pub fn same_backend(a: &Arc<dyn Fluid>, b: &Arc<dyn Fluid>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Opens a FluidSynth implementation. Names starting with "mock" produce the
/// in-process double, anything else is treated as a path to the shared library.
pub fn open(name: Option<&str>) -> Result<Arc<dyn Fluid>> {
    if let Some(name) = name {
        if name.starts_with("mock") {
            info!(name, "Using mock FluidSynth.");
            return Ok(Arc::new(mock::Fluid::new()));
        }
    }

    Ok(Arc::new(Library::open(name.map(Path::new))?))
}

#[cfg(test)]
mod test {
    use super::{open, same_backend};

    #[test]
    fn test_open_mock() {
        let fluid = open(Some("mock-fluid")).expect("mock should always open");
        assert_eq!("mock FluidSynth", fluid.describe());
    }

    #[test]
    fn test_same_backend() {
        let first = open(Some("mock")).expect("mock");
        let second = open(Some("mock")).expect("mock");
        assert!(same_backend(&first, &first.clone()));
        assert!(!same_backend(&first, &second));
    }
}
