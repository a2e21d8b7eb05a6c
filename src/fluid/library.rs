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
    env,
    ffi::{c_char, c_double, c_int, c_short, c_uint, c_void, CStr, OsString},
    fs,
    path::{Path, PathBuf},
};

use regex::Regex;
use tracing::{debug, info, span, Level};

use super::{
    fluid_audio_driver_t, fluid_event_t, fluid_player_t, fluid_sequencer_t, fluid_settings_t,
    fluid_synth_t, ClientId, EventCallback, FLUID_OK,
};
use crate::error::{Error, Result};

/// Library names tried, in order, when nothing is found locally.
pub const LIBRARY_NAMES: &[&str] = &[
    "fluidsynth",
    "libfluidsynth",
    "libfluidsynth-3",
    "libfluidsynth-2",
    "libfluidsynth-1",
];

/// File names in the working directory that are taken to be FluidSynth.
pub const LIBRARY_PATTERN: &str = r"fluidsynth(-\d+)?\.(dll|dylib|so(\.\d+)*)$";

/// Major versions tried as explicit sonames, newest first.
#[cfg(unix)]
const SONAME_VERSIONS: &[u32] = &[3, 2, 1];

/// Declares the native function table. Each entry becomes a typed function
/// pointer that is resolved when the library is opened.
macro_rules! native_functions {
    ($($name:ident: fn($($arg:ty),*) $(-> $ret:ty)?;)*) => {
        struct Functions {
            $($name: unsafe extern "C" fn($($arg),*) $(-> $ret)?,)*
        }

        impl Functions {
            /// Resolves every symbol, failing on the first one that is missing.
            unsafe fn bind(library: &libloading::Library, path: &Path) -> Result<Functions> {
                Ok(Functions {
                    $($name: {
                        let symbol: libloading::Symbol<unsafe extern "C" fn($($arg),*) $(-> $ret)?> =
                            library
                                .get(concat!(stringify!($name), "\0").as_bytes())
                                .map_err(|e| Error::Load {
                                    path: path.display().to_string(),
                                    reason: format!("missing symbol {}: {}", stringify!($name), e),
                                })?;
                        *symbol
                    },)*
                })
            }
        }
    };
}

native_functions! {
    new_fluid_settings: fn() -> *mut fluid_settings_t;
    delete_fluid_settings: fn(*mut fluid_settings_t);
    fluid_settings_get_type: fn(*mut fluid_settings_t, *const c_char) -> c_int;
    fluid_settings_getnum: fn(*mut fluid_settings_t, *const c_char, *mut c_double) -> c_int;
    fluid_settings_getint: fn(*mut fluid_settings_t, *const c_char, *mut c_int) -> c_int;
    fluid_settings_copystr: fn(*mut fluid_settings_t, *const c_char, *mut c_char, c_int) -> c_int;
    fluid_settings_setnum: fn(*mut fluid_settings_t, *const c_char, c_double) -> c_int;
    fluid_settings_setint: fn(*mut fluid_settings_t, *const c_char, c_int) -> c_int;
    fluid_settings_setstr: fn(*mut fluid_settings_t, *const c_char, *const c_char) -> c_int;

    new_fluid_synth: fn(*mut fluid_settings_t) -> *mut fluid_synth_t;
    delete_fluid_synth: fn(*mut fluid_synth_t);
    fluid_synth_sfload: fn(*mut fluid_synth_t, *const c_char, c_int) -> c_int;
    fluid_synth_sfreload: fn(*mut fluid_synth_t, c_int) -> c_int;
    fluid_synth_sfunload: fn(*mut fluid_synth_t, c_int, c_int) -> c_int;
    fluid_synth_noteon: fn(*mut fluid_synth_t, c_int, c_int, c_int) -> c_int;
    fluid_synth_noteoff: fn(*mut fluid_synth_t, c_int, c_int) -> c_int;
    fluid_synth_cc: fn(*mut fluid_synth_t, c_int, c_int, c_int) -> c_int;
    fluid_synth_pitch_bend: fn(*mut fluid_synth_t, c_int, c_int) -> c_int;
    fluid_synth_pitch_wheel_sens: fn(*mut fluid_synth_t, c_int, c_int) -> c_int;
    fluid_synth_program_change: fn(*mut fluid_synth_t, c_int, c_int) -> c_int;
    fluid_synth_bank_select: fn(*mut fluid_synth_t, c_int, c_int) -> c_int;
    fluid_synth_program_select: fn(*mut fluid_synth_t, c_int, c_int, c_int, c_int) -> c_int;

    new_fluid_audio_driver: fn(*mut fluid_settings_t, *mut fluid_synth_t) -> *mut fluid_audio_driver_t;
    delete_fluid_audio_driver: fn(*mut fluid_audio_driver_t);

    new_fluid_player: fn(*mut fluid_synth_t) -> *mut fluid_player_t;
    delete_fluid_player: fn(*mut fluid_player_t);
    fluid_player_add: fn(*mut fluid_player_t, *const c_char) -> c_int;
    fluid_player_play: fn(*mut fluid_player_t) -> c_int;
    fluid_player_stop: fn(*mut fluid_player_t) -> c_int;
    fluid_player_join: fn(*mut fluid_player_t) -> c_int;
    fluid_player_get_status: fn(*mut fluid_player_t) -> c_int;
    fluid_player_set_loop: fn(*mut fluid_player_t, c_int) -> c_int;

    new_fluid_event: fn() -> *mut fluid_event_t;
    delete_fluid_event: fn(*mut fluid_event_t);
    fluid_event_timer: fn(*mut fluid_event_t, *mut c_void);
    fluid_event_volume: fn(*mut fluid_event_t, c_int, c_int);
    fluid_event_note: fn(*mut fluid_event_t, c_int, c_short, c_short, c_uint);
    fluid_event_noteon: fn(*mut fluid_event_t, c_int, c_short, c_short);
    fluid_event_noteoff: fn(*mut fluid_event_t, c_int, c_short);
    fluid_event_pitch_bend: fn(*mut fluid_event_t, c_int, c_int);
    fluid_event_pitch_wheelsens: fn(*mut fluid_event_t, c_int, c_int);
    fluid_event_program_change: fn(*mut fluid_event_t, c_int, c_int);
    fluid_event_get_type: fn(*mut fluid_event_t) -> c_int;
    fluid_event_get_source: fn(*mut fluid_event_t) -> ClientId;
    fluid_event_set_source: fn(*mut fluid_event_t, ClientId);
    fluid_event_get_dest: fn(*mut fluid_event_t) -> ClientId;
    fluid_event_set_dest: fn(*mut fluid_event_t, ClientId);

    new_fluid_sequencer2: fn(c_int) -> *mut fluid_sequencer_t;
    delete_fluid_sequencer: fn(*mut fluid_sequencer_t);
    fluid_sequencer_count_clients: fn(*mut fluid_sequencer_t) -> c_int;
    fluid_sequencer_get_client_id: fn(*mut fluid_sequencer_t, c_int) -> ClientId;
    fluid_sequencer_get_client_name: fn(*mut fluid_sequencer_t, ClientId) -> *const c_char;
    fluid_sequencer_client_is_dest: fn(*mut fluid_sequencer_t, ClientId) -> c_int;
    fluid_sequencer_register_client: fn(*mut fluid_sequencer_t, *const c_char, Option<EventCallback>, *mut c_void) -> ClientId;
    fluid_sequencer_unregister_client: fn(*mut fluid_sequencer_t, ClientId);
    fluid_sequencer_send_now: fn(*mut fluid_sequencer_t, *mut fluid_event_t);
    fluid_sequencer_send_at: fn(*mut fluid_sequencer_t, *mut fluid_event_t, c_uint, c_int) -> c_int;
    fluid_sequencer_get_time_scale: fn(*mut fluid_sequencer_t) -> c_double;
    fluid_sequencer_set_time_scale: fn(*mut fluid_sequencer_t, c_double);
    fluid_sequencer_get_tick: fn(*mut fluid_sequencer_t) -> c_uint;
    fluid_sequencer_register_fluidsynth: fn(*mut fluid_sequencer_t, *mut fluid_synth_t) -> ClientId;
}

/// A loaded FluidSynth shared library with every function the wrappers use
/// already resolved.
pub struct Library {
    path: PathBuf,
    functions: Functions,
    // Must outlive the function pointers above.
    _library: libloading::Library,
}

impl Library {
    /// Opens FluidSynth. The given path is used if it names an existing file,
    /// then the working directory is searched for something that looks like
    /// FluidSynth, and finally the platform loader is asked for the usual names.
    pub fn open(path: Option<&Path>) -> Result<Library> {
        let span = span!(Level::INFO, "open fluidsynth");
        let _enter = span.enter();

        if let Some(resolved) = resolve_local(path) {
            let library = open_raw(resolved.as_os_str().to_os_string()).map_err(|e| {
                Error::Load {
                    path: resolved.display().to_string(),
                    reason: e.to_string(),
                }
            })?;
            return Library::bind(library, resolved);
        }

        for candidate in system_candidates() {
            match open_raw(candidate.clone()) {
                Ok(library) => return Library::bind(library, PathBuf::from(candidate)),
                Err(e) => debug!(
                    candidate = candidate.to_string_lossy().as_ref(),
                    err = e.to_string(),
                    "Library candidate rejected."
                ),
            }
        }

        Err(Error::Load {
            path: path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| LIBRARY_NAMES.join(", ")),
            reason: "no FluidSynth library could be found".to_string(),
        })
    }

    fn bind(library: libloading::Library, path: PathBuf) -> Result<Library> {
        // SAFETY: the signatures in the function table match the FluidSynth 2 headers.
        let functions = unsafe { Functions::bind(&library, &path)? };
        info!(path = path.display().to_string(), "Loaded FluidSynth.");
        Ok(Library {
            path,
            functions,
            _library: library,
        })
    }

    /// Returns the path or name the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_raw(name: OsString) -> std::result::Result<libloading::Library, libloading::Error> {
    // SAFETY: FluidSynth has no load-time initializers with preconditions.
    unsafe { libloading::Library::new(name) }
}

/// Finds a library without asking the platform loader: the explicit path if it
/// is a file, otherwise the first matching file in the working directory.
pub fn resolve_local(path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = path {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        debug!(
            path = path.display().to_string(),
            "Library path is not a file, searching."
        );
    }

    let pattern = Regex::new(LIBRARY_PATTERN).ok()?;
    let cwd = env::current_dir().ok()?;
    let mut found: Vec<PathBuf> = fs::read_dir(&cwd)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| pattern.is_match(name))
        })
        .collect();
    found.sort();
    found.into_iter().next()
}

/// Names handed to the platform loader, in order. Only Windows builds use
/// the prefixed and versioned names as they are; elsewhere the loader adds
/// the lib prefix itself and versions are tried as sonames.
pub fn system_candidates() -> Vec<OsString> {
    #[cfg(windows)]
    let names = LIBRARY_NAMES;
    #[cfg(not(windows))]
    let names = &LIBRARY_NAMES[..1];

    #[allow(unused_mut)]
    let mut candidates: Vec<OsString> = names.iter().map(libloading::library_filename).collect();

    #[cfg(all(unix, not(target_os = "macos")))]
    candidates.extend(
        SONAME_VERSIONS
            .iter()
            .map(|version| OsString::from(format!("libfluidsynth.so.{}", version))),
    );

    #[cfg(target_os = "macos")]
    candidates.extend(
        SONAME_VERSIONS
            .iter()
            .map(|version| OsString::from(format!("libfluidsynth.{}.dylib", version))),
    );

    candidates
}

impl super::Fluid for Library {
    fn describe(&self) -> String {
        format!("FluidSynth ({})", self.path.display())
    }

    unsafe fn new_settings(&self) -> *mut fluid_settings_t {
        (self.functions.new_fluid_settings)()
    }

    unsafe fn delete_settings(&self, settings: *mut fluid_settings_t) {
        (self.functions.delete_fluid_settings)(settings)
    }

    unsafe fn settings_get_type(&self, settings: *mut fluid_settings_t, name: &CStr) -> c_int {
        (self.functions.fluid_settings_get_type)(settings, name.as_ptr())
    }

    unsafe fn settings_getnum(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: &mut c_double,
    ) -> c_int {
        (self.functions.fluid_settings_getnum)(settings, name.as_ptr(), val)
    }

    unsafe fn settings_getint(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: &mut c_int,
    ) -> c_int {
        (self.functions.fluid_settings_getint)(settings, name.as_ptr(), val)
    }

    unsafe fn settings_copystr(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        buf: &mut [u8],
    ) -> c_int {
        let len = buf.len().min(c_int::MAX as usize) as c_int;
        (self.functions.fluid_settings_copystr)(
            settings,
            name.as_ptr(),
            buf.as_mut_ptr() as *mut c_char,
            len,
        )
    }

    unsafe fn settings_setnum(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: c_double,
    ) -> c_int {
        (self.functions.fluid_settings_setnum)(settings, name.as_ptr(), val)
    }

    unsafe fn settings_setint(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: c_int,
    ) -> c_int {
        (self.functions.fluid_settings_setint)(settings, name.as_ptr(), val)
    }

    unsafe fn settings_setstr(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: &CStr,
    ) -> c_int {
        (self.functions.fluid_settings_setstr)(settings, name.as_ptr(), val.as_ptr())
    }

    unsafe fn new_synth(&self, settings: *mut fluid_settings_t) -> *mut fluid_synth_t {
        (self.functions.new_fluid_synth)(settings)
    }

    unsafe fn delete_synth(&self, synth: *mut fluid_synth_t) {
        (self.functions.delete_fluid_synth)(synth)
    }

    unsafe fn synth_sfload(
        &self,
        synth: *mut fluid_synth_t,
        filename: &CStr,
        reset: c_int,
    ) -> c_int {
        (self.functions.fluid_synth_sfload)(synth, filename.as_ptr(), reset)
    }

    unsafe fn synth_sfreload(&self, synth: *mut fluid_synth_t, id: c_int) -> c_int {
        (self.functions.fluid_synth_sfreload)(synth, id)
    }

    unsafe fn synth_sfunload(&self, synth: *mut fluid_synth_t, id: c_int, reset: c_int) -> c_int {
        (self.functions.fluid_synth_sfunload)(synth, id, reset)
    }

    unsafe fn synth_noteon(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        key: c_int,
        vel: c_int,
    ) -> c_int {
        (self.functions.fluid_synth_noteon)(synth, chan, key, vel)
    }

    unsafe fn synth_noteoff(&self, synth: *mut fluid_synth_t, chan: c_int, key: c_int) -> c_int {
        (self.functions.fluid_synth_noteoff)(synth, chan, key)
    }

    unsafe fn synth_cc(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        num: c_int,
        val: c_int,
    ) -> c_int {
        (self.functions.fluid_synth_cc)(synth, chan, num, val)
    }

    unsafe fn synth_pitch_bend(&self, synth: *mut fluid_synth_t, chan: c_int, val: c_int) -> c_int {
        (self.functions.fluid_synth_pitch_bend)(synth, chan, val)
    }

    unsafe fn synth_pitch_wheel_sens(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        val: c_int,
    ) -> c_int {
        (self.functions.fluid_synth_pitch_wheel_sens)(synth, chan, val)
    }

    unsafe fn synth_program_change(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        program: c_int,
    ) -> c_int {
        (self.functions.fluid_synth_program_change)(synth, chan, program)
    }

    unsafe fn synth_bank_select(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        bank: c_int,
    ) -> c_int {
        (self.functions.fluid_synth_bank_select)(synth, chan, bank)
    }

    unsafe fn synth_program_select(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        sfont_id: c_int,
        bank: c_int,
        preset: c_int,
    ) -> c_int {
        (self.functions.fluid_synth_program_select)(synth, chan, sfont_id, bank, preset)
    }

    unsafe fn new_audio_driver(
        &self,
        settings: *mut fluid_settings_t,
        synth: *mut fluid_synth_t,
    ) -> *mut fluid_audio_driver_t {
        (self.functions.new_fluid_audio_driver)(settings, synth)
    }

    unsafe fn delete_audio_driver(&self, driver: *mut fluid_audio_driver_t) {
        (self.functions.delete_fluid_audio_driver)(driver)
    }

    unsafe fn new_player(&self, synth: *mut fluid_synth_t) -> *mut fluid_player_t {
        (self.functions.new_fluid_player)(synth)
    }

    unsafe fn delete_player(&self, player: *mut fluid_player_t) -> c_int {
        // FluidSynth 2 no longer reports a status here.
        (self.functions.delete_fluid_player)(player);
        FLUID_OK
    }

    unsafe fn player_add(&self, player: *mut fluid_player_t, midifile: &CStr) -> c_int {
        (self.functions.fluid_player_add)(player, midifile.as_ptr())
    }

    unsafe fn player_play(&self, player: *mut fluid_player_t) -> c_int {
        (self.functions.fluid_player_play)(player)
    }

    unsafe fn player_stop(&self, player: *mut fluid_player_t) -> c_int {
        (self.functions.fluid_player_stop)(player)
    }

    unsafe fn player_join(&self, player: *mut fluid_player_t) -> c_int {
        (self.functions.fluid_player_join)(player)
    }

    unsafe fn player_get_status(&self, player: *mut fluid_player_t) -> c_int {
        (self.functions.fluid_player_get_status)(player)
    }

    unsafe fn player_set_loop(&self, player: *mut fluid_player_t, loop_count: c_int) -> c_int {
        (self.functions.fluid_player_set_loop)(player, loop_count)
    }

    unsafe fn new_event(&self) -> *mut fluid_event_t {
        (self.functions.new_fluid_event)()
    }

    unsafe fn delete_event(&self, evt: *mut fluid_event_t) {
        (self.functions.delete_fluid_event)(evt)
    }

    unsafe fn event_timer(&self, evt: *mut fluid_event_t, data: *mut c_void) {
        (self.functions.fluid_event_timer)(evt, data)
    }

    unsafe fn event_volume(&self, evt: *mut fluid_event_t, channel: c_int, val: c_int) {
        (self.functions.fluid_event_volume)(evt, channel, val)
    }

    unsafe fn event_note(
        &self,
        evt: *mut fluid_event_t,
        channel: c_int,
        key: c_short,
        vel: c_short,
        duration: c_uint,
    ) {
        (self.functions.fluid_event_note)(evt, channel, key, vel, duration)
    }

    unsafe fn event_noteon(
        &self,
        evt: *mut fluid_event_t,
        channel: c_int,
        key: c_short,
        vel: c_short,
    ) {
        (self.functions.fluid_event_noteon)(evt, channel, key, vel)
    }

    unsafe fn event_noteoff(&self, evt: *mut fluid_event_t, channel: c_int, key: c_short) {
        (self.functions.fluid_event_noteoff)(evt, channel, key)
    }

    unsafe fn event_pitch_bend(&self, evt: *mut fluid_event_t, channel: c_int, val: c_int) {
        (self.functions.fluid_event_pitch_bend)(evt, channel, val)
    }

    unsafe fn event_pitch_wheelsens(&self, evt: *mut fluid_event_t, channel: c_int, val: c_int) {
        (self.functions.fluid_event_pitch_wheelsens)(evt, channel, val)
    }

    unsafe fn event_program_change(&self, evt: *mut fluid_event_t, channel: c_int, program: c_int) {
        (self.functions.fluid_event_program_change)(evt, channel, program)
    }

    unsafe fn event_get_type(&self, evt: *mut fluid_event_t) -> c_int {
        (self.functions.fluid_event_get_type)(evt)
    }

    unsafe fn event_get_source(&self, evt: *mut fluid_event_t) -> ClientId {
        (self.functions.fluid_event_get_source)(evt)
    }

    unsafe fn event_set_source(&self, evt: *mut fluid_event_t, src: ClientId) {
        (self.functions.fluid_event_set_source)(evt, src)
    }

    unsafe fn event_get_dest(&self, evt: *mut fluid_event_t) -> ClientId {
        (self.functions.fluid_event_get_dest)(evt)
    }

    unsafe fn event_set_dest(&self, evt: *mut fluid_event_t, dest: ClientId) {
        (self.functions.fluid_event_set_dest)(evt, dest)
    }

    unsafe fn new_sequencer(&self, use_system_timer: c_int) -> *mut fluid_sequencer_t {
        (self.functions.new_fluid_sequencer2)(use_system_timer)
    }

    unsafe fn delete_sequencer(&self, seq: *mut fluid_sequencer_t) {
        (self.functions.delete_fluid_sequencer)(seq)
    }

    unsafe fn sequencer_count_clients(&self, seq: *mut fluid_sequencer_t) -> c_int {
        (self.functions.fluid_sequencer_count_clients)(seq)
    }

    unsafe fn sequencer_get_client_id(&self, seq: *mut fluid_sequencer_t, index: c_int) -> ClientId {
        (self.functions.fluid_sequencer_get_client_id)(seq, index)
    }

    unsafe fn sequencer_get_client_name(
        &self,
        seq: *mut fluid_sequencer_t,
        id: ClientId,
    ) -> *const c_char {
        (self.functions.fluid_sequencer_get_client_name)(seq, id)
    }

    unsafe fn sequencer_client_is_dest(&self, seq: *mut fluid_sequencer_t, id: ClientId) -> c_int {
        (self.functions.fluid_sequencer_client_is_dest)(seq, id)
    }

    unsafe fn sequencer_register_client(
        &self,
        seq: *mut fluid_sequencer_t,
        name: &CStr,
        callback: Option<EventCallback>,
        data: *mut c_void,
    ) -> ClientId {
        (self.functions.fluid_sequencer_register_client)(seq, name.as_ptr(), callback, data)
    }

    unsafe fn sequencer_unregister_client(&self, seq: *mut fluid_sequencer_t, id: ClientId) {
        (self.functions.fluid_sequencer_unregister_client)(seq, id)
    }

    unsafe fn sequencer_send_now(&self, seq: *mut fluid_sequencer_t, evt: *mut fluid_event_t) {
        (self.functions.fluid_sequencer_send_now)(seq, evt)
    }

    unsafe fn sequencer_send_at(
        &self,
        seq: *mut fluid_sequencer_t,
        evt: *mut fluid_event_t,
        time: c_uint,
        absolute: c_int,
    ) -> c_int {
        (self.functions.fluid_sequencer_send_at)(seq, evt, time, absolute)
    }

    unsafe fn sequencer_get_time_scale(&self, seq: *mut fluid_sequencer_t) -> c_double {
        (self.functions.fluid_sequencer_get_time_scale)(seq)
    }

    unsafe fn sequencer_set_time_scale(&self, seq: *mut fluid_sequencer_t, scale: c_double) {
        (self.functions.fluid_sequencer_set_time_scale)(seq, scale)
    }

    unsafe fn sequencer_get_tick(&self, seq: *mut fluid_sequencer_t) -> c_uint {
        (self.functions.fluid_sequencer_get_tick)(seq)
    }

    unsafe fn sequencer_register_fluidsynth(
        &self,
        seq: *mut fluid_sequencer_t,
        synth: *mut fluid_synth_t,
    ) -> ClientId {
        (self.functions.fluid_sequencer_register_fluidsynth)(seq, synth)
    }
}
