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
    cell::RefCell,
    collections::BTreeMap,
    ffi::c_int,
    marker::PhantomData,
    mem,
    path::{Path, PathBuf},
    ptr::NonNull,
    sync::Arc,
};

use tracing::{error, info, span, warn, Level};

use crate::{
    error::{Error, Result},
    fluid::{fluid_synth_t, Fluid, FLUID_FAILED, FLUID_OK},
    settings::Settings,
    util::{filename_display, path_to_cstring},
};

/// The id FluidSynth assigns a loaded soundfont.
pub type SoundfontId = i32;

/// A MIDI velocity. Integers pass through untouched, floats in 0.0-1.0 are
/// scaled to 0-127 and truncated toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Velocity(i32);

impl Velocity {
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl From<i32> for Velocity {
    fn from(value: i32) -> Self {
        Velocity(value)
    }
}

impl From<u8> for Velocity {
    fn from(value: u8) -> Self {
        Velocity(value.into())
    }
}

impl From<f32> for Velocity {
    fn from(value: f32) -> Self {
        Velocity((value * 127.0) as i32)
    }
}

impl From<f64> for Velocity {
    fn from(value: f64) -> Self {
        Velocity((value * 127.0) as i32)
    }
}

/// A native synthesizer along with the soundfonts loaded into it.
pub struct Synth<'s> {
    fluid: Arc<dyn Fluid>,
    handle: NonNull<fluid_synth_t>,
    soundfonts: RefCell<BTreeMap<PathBuf, SoundfontId>>,
    released: bool,
    _settings: PhantomData<&'s Settings>,
}

impl<'s> Synth<'s> {
    /// Creates a synthesizer configured by the given settings.
    pub fn new(settings: &'s Settings) -> Result<Synth<'s>> {
        let fluid = settings.fluid().clone();
        // SAFETY: the settings handle is live for 's.
        let handle = NonNull::new(unsafe { fluid.new_synth(settings.as_ptr()) })
            .ok_or(Error::Create("synth"))?;

        Ok(Synth {
            fluid,
            handle,
            soundfonts: RefCell::new(BTreeMap::new()),
            released: false,
            _settings: PhantomData,
        })
    }

    /// Returns the FluidSynth implementation the synth was created with.
    pub fn fluid(&self) -> &Arc<dyn Fluid> {
        &self.fluid
    }

    pub(crate) fn as_ptr(&self) -> *mut fluid_synth_t {
        self.handle.as_ptr()
    }

    /// Loads a soundfont. A path that is already loaded is reloaded in place
    /// rather than loaded a second time.
    pub fn load_soundfont(&self, path: impl AsRef<Path>, reload_presets: bool) -> Result<SoundfontId> {
        let path = path.as_ref();
        let filename = path_to_cstring(path)?;
        let reset = c_int::from(reload_presets);
        let cached = self.soundfont_id(path);

        // SAFETY: the handle is live for as long as self.
        let id = unsafe {
            match cached {
                Some(id) => self.fluid.synth_sfreload(self.as_ptr(), id),
                None => self.fluid.synth_sfload(self.as_ptr(), &filename, reset),
            }
        };

        if id == FLUID_FAILED {
            return Err(Error::Soundfont {
                path: path.to_path_buf(),
                reason: match cached {
                    Some(_) => "reload failed".to_string(),
                    None => "load failed".to_string(),
                },
            });
        }

        info!(
            soundfont = filename_display(path),
            id,
            reloaded = cached.is_some(),
            "Loaded soundfont."
        );
        self.soundfonts.borrow_mut().insert(path.to_path_buf(), id);
        Ok(id)
    }

    /// Unloads a previously loaded soundfont.
    pub fn unload_soundfont(&self, path: impl AsRef<Path>, reload_presets: bool) -> Result<()> {
        let path = path.as_ref();
        let id = self.soundfont_id(path).ok_or_else(|| Error::Soundfont {
            path: path.to_path_buf(),
            reason: "soundfont was never loaded".to_string(),
        })?;

        // SAFETY: the handle is live for as long as self.
        let status = unsafe {
            self.fluid
                .synth_sfunload(self.as_ptr(), id, c_int::from(reload_presets))
        };
        if status != FLUID_OK {
            return Err(Error::Soundfont {
                path: path.to_path_buf(),
                reason: "unload failed".to_string(),
            });
        }

        info!(soundfont = filename_display(path), id, "Unloaded soundfont.");
        self.soundfonts.borrow_mut().remove(path);
        Ok(())
    }

    /// Returns the id of a loaded soundfont.
    pub fn soundfont_id(&self, path: impl AsRef<Path>) -> Option<SoundfontId> {
        self.soundfonts.borrow().get(path.as_ref()).copied()
    }

    /// Returns every loaded soundfont and its id, ordered by path.
    pub fn soundfonts(&self) -> Vec<(PathBuf, SoundfontId)> {
        self.soundfonts
            .borrow()
            .iter()
            .map(|(path, id)| (path.clone(), *id))
            .collect()
    }

    pub fn note_on(&self, channel: i32, key: i32, velocity: impl Into<Velocity>) -> bool {
        let velocity = velocity.into().value();
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.synth_noteon(self.as_ptr(), channel, key, velocity) == FLUID_OK }
    }

    pub fn note_off(&self, channel: i32, key: i32) -> bool {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.synth_noteoff(self.as_ptr(), channel, key) == FLUID_OK }
    }

    pub fn control_change(&self, channel: i32, control: i32, value: i32) -> bool {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.synth_cc(self.as_ptr(), channel, control, value) == FLUID_OK }
    }

    /// Bends pitch on a channel, 0-16383 with 8192 as center.
    pub fn pitch_bend(&self, channel: i32, value: i32) -> bool {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.synth_pitch_bend(self.as_ptr(), channel, value) == FLUID_OK }
    }

    /// Sets the pitch bend range of a channel in semitones.
    pub fn pitch_wheel_sensitivity(&self, channel: i32, value: i32) -> bool {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.synth_pitch_wheel_sens(self.as_ptr(), channel, value) == FLUID_OK }
    }

    pub fn program_change(&self, channel: i32, program: i32) -> bool {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.synth_program_change(self.as_ptr(), channel, program) == FLUID_OK }
    }

    pub fn bank_select(&self, channel: i32, bank: i32) -> bool {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.synth_bank_select(self.as_ptr(), channel, bank) == FLUID_OK }
    }

    /// Selects a preset on a channel from one of the loaded soundfonts.
    pub fn program_select(
        &self,
        channel: i32,
        soundfont: impl AsRef<Path>,
        bank: i32,
        preset: i32,
    ) -> Result<bool> {
        let soundfont = soundfont.as_ref();
        let id = self.soundfont_id(soundfont).ok_or_else(|| Error::Soundfont {
            path: soundfont.to_path_buf(),
            reason: "soundfont was never loaded".to_string(),
        })?;

        // SAFETY: the handle is live for as long as self.
        Ok(unsafe {
            self.fluid
                .synth_program_select(self.as_ptr(), channel, id, bank, preset)
                == FLUID_OK
        })
    }

    /// Unloads every soundfont and deletes the native synth. The synth is
    /// deleted even when unloads fail; the failing paths are reported after.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let span = span!(Level::INFO, "synth teardown");
        let _enter = span.enter();

        let mut failed = Vec::new();
        for (path, id) in mem::take(self.soundfonts.get_mut()) {
            // SAFETY: the handle has not been deleted yet.
            if unsafe { self.fluid.synth_sfunload(self.as_ptr(), id, 1) } != FLUID_OK {
                warn!(soundfont = filename_display(&path), id, "Unable to unload soundfont.");
                failed.push(path);
            }
        }

        // SAFETY: the handle is deleted exactly once, here.
        unsafe { self.fluid.delete_synth(self.as_ptr()) };

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Teardown(failed))
        }
    }
}

impl Drop for Synth<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            error!(err = %e, "Error tearing down synth.");
        }
    }
}

#[cfg(test)]
mod test {
    use std::{path::PathBuf, sync::Arc};

    use super::{Synth, Velocity};
    use crate::{
        error::Error,
        fluid::mock::{self, Call},
        settings::Settings,
    };

    fn fixture() -> (Arc<mock::Fluid>, Settings) {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings should be created");
        fluid.clear_calls();
        (fluid, settings)
    }

    fn note_ons(fluid: &mock::Fluid) -> Vec<i32> {
        fluid
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::NoteOn { velocity, .. } => Some(velocity),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_velocity_coercion() {
        assert_eq!(Velocity(127), Velocity::from(1.0));
        assert_eq!(Velocity(63), Velocity::from(0.5));
        assert_eq!(Velocity(63), Velocity::from(0.5f32));
        assert_eq!(Velocity(100), Velocity::from(100u8));

        let (fluid, settings) = fixture();
        let synth = Synth::new(&settings).expect("synth");
        assert!(synth.note_on(0, 60, 1.0));
        assert!(synth.note_on(0, 60, 127));
        assert!(synth.note_on(0, 60, 0.5));
        assert_eq!(vec![127, 127, 63], note_ons(&fluid));
    }

    #[test]
    fn test_midi_messages() {
        let (_fluid, settings) = fixture();
        let synth = Synth::new(&settings).expect("synth");

        assert!(synth.note_off(0, 60));
        assert!(synth.control_change(1, 7, 100));
        assert!(synth.pitch_bend(0, 8192));
        assert!(synth.pitch_wheel_sensitivity(0, 2));
        assert!(synth.program_change(9, 0));
        assert!(synth.bank_select(0, 128));

        // Out of range values are rejected natively and reported as false.
        assert!(!synth.note_on(16, 60, 100));
        assert!(!synth.control_change(0, 7, 200));
        assert!(!synth.pitch_bend(0, 20000));
    }

    #[test]
    fn test_load_twice_reloads() {
        let (fluid, settings) = fixture();
        let synth = Synth::new(&settings).expect("synth");

        let first = synth.load_soundfont("piano.sf2", true).expect("load");
        let second = synth.load_soundfont("piano.sf2", true).expect("reload");
        assert_ne!(first, second);
        assert_eq!(vec![(PathBuf::from("piano.sf2"), second)], synth.soundfonts());

        let calls = fluid.calls();
        assert_eq!(
            1,
            calls
                .iter()
                .filter(|call| matches!(call, Call::SfLoad { .. }))
                .count()
        );
        assert!(calls.contains(&Call::SfReload { id: first }));

        // The reloaded id is the one used from then on.
        synth.unload_soundfont("piano.sf2", true).expect("unload");
        assert!(fluid.calls().contains(&Call::SfUnload {
            id: second,
            reset: true
        }));
        assert!(synth.soundfonts().is_empty());
    }

    #[test]
    fn test_failed_load_leaves_cache_unchanged() {
        let (fluid, settings) = fixture();
        let synth = Synth::new(&settings).expect("synth");
        fluid.fail_soundfont_load("broken.sf2");

        assert!(matches!(
            synth.load_soundfont("broken.sf2", false),
            Err(Error::Soundfont { path, .. }) if path == PathBuf::from("broken.sf2")
        ));
        assert_eq!(None, synth.soundfont_id("broken.sf2"));
        assert!(synth.soundfonts().is_empty());
    }

    #[test]
    fn test_unload_never_loaded() {
        let (_fluid, settings) = fixture();
        let synth = Synth::new(&settings).expect("synth");
        let id = synth.load_soundfont("piano.sf2", true).expect("load");

        assert!(matches!(
            synth.unload_soundfont("strings.sf2", true),
            Err(Error::Soundfont { .. })
        ));
        assert_eq!(Some(id), synth.soundfont_id("piano.sf2"));
        assert_eq!(1, synth.soundfonts().len());
    }

    #[test]
    fn test_failed_unload_keeps_entry() {
        let (fluid, settings) = fixture();
        let synth = Synth::new(&settings).expect("synth");
        let id = synth.load_soundfont("stuck.sf2", true).expect("load");
        fluid.fail_soundfont_unload("stuck.sf2");

        assert!(synth.unload_soundfont("stuck.sf2", true).is_err());
        assert_eq!(Some(id), synth.soundfont_id("stuck.sf2"));
    }

    #[test]
    fn test_program_select() {
        let (fluid, settings) = fixture();
        let synth = Synth::new(&settings).expect("synth");
        let id = synth.load_soundfont("piano.sf2", true).expect("load");

        assert!(synth.program_select(0, "piano.sf2", 0, 0).expect("select"));
        assert!(fluid.calls().contains(&Call::ProgramSelect {
            channel: 0,
            sfont_id: id,
            bank: 0,
            preset: 0
        }));
        assert!(matches!(
            synth.program_select(0, "organ.sf2", 0, 0),
            Err(Error::Soundfont { .. })
        ));
    }

    #[test]
    fn test_close_reports_failed_unloads() {
        let (fluid, settings) = fixture();
        let synth = Synth::new(&settings).expect("synth");
        synth.load_soundfont("a.sf2", true).expect("load");
        synth.load_soundfont("b.sf2", true).expect("load");
        synth.load_soundfont("c.sf2", true).expect("load");
        fluid.fail_soundfont_unload("a.sf2");
        fluid.fail_soundfont_unload("c.sf2");

        match synth.close() {
            Err(Error::Teardown(paths)) => assert_eq!(
                vec![PathBuf::from("a.sf2"), PathBuf::from("c.sf2")],
                paths
            ),
            other => panic!("expected teardown error, got {:?}", other),
        }

        // Only the settings remain; the synth was deleted regardless.
        assert_eq!(1, fluid.live_handles());
        assert!(fluid.calls().contains(&Call::DeleteSynth));
    }

    #[test]
    fn test_drop_unloads_everything() {
        let (fluid, settings) = fixture();
        {
            let synth = Synth::new(&settings).expect("synth");
            synth.load_soundfont("a.sf2", true).expect("load");
            synth.load_soundfont("b.sf2", true).expect("load");
        }

        let calls = fluid.calls();
        assert_eq!(
            2,
            calls
                .iter()
                .filter(|call| matches!(call, Call::SfUnload { reset: true, .. }))
                .count()
        );
        assert_eq!(Some(&Call::DeleteSynth), calls.last());
        assert_eq!(1, fluid.live_handles());
    }
}
