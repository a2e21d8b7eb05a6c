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
use std::{marker::PhantomData, ptr::NonNull, sync::Arc};

use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    fluid::{fluid_audio_driver_t, same_backend, Fluid},
    settings::{Settings, Value},
    synth::Synth,
};

/// A live audio output rendering one synth. The binding is fixed at creation,
/// and the driver is released when dropped.
pub struct AudioDriver<'a> {
    fluid: Arc<dyn Fluid>,
    handle: NonNull<fluid_audio_driver_t>,
    _bound: PhantomData<(&'a Synth<'a>, &'a Settings)>,
}

impl<'a> AudioDriver<'a> {
    /// Starts audio output for the synth using the driver named in the settings.
    pub fn new(synth: &'a Synth<'a>, settings: &'a Settings) -> Result<AudioDriver<'a>> {
        let fluid = synth.fluid().clone();
        if !same_backend(&fluid, settings.fluid()) {
            return Err(Error::MismatchedBackend("settings"));
        }
        // SAFETY: both handles are live for 'a and come from the same backend.
        let handle = NonNull::new(unsafe { fluid.new_audio_driver(settings.as_ptr(), synth.as_ptr()) })
            .ok_or(Error::Create("audio driver"))?;

        match settings.get("audio.driver") {
            Ok(Value::Str(driver)) => info!(driver, "Started audio driver."),
            _ => info!("Started audio driver."),
        }

        Ok(AudioDriver {
            fluid,
            handle,
            _bound: PhantomData,
        })
    }
}

impl Drop for AudioDriver<'_> {
    fn drop(&mut self) {
        debug!("Stopping audio driver.");
        // SAFETY: the handle is deleted exactly once, here.
        unsafe { self.fluid.delete_audio_driver(self.handle.as_ptr()) };
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::AudioDriver;
    use crate::{
        error::Error,
        fluid::mock::{self, Call},
        settings::Settings,
        synth::Synth,
    };

    #[test]
    fn test_driver_lifecycle() {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings");
        let synth = Synth::new(&settings).expect("synth");

        let driver = AudioDriver::new(&synth, &settings).expect("driver");
        assert_eq!(3, fluid.live_handles());
        drop(driver);
        assert_eq!(2, fluid.live_handles());

        let calls = fluid.calls();
        let created = calls.iter().position(|call| *call == Call::NewAudioDriver);
        let deleted = calls.iter().position(|call| *call == Call::DeleteAudioDriver);
        assert!(created < deleted);
    }

    #[test]
    fn test_driver_rejects_foreign_settings() {
        let fluid = Arc::new(mock::Fluid::new());
        let other = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings");
        let foreign = Settings::new(other.clone()).expect("foreign settings");
        let synth = Synth::new(&settings).expect("synth");

        assert!(matches!(
            AudioDriver::new(&synth, &foreign),
            Err(Error::MismatchedBackend("settings"))
        ));
        assert!(!fluid.calls().contains(&Call::NewAudioDriver));
        assert!(!other.calls().contains(&Call::NewAudioDriver));
    }
}
