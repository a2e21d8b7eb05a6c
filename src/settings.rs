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
    cell::Cell,
    ffi::{c_double, c_int, CString},
    fmt,
    ptr::NonNull,
    str::FromStr,
    sync::Arc,
};

use tracing::debug;

use crate::{
    error::{Error, Result},
    fluid::{
        fluid_settings_t, Fluid, FLUID_INT_TYPE, FLUID_NUM_TYPE, FLUID_OK, FLUID_SET_TYPE,
        FLUID_STR_TYPE,
    },
    util::string_from_buffer,
};

/// Size of the buffer string settings are copied into.
const STRING_BUFFER_SIZE: usize = 1024;

const CHORUS_ACTIVE: &str = "synth.chorus.active";
const REVERB_ACTIVE: &str = "synth.reverb.active";
const SAMPLE_RATE: &str = "synth.sample-rate";

/// The native type of a settings key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingType {
    None,
    Num,
    Int,
    Str,
    Set,
}

impl From<c_int> for SettingType {
    fn from(tag: c_int) -> Self {
        match tag {
            FLUID_NUM_TYPE => SettingType::Num,
            FLUID_INT_TYPE => SettingType::Int,
            FLUID_STR_TYPE => SettingType::Str,
            FLUID_SET_TYPE => SettingType::Set,
            _ => SettingType::None,
        }
    }
}

/// A settings value as it crosses the native boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Int(i32),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(num) => write!(f, "{}", num),
            Value::Int(int) => write!(f, "{}", int),
            Value::Str(string) => write!(f, "{}", string),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Num(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Int(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

/// Coerces a string destined for a numeric key. Integers parse literally,
/// "false", "no" and "off" are 0 in any case, and everything else is 1.
pub fn coerce_to_int(value: &str) -> i32 {
    if let Ok(int) = value.trim().parse::<i32>() {
        return int;
    }

    match value.to_lowercase().as_str() {
        "false" | "no" | "off" => 0,
        _ => 1,
    }
}

/// Rendering presets that toggle chorus, reverb and the sample rate together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    /// Returns the (chorus, reverb, sample rate) triple for the preset.
    fn preset(&self) -> (i32, i32, f64) {
        match self {
            Quality::Low => (0, 0, 22050.0),
            Quality::Medium => (0, 1, 44100.0),
            Quality::High => (1, 1, 44100.0),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        })
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "med" | "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            _ => Err(format!("unknown quality {}, expected low, med or high", s)),
        }
    }
}

/// A native settings table. Every key has a fixed native type which is queried
/// on each access.
pub struct Settings {
    fluid: Arc<dyn Fluid>,
    handle: NonNull<fluid_settings_t>,
    quality: Cell<Option<Quality>>,
}

impl Settings {
    /// Creates a settings table with the medium quality preset applied.
    pub fn new(fluid: Arc<dyn Fluid>) -> Result<Settings> {
        // SAFETY: no preconditions.
        let handle = NonNull::new(unsafe { fluid.new_settings() }).ok_or(Error::Create("settings"))?;
        let settings = Settings {
            fluid,
            handle,
            quality: Cell::new(None),
        };
        settings.set_quality(Quality::Medium)?;
        Ok(settings)
    }

    pub(crate) fn fluid(&self) -> &Arc<dyn Fluid> {
        &self.fluid
    }

    pub(crate) fn as_ptr(&self) -> *mut fluid_settings_t {
        self.handle.as_ptr()
    }

    /// Returns the native type of the given key.
    pub fn setting_type(&self, key: &str) -> Result<SettingType> {
        let name = CString::new(key)?;
        // SAFETY: the handle is live for as long as self.
        Ok(unsafe { self.fluid.settings_get_type(self.as_ptr(), &name) }.into())
    }

    /// Reads a key through the getter matching its native type.
    pub fn get(&self, key: &str) -> Result<Value> {
        let name = CString::new(key)?;
        let not_found = || Error::KeyNotFound(key.to_string());

        // SAFETY: the handle is live and the out parameters outlive the calls.
        unsafe {
            match self.setting_type(key)? {
                SettingType::Num => {
                    let mut value: c_double = 0.0;
                    if self.fluid.settings_getnum(self.as_ptr(), &name, &mut value) != FLUID_OK {
                        return Err(not_found());
                    }
                    Ok(Value::Num(value))
                }
                SettingType::Int => {
                    let mut value: c_int = 0;
                    if self.fluid.settings_getint(self.as_ptr(), &name, &mut value) != FLUID_OK {
                        return Err(not_found());
                    }
                    Ok(Value::Int(value))
                }
                SettingType::Str => {
                    let mut buf = vec![0u8; STRING_BUFFER_SIZE];
                    if self.fluid.settings_copystr(self.as_ptr(), &name, &mut buf) != FLUID_OK {
                        return Err(not_found());
                    }
                    Ok(Value::Str(string_from_buffer(&buf)))
                }
                SettingType::None | SettingType::Set => Err(not_found()),
            }
        }
    }

    /// Writes a key, coercing the value to the key's native type.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let name = CString::new(key)?;

        // SAFETY: the handle is live for as long as self.
        let status = unsafe {
            match self.setting_type(key)? {
                SettingType::Str => {
                    let string = CString::new(value.to_string())?;
                    self.fluid.settings_setstr(self.as_ptr(), &name, &string)
                }
                SettingType::Num => {
                    let num = match &value {
                        Value::Num(num) => *num,
                        Value::Int(int) => f64::from(*int),
                        Value::Str(string) => f64::from(coerce_to_int(string)),
                    };
                    self.fluid.settings_setnum(self.as_ptr(), &name, num)
                }
                SettingType::Int => {
                    let int = match &value {
                        Value::Num(num) => *num as i32,
                        Value::Int(int) => *int,
                        Value::Str(string) => coerce_to_int(string),
                    };
                    self.fluid.settings_setint(self.as_ptr(), &name, int)
                }
                SettingType::None | SettingType::Set => {
                    return Err(Error::KeyNotFound(key.to_string()))
                }
            }
        };

        if status != FLUID_OK {
            return Err(Error::KeyNotFound(key.to_string()));
        }

        debug!(key, value = %value, "Setting updated.");
        Ok(())
    }

    /// Returns the last quality preset that was applied in full.
    pub fn quality(&self) -> Option<Quality> {
        self.quality.get()
    }

    /// Applies a quality preset.
    pub fn set_quality(&self, quality: Quality) -> Result<()> {
        let (chorus, reverb, sample_rate) = quality.preset();
        self.set(CHORUS_ACTIVE, chorus)?;
        self.set(REVERB_ACTIVE, reverb)?;
        self.set(SAMPLE_RATE, sample_rate)?;
        self.quality.set(Some(quality));
        Ok(())
    }
}

impl Drop for Settings {
    fn drop(&mut self) {
        // SAFETY: the handle is deleted exactly once, here.
        unsafe { self.fluid.delete_settings(self.as_ptr()) };
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{coerce_to_int, Quality, SettingType, Settings, Value};
    use crate::{error::Error, fluid::mock};

    fn settings() -> (Arc<mock::Fluid>, Settings) {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings should be created");
        (fluid, settings)
    }

    #[test]
    fn test_coerce_to_int() {
        assert_eq!(0, coerce_to_int("false"));
        assert_eq!(0, coerce_to_int("FALSE"));
        assert_eq!(0, coerce_to_int("no"));
        assert_eq!(0, coerce_to_int("Off"));
        assert_eq!(1, coerce_to_int("yes"));
        assert_eq!(1, coerce_to_int("anything"));
        assert_eq!(5, coerce_to_int("5"));
        assert_eq!(-3, coerce_to_int("-3"));
    }

    #[test]
    fn test_quality_presets() {
        let (_fluid, settings) = settings();
        assert_eq!(Some(Quality::Medium), settings.quality());

        for (quality, chorus, reverb, rate) in [
            (Quality::Low, 0, 0, 22050.0),
            (Quality::Medium, 0, 1, 44100.0),
            (Quality::High, 1, 1, 44100.0),
        ] {
            settings.set_quality(quality).expect("preset should apply");
            assert_eq!(Some(quality), settings.quality());
            assert_eq!(
                Value::Int(chorus),
                settings.get("synth.chorus.active").expect("chorus")
            );
            assert_eq!(
                Value::Int(reverb),
                settings.get("synth.reverb.active").expect("reverb")
            );
            assert_eq!(
                Value::Num(rate),
                settings.get("synth.sample-rate").expect("sample rate")
            );
        }
    }

    #[test]
    fn test_quality_from_str() {
        assert_eq!(Ok(Quality::Low), "low".parse());
        assert_eq!(Ok(Quality::Medium), "med".parse());
        assert_eq!(Ok(Quality::Medium), "Medium".parse());
        assert_eq!(Ok(Quality::High), "high".parse());
        assert!("ultra".parse::<Quality>().is_err());
    }

    #[test]
    fn test_round_trips() {
        let (_fluid, settings) = settings();

        settings.set("synth.polyphony", 64).expect("polyphony");
        assert_eq!(Value::Int(64), settings.get("synth.polyphony").expect("get"));

        settings.set("synth.gain", 0.5).expect("gain");
        assert_eq!(Value::Num(0.5), settings.get("synth.gain").expect("get"));

        settings.set("audio.driver", "alsa").expect("driver");
        assert_eq!(
            Value::Str("alsa".to_string()),
            settings.get("audio.driver").expect("get")
        );
    }

    #[test]
    fn test_coercion_on_set() {
        let (_fluid, settings) = settings();

        settings.set("synth.reverb.active", "off").expect("reverb");
        assert_eq!(Value::Int(0), settings.get("synth.reverb.active").expect("get"));
        settings.set("synth.reverb.active", "yes").expect("reverb");
        assert_eq!(Value::Int(1), settings.get("synth.reverb.active").expect("get"));
        settings.set("synth.chorus.active", false).expect("chorus");
        assert_eq!(Value::Int(0), settings.get("synth.chorus.active").expect("get"));

        // Integer keys truncate floats, numeric keys widen integers.
        settings.set("synth.polyphony", 31.9).expect("polyphony");
        assert_eq!(Value::Int(31), settings.get("synth.polyphony").expect("get"));
        settings.set("synth.sample-rate", "48000").expect("rate");
        assert_eq!(Value::Num(48000.0), settings.get("synth.sample-rate").expect("get"));

        // String keys take the string form of whatever they are given.
        settings.set("audio.driver", 5).expect("driver");
        assert_eq!(
            Value::Str("5".to_string()),
            settings.get("audio.driver").expect("get")
        );
    }

    #[test]
    fn test_missing_keys() {
        let (_fluid, settings) = settings();

        assert_eq!(
            SettingType::None,
            settings.setting_type("synth.missing").expect("type")
        );
        assert!(matches!(
            settings.get("synth.missing"),
            Err(Error::KeyNotFound(key)) if key == "synth.missing"
        ));
        assert!(matches!(
            settings.set("synth.missing", 1),
            Err(Error::KeyNotFound(_))
        ));

        assert_eq!(SettingType::Set, settings.setting_type("synth").expect("type"));
        assert!(matches!(settings.get("synth"), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn test_drop_releases_native_settings() {
        let (fluid, settings) = settings();
        assert_eq!(1, fluid.live_handles());
        drop(settings);
        assert_eq!(0, fluid.live_handles());
    }
}
