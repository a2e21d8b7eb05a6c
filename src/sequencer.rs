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
//! Tick based scheduling of events to synths and to Rust callbacks.
//!
//! The sequencer keeps its own tempo, expressed as beats per minute and ticks
//! per beat, and pushes the derived ticks per second to the native sequencer
//! whenever either of them changes.
use std::{
    collections::HashMap,
    ffi::{c_int, c_uint, c_void, CString},
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
    ptr::NonNull,
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Error, Result},
    event::Event,
    fluid::{
        fluid_event_t, fluid_sequencer_t, fluid_synth_t, same_backend, ClientId, Fluid, FLUID_OK,
        FLUID_SEQ_UNREGISTERING, FLUID_TRUE,
    },
    synth::Synth,
    util::string_from_native,
};

pub const DEFAULT_BEATS_PER_MINUTE: u32 = 120;
pub const DEFAULT_TICKS_PER_BEAT: u32 = 120;

/// A client registered with the native sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
}

/// What a callback client learns about each event delivered to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub time: u32,
    pub source: ClientId,
    pub dest: ClientId,
}

type Handler = Box<dyn FnMut(Delivery) + Send>;

/// State handed to the native sequencer as callback data. Boxed so its address
/// stays fixed while the native side holds it.
struct Callback {
    fluid: Arc<dyn Fluid>,
    handler: Mutex<Handler>,
}

unsafe extern "C" fn deliver(
    time: c_uint,
    event: *mut fluid_event_t,
    _seq: *mut fluid_sequencer_t,
    data: *mut c_void,
) {
    if data.is_null() || event.is_null() {
        return;
    }
    let callback = &*(data as *const Callback);
    // Notices of the client being unregistered are not deliveries.
    if callback.fluid.event_get_type(event) == FLUID_SEQ_UNREGISTERING {
        debug!(
            dest = callback.fluid.event_get_dest(event),
            "Callback client unregistered."
        );
        return;
    }
    let delivery = Delivery {
        time,
        source: callback.fluid.event_get_source(event),
        dest: callback.fluid.event_get_dest(event),
    };

    // Unwinding into native code is undefined, so panics stop here.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut handler = callback.handler.lock();
        (*handler)(delivery)
    }));
    if result.is_err() {
        error!(dest = delivery.dest, "Sequencer callback panicked.");
    }
}

/// A native sequencer. Synths added to it must outlive it.
pub struct Sequencer<'a> {
    fluid: Arc<dyn Fluid>,
    handle: NonNull<fluid_sequencer_t>,
    beats_per_minute: u32,
    ticks_per_beat: u32,
    synths: HashMap<*const fluid_synth_t, Client>,
    callbacks: HashMap<ClientId, Box<Callback>>,
    _synths: PhantomData<&'a Synth<'a>>,
}

impl<'a> Sequencer<'a> {
    /// Creates a sequencer driven by the system timer.
    pub fn new(fluid: Arc<dyn Fluid>) -> Result<Sequencer<'a>> {
        Self::with_system_timer(fluid, true)
    }

    /// Creates a sequencer. Without the system timer, time only advances as
    /// the synths registered with it render audio.
    pub fn with_system_timer(fluid: Arc<dyn Fluid>, use_system_timer: bool) -> Result<Sequencer<'a>> {
        // SAFETY: no preconditions.
        let handle = NonNull::new(unsafe { fluid.new_sequencer(c_int::from(use_system_timer)) })
            .ok_or(Error::Create("sequencer"))?;

        let sequencer = Sequencer {
            fluid,
            handle,
            beats_per_minute: DEFAULT_BEATS_PER_MINUTE,
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
            synths: HashMap::new(),
            callbacks: HashMap::new(),
            _synths: PhantomData,
        };
        sequencer.push_time_scale();
        Ok(sequencer)
    }

    /// Creates a sequencer driven by the system timer with every synth
    /// already registered as a destination.
    pub fn with_synths(fluid: Arc<dyn Fluid>, synths: &[&'a Synth<'a>]) -> Result<Sequencer<'a>> {
        let mut sequencer = Self::new(fluid)?;
        for &synth in synths {
            sequencer.add_synth(synth)?;
        }
        Ok(sequencer)
    }

    fn as_ptr(&self) -> *mut fluid_sequencer_t {
        self.handle.as_ptr()
    }

    fn push_time_scale(&self) {
        let scale = f64::from(self.ticks_per_beat) * f64::from(self.beats_per_minute) / 60.0;
        debug!(
            bpm = self.beats_per_minute,
            tpb = self.ticks_per_beat,
            scale,
            "Updating sequencer time scale."
        );
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.sequencer_set_time_scale(self.as_ptr(), scale) };
    }

    fn client_name(&self, id: ClientId) -> String {
        // SAFETY: the handle is live and the name is copied before anything
        // can unregister the client.
        unsafe { string_from_native(self.fluid.sequencer_get_client_name(self.as_ptr(), id)) }
    }

    /// Registers a synth as a destination. Registering the same synth again
    /// creates another native client and only the newest is remembered.
    pub fn add_synth(&mut self, synth: &'a Synth<'a>) -> Result<Client> {
        if !same_backend(&self.fluid, synth.fluid()) {
            return Err(Error::MismatchedBackend("synth"));
        }
        // SAFETY: both handles are live and from this backend, and the synth
        // outlives the sequencer.
        let id = unsafe {
            self.fluid
                .sequencer_register_fluidsynth(self.as_ptr(), synth.as_ptr())
        };
        if id < 0 {
            return Err(Error::Sequencer("synth could not be registered".to_string()));
        }

        let client = Client {
            id,
            name: self.client_name(id),
        };
        info!(id, name = %client.name, "Registered synth with sequencer.");
        self.synths
            .insert(synth.as_ptr() as *const fluid_synth_t, client.clone());
        Ok(client)
    }

    /// Unregisters a synth, returning the client it was registered as.
    pub fn remove_synth(&mut self, synth: &Synth) -> Option<Client> {
        if !same_backend(&self.fluid, synth.fluid()) {
            return None;
        }
        let client = self.synths.remove(&(synth.as_ptr() as *const fluid_synth_t))?;
        // SAFETY: the handle is live for as long as self.
        unsafe {
            self.fluid
                .sequencer_unregister_client(self.as_ptr(), client.id)
        };
        info!(id = client.id, "Removed synth from sequencer.");
        Some(client)
    }

    /// Returns the client a synth is registered as.
    pub fn client(&self, synth: &Synth) -> Option<&Client> {
        if !same_backend(&self.fluid, synth.fluid()) {
            return None;
        }
        self.synths.get(&(synth.as_ptr() as *const fluid_synth_t))
    }

    /// Registers a callback as a destination. The callback may run on a native
    /// timer thread.
    pub fn register_client<F>(&mut self, name: &str, handler: F) -> Result<ClientId>
    where
        F: FnMut(Delivery) + Send + 'static,
    {
        let native_name = CString::new(name)?;
        let callback = Box::new(Callback {
            fluid: self.fluid.clone(),
            handler: Mutex::new(Box::new(handler)),
        });
        let data = &*callback as *const Callback as *mut c_void;

        // SAFETY: the callback data is kept alive until the native sequencer
        // is deleted or the client is unregistered.
        let id = unsafe {
            self.fluid
                .sequencer_register_client(self.as_ptr(), &native_name, Some(deliver), data)
        };
        if id < 0 {
            return Err(Error::Sequencer(format!(
                "client {} could not be registered",
                name
            )));
        }

        info!(id, name, "Registered callback client with sequencer.");
        self.callbacks.insert(id, callback);
        Ok(id)
    }

    /// Unregisters any client by id.
    pub fn unregister_client(&mut self, id: ClientId) {
        // SAFETY: the handle is live for as long as self. The callback data is
        // released only after the native side lets go of it.
        unsafe { self.fluid.sequencer_unregister_client(self.as_ptr(), id) };
        self.callbacks.remove(&id);
        self.synths.retain(|_, client| client.id != id);
    }

    /// Returns every client known to the native sequencer.
    pub fn clients(&self) -> Vec<Client> {
        (0..self.client_count() as c_int)
            .map(|index| {
                // SAFETY: the handle is live for as long as self.
                let id = unsafe { self.fluid.sequencer_get_client_id(self.as_ptr(), index) };
                Client {
                    id,
                    name: self.client_name(id),
                }
            })
            .collect()
    }

    pub fn client_count(&self) -> usize {
        // SAFETY: the handle is live for as long as self.
        let count = unsafe { self.fluid.sequencer_count_clients(self.as_ptr()) };
        usize::try_from(count).unwrap_or(0)
    }

    /// Returns true if the client accepts events.
    pub fn is_destination(&self, id: ClientId) -> bool {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.sequencer_client_is_dest(self.as_ptr(), id) == FLUID_TRUE }
    }

    pub fn beats_per_minute(&self) -> u32 {
        self.beats_per_minute
    }

    /// Sets the tempo. Zero is refused, since FluidSynth ignores a zero rate.
    pub fn set_beats_per_minute(&mut self, beats_per_minute: u32) -> Result<()> {
        if beats_per_minute == 0 {
            return Err(Error::Sequencer("beats per minute must be positive".to_string()));
        }
        self.beats_per_minute = beats_per_minute;
        self.push_time_scale();
        Ok(())
    }

    pub fn ticks_per_beat(&self) -> u32 {
        self.ticks_per_beat
    }

    pub fn set_ticks_per_beat(&mut self, ticks_per_beat: u32) -> Result<()> {
        if ticks_per_beat == 0 {
            return Err(Error::Sequencer("ticks per beat must be positive".to_string()));
        }
        self.ticks_per_beat = ticks_per_beat;
        self.push_time_scale();
        Ok(())
    }

    /// Returns the rate the native sequencer is running at.
    pub fn ticks_per_second(&self) -> f64 {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.sequencer_get_time_scale(self.as_ptr()) }
    }

    /// Sets the rate directly. Ticks per beat are kept, so the rate must come
    /// out to a whole number of beats per minute.
    pub fn set_ticks_per_second(&mut self, ticks_per_second: f64) -> Result<()> {
        let beats_per_minute = ticks_per_second * 60.0 / f64::from(self.ticks_per_beat);
        if !beats_per_minute.is_finite()
            || beats_per_minute < 1.0
            || beats_per_minute > f64::from(u32::MAX)
            || beats_per_minute.fract() != 0.0
        {
            return Err(Error::Sequencer(format!(
                "{} ticks per second is not a whole tempo at {} ticks per beat",
                ticks_per_second, self.ticks_per_beat
            )));
        }
        self.set_beats_per_minute(beats_per_minute as u32)
    }

    /// Returns the current tick.
    pub fn ticks(&self) -> u32 {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.sequencer_get_tick(self.as_ptr()) }
    }

    /// Schedules an event at an absolute tick.
    pub fn send(&self, event: &Event, ticks: u32) -> bool {
        self.send_at(event, ticks, true)
    }

    /// Schedules an event the given number of ticks from now.
    pub fn send_relative(&self, event: &Event, ticks: u32) -> bool {
        self.send_at(event, ticks, false)
    }

    fn send_at(&self, event: &Event, ticks: u32, absolute: bool) -> bool {
        if !same_backend(&self.fluid, event.fluid()) {
            warn!(ticks, "Refusing event from a different FluidSynth instance.");
            return false;
        }
        // SAFETY: the handles are live and from this backend; the native side
        // copies the event.
        unsafe {
            self.fluid.sequencer_send_at(
                self.as_ptr(),
                event.as_ptr(),
                ticks,
                c_int::from(absolute),
            ) == FLUID_OK
        }
    }

    /// Dispatches an event without scheduling it.
    pub fn send_immediately(&self, event: &Event) {
        if !same_backend(&self.fluid, event.fluid()) {
            warn!("Refusing event from a different FluidSynth instance.");
            return;
        }
        // SAFETY: the handles are live and from this backend.
        unsafe { self.fluid.sequencer_send_now(self.as_ptr(), event.as_ptr()) }
    }
}

impl Drop for Sequencer<'_> {
    fn drop(&mut self) {
        debug!(clients = self.callbacks.len(), "Deleting sequencer.");
        // SAFETY: the handle is deleted exactly once, here. The callbacks are
        // still alive since fields drop after this returns.
        unsafe { self.fluid.delete_sequencer(self.as_ptr()) };
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::{Delivery, Sequencer};
    use crate::{
        error::Error,
        event::Event,
        fluid::mock::{self, Call},
        settings::Settings,
        synth::Synth,
    };

    #[test]
    fn test_tempo() {
        let fluid = Arc::new(mock::Fluid::new());
        let mut sequencer = Sequencer::new(fluid.clone()).expect("sequencer");

        assert_eq!(120, sequencer.beats_per_minute());
        assert_eq!(120, sequencer.ticks_per_beat());
        assert_eq!(240.0, sequencer.ticks_per_second());

        sequencer.set_ticks_per_beat(120).expect("tpb");
        sequencer.set_beats_per_minute(120).expect("bpm");
        assert_eq!(240.0, sequencer.ticks_per_second());

        sequencer.set_beats_per_minute(60).expect("bpm");
        assert_eq!(120.0, sequencer.ticks_per_second());

        sequencer.set_ticks_per_beat(480).expect("tpb");
        assert_eq!(480.0, sequencer.ticks_per_second());
        assert!(fluid.calls().contains(&Call::SetTimeScale { scale: 480.0 }));
    }

    #[test]
    fn test_zero_tempo_is_refused() {
        let fluid = Arc::new(mock::Fluid::new());
        let mut sequencer = Sequencer::new(fluid.clone()).expect("sequencer");

        assert!(matches!(
            sequencer.set_beats_per_minute(0),
            Err(Error::Sequencer(_))
        ));
        assert!(matches!(
            sequencer.set_ticks_per_beat(0),
            Err(Error::Sequencer(_))
        ));
        assert_eq!(120, sequencer.beats_per_minute());
        assert_eq!(120, sequencer.ticks_per_beat());
        assert_eq!(240.0, sequencer.ticks_per_second());
        assert!(!fluid.calls().contains(&Call::SetTimeScale { scale: 0.0 }));
    }

    #[test]
    fn test_set_ticks_per_second() {
        let fluid = Arc::new(mock::Fluid::new());
        let mut sequencer = Sequencer::new(fluid.clone()).expect("sequencer");

        sequencer.set_ticks_per_second(480.0).expect("tps");
        assert_eq!(240, sequencer.beats_per_minute());
        assert_eq!(120, sequencer.ticks_per_beat());
        assert_eq!(480.0, sequencer.ticks_per_second());

        sequencer.set_ticks_per_second(100.0).expect("tps");
        assert_eq!(50, sequencer.beats_per_minute());

        for rate in [0.0, -240.0, 1.0, f64::NAN] {
            assert!(sequencer.set_ticks_per_second(rate).is_err());
        }
        assert_eq!(50, sequencer.beats_per_minute());
        assert_eq!(100.0, sequencer.ticks_per_second());
    }

    #[test]
    fn test_system_timer_flag() {
        let fluid = Arc::new(mock::Fluid::new());
        let _sequencer = Sequencer::with_system_timer(fluid.clone(), false).expect("sequencer");
        assert!(fluid
            .calls()
            .contains(&Call::NewSequencer { system_timer: false }));
    }

    #[test]
    fn test_note_to_synth() {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings");
        let synth = Synth::new(&settings).expect("synth");
        let mut sequencer = Sequencer::new(fluid.clone()).expect("sequencer");

        let client = sequencer.add_synth(&synth).expect("add synth");
        assert_eq!("fluidsynth", client.name);
        assert!(sequencer.is_destination(client.id));
        assert_eq!(Some(&client), sequencer.client(&synth));

        let event = Event::new(fluid.clone()).expect("event");
        event.set_dest(client.id);
        event.note(0, 60, 127, 100);
        assert!(sequencer.send(&event, sequencer.ticks() + 10));
        assert!(sequencer.send_relative(&event, 10));

        // Unroutable events are refused.
        event.set_dest(42);
        assert!(!sequencer.send(&event, 10));
        assert!(!sequencer.is_destination(42));
    }

    #[test]
    fn test_synth_registered_twice() {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings");
        let synth = Synth::new(&settings).expect("synth");
        let mut sequencer = Sequencer::new(fluid.clone()).expect("sequencer");

        let first = sequencer.add_synth(&synth).expect("add synth");
        let second = sequencer.add_synth(&synth).expect("add synth again");
        assert_ne!(first.id, second.id);
        assert_eq!(Some(&second), sequencer.client(&synth));
        assert_eq!(2, sequencer.client_count());
        assert_eq!(vec![first.clone(), second.clone()], sequencer.clients());

        assert_eq!(Some(second.clone()), sequencer.remove_synth(&synth));
        assert_eq!(None, sequencer.client(&synth));
        assert_eq!(vec![first], sequencer.clients());
        assert!(fluid
            .calls()
            .contains(&Call::UnregisterClient { id: second.id }));
    }

    #[test]
    fn test_callback_client() {
        let fluid = Arc::new(mock::Fluid::new());
        let mut sequencer = Sequencer::new(fluid.clone()).expect("sequencer");

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let id = sequencer
            .register_client("recorder", move |delivery| sink.lock().push(delivery))
            .expect("register");
        assert!(sequencer.is_destination(id));
        assert_eq!("recorder", sequencer.clients()[0].name);

        let event = Event::new(fluid.clone()).expect("event");
        event.timer();
        event.set_source(-1);
        event.set_dest(id);
        assert!(sequencer.send(&event, sequencer.ticks() + 10));

        fluid.advance(5);
        assert!(received.lock().is_empty());
        fluid.advance(5);
        assert_eq!(
            vec![Delivery {
                time: 10,
                source: -1,
                dest: id
            }],
            *received.lock()
        );

        sequencer.send_immediately(&event);
        assert_eq!(2, received.lock().len());
        assert_eq!(10, received.lock()[1].time);

        sequencer.unregister_client(id);
        assert_eq!(0, sequencer.client_count());
        assert!(!sequencer.send(&event, 20));
        // The unregistering notice is not passed on.
        assert_eq!(2, received.lock().len());
    }

    #[test]
    fn test_drop_releases_callbacks() {
        let fluid = Arc::new(mock::Fluid::new());
        let counter = Arc::new(Mutex::new(0));
        {
            let mut sequencer = Sequencer::new(fluid.clone()).expect("sequencer");
            let captured = counter.clone();
            sequencer
                .register_client("counter", move |_| *captured.lock() += 1)
                .expect("register");
            assert_eq!(2, Arc::strong_count(&counter));
        }
        assert_eq!(1, Arc::strong_count(&counter));
        assert_eq!(0, *counter.lock());
        assert_eq!(0, fluid.live_handles());
        assert_eq!(Some(&Call::DeleteSequencer), fluid.calls().last());
    }

    #[test]
    fn test_with_synths() {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings");
        let piano = Synth::new(&settings).expect("synth");
        let strings = Synth::new(&settings).expect("synth");

        let sequencer = Sequencer::with_synths(fluid.clone(), &[&piano, &strings]).expect("sequencer");
        assert_eq!(2, sequencer.client_count());
        assert_eq!(Some(0), sequencer.client(&piano).map(|client| client.id));
        assert_eq!(Some(1), sequencer.client(&strings).map(|client| client.id));
        assert!(fluid.calls().contains(&Call::SetTimeScale { scale: 240.0 }));
    }

    #[test]
    fn test_foreign_objects_are_refused() {
        let fluid = Arc::new(mock::Fluid::new());
        let other = Arc::new(mock::Fluid::new());
        let settings = Settings::new(other.clone()).expect("settings");
        let foreign_synth = Synth::new(&settings).expect("synth");
        let mut sequencer = Sequencer::new(fluid.clone()).expect("sequencer");

        assert!(matches!(
            sequencer.add_synth(&foreign_synth),
            Err(Error::MismatchedBackend("synth"))
        ));
        assert_eq!(None, sequencer.client(&foreign_synth));
        assert_eq!(None, sequencer.remove_synth(&foreign_synth));
        assert_eq!(0, sequencer.client_count());

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let id = sequencer
            .register_client("recorder", move |delivery| sink.lock().push(delivery))
            .expect("register");

        let foreign_event = Event::new(other.clone()).expect("event");
        foreign_event.timer();
        foreign_event.set_dest(id);
        assert!(!sequencer.send(&foreign_event, 10));
        assert!(!sequencer.send_relative(&foreign_event, 10));
        sequencer.send_immediately(&foreign_event);
        fluid.advance(20);
        assert!(received.lock().is_empty());
        assert!(!fluid
            .calls()
            .iter()
            .any(|call| matches!(call, Call::SendAt { .. } | Call::SendNow { .. })));
    }

    #[test]
    fn test_unregistering_is_not_delivered() {
        let fluid = Arc::new(mock::Fluid::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        {
            let mut sequencer = Sequencer::new(fluid.clone()).expect("sequencer");
            let first = received.clone();
            let removed = sequencer
                .register_client("first", move |delivery| first.lock().push(delivery))
                .expect("register");
            let second = received.clone();
            sequencer
                .register_client("second", move |delivery| second.lock().push(delivery))
                .expect("register");

            sequencer.unregister_client(removed);
            assert_eq!(1, sequencer.client_count());
        }
        assert!(received.lock().is_empty());
        assert_eq!(0, fluid.live_handles());
    }
}
