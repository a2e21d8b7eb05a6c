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
use std::{ptr, ptr::NonNull, sync::Arc};

use crate::{
    error::{Error, Result},
    fluid::{fluid_event_t, ClientId, Fluid},
};

/// A single sequencer event. The kind setters overwrite each other; whichever
/// was called last is what gets delivered.
pub struct Event {
    fluid: Arc<dyn Fluid>,
    handle: NonNull<fluid_event_t>,
}

impl Event {
    /// Creates a blank event with no source or destination.
    pub fn new(fluid: Arc<dyn Fluid>) -> Result<Event> {
        // SAFETY: no preconditions.
        let handle = NonNull::new(unsafe { fluid.new_event() }).ok_or(Error::Create("event"))?;
        let event = Event { fluid, handle };
        event.set_source(-1);
        event.set_dest(-1);
        Ok(event)
    }

    pub(crate) fn fluid(&self) -> &Arc<dyn Fluid> {
        &self.fluid
    }

    pub(crate) fn as_ptr(&self) -> *mut fluid_event_t {
        self.handle.as_ptr()
    }

    pub fn source(&self) -> ClientId {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.event_get_source(self.as_ptr()) }
    }

    pub fn set_source(&self, source: ClientId) {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.event_set_source(self.as_ptr(), source) }
    }

    pub fn dest(&self) -> ClientId {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.event_get_dest(self.as_ptr()) }
    }

    pub fn set_dest(&self, dest: ClientId) {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.event_set_dest(self.as_ptr(), dest) }
    }

    /// Turns the event into a timer, which does nothing but reach its client.
    pub fn timer(&self) {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.event_timer(self.as_ptr(), ptr::null_mut()) }
    }

    pub fn volume(&self, channel: i32, value: i32) {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.event_volume(self.as_ptr(), channel, value) }
    }

    /// A note on followed by a note off after `duration` ticks.
    pub fn note(&self, channel: i32, key: i16, velocity: i16, duration: u32) {
        // SAFETY: the handle is live for as long as self.
        unsafe {
            self.fluid
                .event_note(self.as_ptr(), channel, key, velocity, duration)
        }
    }

    pub fn note_on(&self, channel: i32, key: i16, velocity: i16) {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.event_noteon(self.as_ptr(), channel, key, velocity) }
    }

    pub fn note_off(&self, channel: i32, key: i16) {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.event_noteoff(self.as_ptr(), channel, key) }
    }

    pub fn pitch_bend(&self, channel: i32, value: i32) {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.event_pitch_bend(self.as_ptr(), channel, value) }
    }

    pub fn pitch_sensitivity(&self, channel: i32, amount: i32) {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.event_pitch_wheelsens(self.as_ptr(), channel, amount) }
    }

    pub fn program_change(&self, channel: i32, program: i32) {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.event_program_change(self.as_ptr(), channel, program) }
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        // SAFETY: the handle is deleted exactly once, here.
        unsafe { self.fluid.delete_event(self.as_ptr()) };
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::Event;
    use crate::fluid::mock::{self, EventKind, EventSnapshot};

    /// Reads what the mock holds for the event by sending it nowhere in particular.
    fn kind_of(fluid: &Arc<mock::Fluid>, event: &Event) -> Option<EventKind> {
        use crate::fluid::Fluid as _;

        // SAFETY: the sequencer is created and deleted within the call.
        unsafe {
            let seq = fluid.new_sequencer(0);
            fluid.sequencer_send_now(seq, event.as_ptr());
            fluid.delete_sequencer(seq);
        }
        fluid.calls().into_iter().rev().find_map(|call| match call {
            mock::Call::SendNow {
                event: EventSnapshot { kind, .. },
            } => kind,
            _ => None,
        })
    }

    #[test]
    fn test_blank_event_has_no_route() {
        let fluid = Arc::new(mock::Fluid::new());
        let event = Event::new(fluid.clone()).expect("event");
        assert_eq!(-1, event.source());
        assert_eq!(-1, event.dest());

        event.set_source(2);
        event.set_dest(5);
        assert_eq!(2, event.source());
        assert_eq!(5, event.dest());
    }

    #[test]
    fn test_last_kind_wins() {
        let fluid = Arc::new(mock::Fluid::new());
        let event = Event::new(fluid.clone()).expect("event");

        event.note(0, 60, 127, 100);
        assert_eq!(
            Some(EventKind::Note {
                channel: 0,
                key: 60,
                velocity: 127,
                duration: 100
            }),
            kind_of(&fluid, &event)
        );

        event.pitch_sensitivity(0, 12);
        event.program_change(1, 40);
        assert_eq!(
            Some(EventKind::ProgramChange {
                channel: 1,
                program: 40
            }),
            kind_of(&fluid, &event)
        );

        event.timer();
        assert_eq!(Some(EventKind::Timer), kind_of(&fluid, &event));
    }

    #[test]
    fn test_drop_releases_event() {
        let fluid = Arc::new(mock::Fluid::new());
        let event = Event::new(fluid.clone()).expect("event");
        assert_eq!(1, fluid.live_handles());
        drop(event);
        assert_eq!(0, fluid.live_handles());
    }
}
