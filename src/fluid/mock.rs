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
    collections::{BTreeMap, HashMap, HashSet},
    ffi::{c_char, c_double, c_int, c_short, c_uint, c_void, CStr, CString},
    ptr,
};

use parking_lot::Mutex;
use tracing::debug;

use super::{
    fluid_audio_driver_t, fluid_event_t, fluid_player_t, fluid_sequencer_t, fluid_settings_t,
    fluid_synth_t, ClientId, EventCallback, FLUID_FAILED, FLUID_FALSE, FLUID_INT_TYPE,
    FLUID_NO_TYPE, FLUID_NUM_TYPE, FLUID_OK, FLUID_PLAYER_PLAYING, FLUID_PLAYER_READY,
    FLUID_SEQ_NOTE, FLUID_SEQ_NOTEOFF, FLUID_SEQ_NOTEON, FLUID_SEQ_PITCHBEND,
    FLUID_SEQ_PITCHWHEELSENS, FLUID_SEQ_PROGRAMCHANGE, FLUID_SEQ_TIMER, FLUID_SEQ_UNREGISTERING,
    FLUID_SEQ_VOLUME, FLUID_SET_TYPE, FLUID_STR_TYPE, FLUID_TRUE,
};

/// Status the mock player reports once playback has ended.
pub const PLAYER_DONE: c_int = 3;

/// The time scale a fresh native sequencer starts with.
pub const DEFAULT_TIME_SCALE: f64 = 1000.0;

/// The payload an event was configured with.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Timer,
    Volume {
        channel: i32,
        value: i32,
    },
    Note {
        channel: i32,
        key: i16,
        velocity: i16,
        duration: u32,
    },
    NoteOn {
        channel: i32,
        key: i16,
        velocity: i16,
    },
    NoteOff {
        channel: i32,
        key: i16,
    },
    PitchBend {
        channel: i32,
        value: i32,
    },
    PitchWheelSens {
        channel: i32,
        value: i32,
    },
    ProgramChange {
        channel: i32,
        program: i32,
    },
    /// Sent by the sequencer itself to a callback client that is going away.
    Unregistering,
}

impl EventKind {
    fn native_type(&self) -> c_int {
        match self {
            EventKind::Timer => FLUID_SEQ_TIMER,
            EventKind::Volume { .. } => FLUID_SEQ_VOLUME,
            EventKind::Note { .. } => FLUID_SEQ_NOTE,
            EventKind::NoteOn { .. } => FLUID_SEQ_NOTEON,
            EventKind::NoteOff { .. } => FLUID_SEQ_NOTEOFF,
            EventKind::PitchBend { .. } => FLUID_SEQ_PITCHBEND,
            EventKind::PitchWheelSens { .. } => FLUID_SEQ_PITCHWHEELSENS,
            EventKind::ProgramChange { .. } => FLUID_SEQ_PROGRAMCHANGE,
            EventKind::Unregistering => FLUID_SEQ_UNREGISTERING,
        }
    }
}

/// A copy of an event as it looked when it was handed to the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSnapshot {
    pub source: ClientId,
    pub dest: ClientId,
    pub kind: Option<EventKind>,
}

/// Every state-changing call the mock has received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    NewSettings,
    DeleteSettings,
    SetNum { name: String, value: f64 },
    SetInt { name: String, value: i32 },
    SetStr { name: String, value: String },
    NewSynth,
    DeleteSynth,
    SfLoad { path: String, reset: bool },
    SfReload { id: i32 },
    SfUnload { id: i32, reset: bool },
    NoteOn { channel: i32, key: i32, velocity: i32 },
    NoteOff { channel: i32, key: i32 },
    ControlChange { channel: i32, control: i32, value: i32 },
    PitchBend { channel: i32, value: i32 },
    PitchWheelSens { channel: i32, value: i32 },
    ProgramChange { channel: i32, program: i32 },
    BankSelect { channel: i32, bank: i32 },
    ProgramSelect { channel: i32, sfont_id: i32, bank: i32, preset: i32 },
    NewAudioDriver,
    DeleteAudioDriver,
    NewPlayer,
    DeletePlayer,
    PlayerAdd { path: String },
    PlayerPlay,
    PlayerStop,
    PlayerJoin,
    PlayerSetLoop { count: i32 },
    NewEvent,
    DeleteEvent,
    NewSequencer { system_timer: bool },
    DeleteSequencer,
    RegisterSynth { id: ClientId },
    RegisterClient { id: ClientId, name: String },
    UnregisterClient { id: ClientId },
    SendNow { event: EventSnapshot },
    SendAt { event: EventSnapshot, time: u32, absolute: bool },
    SetTimeScale { scale: f64 },
}

enum Setting {
    Num(f64),
    Int(i32),
    Str(String),
    Set,
}

struct Synth {
    soundfonts: BTreeMap<c_int, String>,
}

struct Player {
    status: c_int,
}

struct Client {
    name: CString,
    is_synth: bool,
    callback: Option<(EventCallback, usize)>,
}

struct Sequencer {
    time_scale: f64,
    tick: u32,
    next_client: ClientId,
    clients: BTreeMap<ClientId, Client>,
    scheduled: Vec<(u32, EventSnapshot)>,
}

/// An event that is due for a callback client.
struct Delivery {
    sequencer: usize,
    time: u32,
    event: EventSnapshot,
    callback: EventCallback,
    data: usize,
}

#[derive(Default)]
struct State {
    next_handle: usize,
    next_soundfont: c_int,
    settings: HashMap<usize, BTreeMap<String, Setting>>,
    synths: HashMap<usize, Synth>,
    drivers: HashSet<usize>,
    players: HashMap<usize, Player>,
    events: HashMap<usize, EventSnapshot>,
    sequencers: HashMap<usize, Sequencer>,
    calls: Vec<Call>,
    failing_loads: HashSet<String>,
    failing_unloads: HashSet<String>,
    failing_midi: HashSet<String>,
    failing_player_delete: bool,
}

impl State {
    fn handle(&mut self) -> usize {
        self.next_handle += 16;
        self.next_handle
    }
}

fn to_ptr<T>(handle: usize) -> *mut T {
    handle as *mut T
}

fn from_ptr<T>(ptr: *mut T) -> usize {
    ptr as usize
}

/// The notice a callback client gets when it is unregistered.
fn unregistering(sequencer: usize, tick: u32, id: ClientId, client: &Client) -> Option<Delivery> {
    client.callback.map(|(callback, data)| Delivery {
        sequencer,
        time: tick,
        event: EventSnapshot {
            source: -1,
            dest: id,
            kind: Some(EventKind::Unregistering),
        },
        callback,
        data,
    })
}

fn name_of(name: &CStr) -> String {
    name.to_string_lossy().into_owned()
}

fn status(ok: bool) -> c_int {
    if ok {
        FLUID_OK
    } else {
        FLUID_FAILED
    }
}

/// An in-process FluidSynth. Nothing is rendered; every call is validated the
/// way FluidSynth validates it and recorded so tests can inspect it.
pub struct Fluid {
    state: Mutex<State>,
}

impl Default for Fluid {
    fn default() -> Self {
        Self::new()
    }
}

impl Fluid {
    /// Creates a new mock with no native objects.
    pub fn new() -> Fluid {
        Fluid {
            state: Mutex::new(State {
                next_soundfont: 1,
                ..Default::default()
            }),
        }
    }

    /// Returns the calls recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Returns the number of native objects that have not been deleted.
    pub fn live_handles(&self) -> usize {
        let state = self.state.lock();
        state.settings.len()
            + state.synths.len()
            + state.drivers.len()
            + state.players.len()
            + state.events.len()
            + state.sequencers.len()
    }

    /// Makes loading and reloading the given soundfont fail.
    pub fn fail_soundfont_load(&self, path: &str) {
        self.state.lock().failing_loads.insert(path.to_string());
    }

    /// Makes unloading the given soundfont fail.
    pub fn fail_soundfont_unload(&self, path: &str) {
        self.state.lock().failing_unloads.insert(path.to_string());
    }

    /// Makes queueing the given MIDI file fail.
    pub fn fail_midi_file(&self, path: &str) {
        self.state.lock().failing_midi.insert(path.to_string());
    }

    /// Makes deleting players report a failure.
    pub fn fail_player_delete(&self) {
        self.state.lock().failing_player_delete = true;
    }

    /// Ends playback on every player as if the files ran out.
    pub fn finish_playback(&self) {
        let mut state = self.state.lock();
        for player in state.players.values_mut() {
            if player.status == FLUID_PLAYER_PLAYING {
                player.status = PLAYER_DONE;
            }
        }
    }

    /// Advances every sequencer clock and delivers events that became due to
    /// callback clients.
    pub fn advance(&self, ticks: u32) {
        let deliveries = {
            let mut state = self.state.lock();
            let mut deliveries = Vec::new();
            for (handle, sequencer) in state.sequencers.iter_mut() {
                sequencer.tick = sequencer.tick.saturating_add(ticks);
                let now = sequencer.tick;
                let (due, pending): (Vec<_>, Vec<_>) = sequencer
                    .scheduled
                    .drain(..)
                    .partition(|(time, _)| *time <= now);
                sequencer.scheduled = pending;
                for (time, event) in due {
                    if let Some(client) = sequencer.clients.get(&event.dest) {
                        if let Some((callback, data)) = client.callback {
                            deliveries.push(Delivery {
                                sequencer: *handle,
                                time,
                                event,
                                callback,
                                data,
                            });
                        }
                    }
                }
            }
            deliveries.sort_by_key(|delivery| delivery.time);
            deliveries
        };

        self.deliver(deliveries);
    }

    /// Invokes callbacks without holding the state lock, since callbacks call
    /// back into the mock to read the event.
    fn deliver(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            let event = {
                let mut state = self.state.lock();
                let handle = state.handle();
                state.events.insert(handle, delivery.event);
                handle
            };

            debug!(time = delivery.time, "Delivering mock sequencer event.");
            // SAFETY: the callback and its data were registered together and the
            // sequencer still holds the client.
            unsafe {
                (delivery.callback)(
                    delivery.time,
                    to_ptr(event),
                    to_ptr(delivery.sequencer),
                    delivery.data as *mut c_void,
                )
            };

            self.state.lock().events.remove(&event);
        }
    }

    fn with_synth(&self, synth: *mut fluid_synth_t, call: Call, valid: bool) -> c_int {
        let mut state = self.state.lock();
        if !valid || !state.synths.contains_key(&from_ptr(synth)) {
            return FLUID_FAILED;
        }
        state.calls.push(call);
        FLUID_OK
    }

    fn with_event<F: FnOnce(&mut EventSnapshot)>(&self, evt: *mut fluid_event_t, f: F) {
        if let Some(event) = self.state.lock().events.get_mut(&from_ptr(evt)) {
            f(event);
        }
    }

    fn set_kind(&self, evt: *mut fluid_event_t, kind: EventKind) {
        self.with_event(evt, |event| event.kind = Some(kind));
    }

    fn with_player(&self, player: *mut fluid_player_t, call: Call, status: Option<c_int>) -> c_int {
        let mut state = self.state.lock();
        match state.players.get_mut(&from_ptr(player)) {
            Some(player) => {
                if let Some(status) = status {
                    player.status = status;
                }
                state.calls.push(call);
                FLUID_OK
            }
            None => FLUID_FAILED,
        }
    }
}

fn midi_value(value: c_int) -> bool {
    (0..=127).contains(&value)
}

fn channel(chan: c_int) -> bool {
    (0..16).contains(&chan)
}

impl super::Fluid for Fluid {
    fn describe(&self) -> String {
        "mock FluidSynth".to_string()
    }

    unsafe fn new_settings(&self) -> *mut fluid_settings_t {
        let mut state = self.state.lock();
        let handle = state.handle();
        let defaults = BTreeMap::from([
            ("audio.driver".to_string(), Setting::Str("pulseaudio".to_string())),
            ("audio.period-size".to_string(), Setting::Int(64)),
            ("player.timing-source".to_string(), Setting::Str("sample".to_string())),
            ("synth".to_string(), Setting::Set),
            ("synth.chorus.active".to_string(), Setting::Int(1)),
            ("synth.gain".to_string(), Setting::Num(0.2)),
            ("synth.midi-channels".to_string(), Setting::Int(16)),
            ("synth.polyphony".to_string(), Setting::Int(256)),
            ("synth.reverb.active".to_string(), Setting::Int(1)),
            ("synth.sample-rate".to_string(), Setting::Num(44100.0)),
        ]);
        state.settings.insert(handle, defaults);
        state.calls.push(Call::NewSettings);
        to_ptr(handle)
    }

    unsafe fn delete_settings(&self, settings: *mut fluid_settings_t) {
        let mut state = self.state.lock();
        if state.settings.remove(&from_ptr(settings)).is_some() {
            state.calls.push(Call::DeleteSettings);
        }
    }

    unsafe fn settings_get_type(&self, settings: *mut fluid_settings_t, name: &CStr) -> c_int {
        let state = self.state.lock();
        match state
            .settings
            .get(&from_ptr(settings))
            .and_then(|table| table.get(&name_of(name)))
        {
            Some(Setting::Num(_)) => FLUID_NUM_TYPE,
            Some(Setting::Int(_)) => FLUID_INT_TYPE,
            Some(Setting::Str(_)) => FLUID_STR_TYPE,
            Some(Setting::Set) => FLUID_SET_TYPE,
            None => FLUID_NO_TYPE,
        }
    }

    unsafe fn settings_getnum(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: &mut c_double,
    ) -> c_int {
        let state = self.state.lock();
        match state
            .settings
            .get(&from_ptr(settings))
            .and_then(|table| table.get(&name_of(name)))
        {
            Some(Setting::Num(num)) => {
                *val = *num;
                FLUID_OK
            }
            _ => FLUID_FAILED,
        }
    }

    unsafe fn settings_getint(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: &mut c_int,
    ) -> c_int {
        let state = self.state.lock();
        match state
            .settings
            .get(&from_ptr(settings))
            .and_then(|table| table.get(&name_of(name)))
        {
            Some(Setting::Int(int)) => {
                *val = *int;
                FLUID_OK
            }
            _ => FLUID_FAILED,
        }
    }

    unsafe fn settings_copystr(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        buf: &mut [u8],
    ) -> c_int {
        let state = self.state.lock();
        match state
            .settings
            .get(&from_ptr(settings))
            .and_then(|table| table.get(&name_of(name)))
        {
            Some(Setting::Str(value)) if !buf.is_empty() => {
                let len = value.len().min(buf.len() - 1);
                buf[..len].copy_from_slice(&value.as_bytes()[..len]);
                buf[len] = 0;
                FLUID_OK
            }
            _ => FLUID_FAILED,
        }
    }

    unsafe fn settings_setnum(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: c_double,
    ) -> c_int {
        let mut state = self.state.lock();
        let key = name_of(name);
        match state
            .settings
            .get_mut(&from_ptr(settings))
            .and_then(|table| table.get_mut(&key))
        {
            Some(Setting::Num(num)) => *num = val,
            _ => return FLUID_FAILED,
        }
        state.calls.push(Call::SetNum {
            name: key,
            value: val,
        });
        FLUID_OK
    }

    unsafe fn settings_setint(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: c_int,
    ) -> c_int {
        let mut state = self.state.lock();
        let key = name_of(name);
        match state
            .settings
            .get_mut(&from_ptr(settings))
            .and_then(|table| table.get_mut(&key))
        {
            Some(Setting::Int(int)) => *int = val,
            _ => return FLUID_FAILED,
        }
        state.calls.push(Call::SetInt {
            name: key,
            value: val,
        });
        FLUID_OK
    }

    unsafe fn settings_setstr(
        &self,
        settings: *mut fluid_settings_t,
        name: &CStr,
        val: &CStr,
    ) -> c_int {
        let mut state = self.state.lock();
        let key = name_of(name);
        let value = name_of(val);
        match state
            .settings
            .get_mut(&from_ptr(settings))
            .and_then(|table| table.get_mut(&key))
        {
            Some(Setting::Str(current)) => *current = value.clone(),
            _ => return FLUID_FAILED,
        }
        state.calls.push(Call::SetStr { name: key, value });
        FLUID_OK
    }

    unsafe fn new_synth(&self, settings: *mut fluid_settings_t) -> *mut fluid_synth_t {
        let mut state = self.state.lock();
        if !state.settings.contains_key(&from_ptr(settings)) {
            return ptr::null_mut();
        }
        let handle = state.handle();
        state.synths.insert(
            handle,
            Synth {
                soundfonts: BTreeMap::new(),
            },
        );
        state.calls.push(Call::NewSynth);
        to_ptr(handle)
    }

    unsafe fn delete_synth(&self, synth: *mut fluid_synth_t) {
        let mut state = self.state.lock();
        if state.synths.remove(&from_ptr(synth)).is_some() {
            state.calls.push(Call::DeleteSynth);
        }
    }

    unsafe fn synth_sfload(
        &self,
        synth: *mut fluid_synth_t,
        filename: &CStr,
        reset: c_int,
    ) -> c_int {
        let mut state = self.state.lock();
        let path = name_of(filename);
        if state.failing_loads.contains(&path) {
            return FLUID_FAILED;
        }
        let id = state.next_soundfont;
        match state.synths.get_mut(&from_ptr(synth)) {
            Some(synth) => synth.soundfonts.insert(id, path.clone()),
            None => return FLUID_FAILED,
        };
        state.next_soundfont += 1;
        state.calls.push(Call::SfLoad {
            path,
            reset: reset != 0,
        });
        id
    }

    unsafe fn synth_sfreload(&self, synth: *mut fluid_synth_t, id: c_int) -> c_int {
        let mut state = self.state.lock();
        let path = match state
            .synths
            .get(&from_ptr(synth))
            .and_then(|synth| synth.soundfonts.get(&id))
        {
            Some(path) => path.clone(),
            None => return FLUID_FAILED,
        };
        if state.failing_loads.contains(&path) {
            return FLUID_FAILED;
        }
        let new_id = state.next_soundfont;
        state.next_soundfont += 1;
        if let Some(synth) = state.synths.get_mut(&from_ptr(synth)) {
            synth.soundfonts.remove(&id);
            synth.soundfonts.insert(new_id, path);
        }
        state.calls.push(Call::SfReload { id });
        new_id
    }

    unsafe fn synth_sfunload(&self, synth: *mut fluid_synth_t, id: c_int, reset: c_int) -> c_int {
        let mut state = self.state.lock();
        let path = match state
            .synths
            .get(&from_ptr(synth))
            .and_then(|synth| synth.soundfonts.get(&id))
        {
            Some(path) => path.clone(),
            None => return FLUID_FAILED,
        };
        if state.failing_unloads.contains(&path) {
            return FLUID_FAILED;
        }
        if let Some(synth) = state.synths.get_mut(&from_ptr(synth)) {
            synth.soundfonts.remove(&id);
        }
        state.calls.push(Call::SfUnload {
            id,
            reset: reset != 0,
        });
        FLUID_OK
    }

    unsafe fn synth_noteon(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        key: c_int,
        vel: c_int,
    ) -> c_int {
        self.with_synth(
            synth,
            Call::NoteOn {
                channel: chan,
                key,
                velocity: vel,
            },
            channel(chan) && midi_value(key) && midi_value(vel),
        )
    }

    unsafe fn synth_noteoff(&self, synth: *mut fluid_synth_t, chan: c_int, key: c_int) -> c_int {
        self.with_synth(
            synth,
            Call::NoteOff { channel: chan, key },
            channel(chan) && midi_value(key),
        )
    }

    unsafe fn synth_cc(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        num: c_int,
        val: c_int,
    ) -> c_int {
        self.with_synth(
            synth,
            Call::ControlChange {
                channel: chan,
                control: num,
                value: val,
            },
            channel(chan) && midi_value(num) && midi_value(val),
        )
    }

    unsafe fn synth_pitch_bend(&self, synth: *mut fluid_synth_t, chan: c_int, val: c_int) -> c_int {
        self.with_synth(
            synth,
            Call::PitchBend {
                channel: chan,
                value: val,
            },
            channel(chan) && (0..=16383).contains(&val),
        )
    }

    unsafe fn synth_pitch_wheel_sens(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        val: c_int,
    ) -> c_int {
        self.with_synth(
            synth,
            Call::PitchWheelSens {
                channel: chan,
                value: val,
            },
            channel(chan) && (0..=72).contains(&val),
        )
    }

    unsafe fn synth_program_change(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        program: c_int,
    ) -> c_int {
        self.with_synth(
            synth,
            Call::ProgramChange {
                channel: chan,
                program,
            },
            channel(chan) && midi_value(program),
        )
    }

    unsafe fn synth_bank_select(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        bank: c_int,
    ) -> c_int {
        self.with_synth(
            synth,
            Call::BankSelect {
                channel: chan,
                bank,
            },
            channel(chan) && (0..=16383).contains(&bank),
        )
    }

    unsafe fn synth_program_select(
        &self,
        synth: *mut fluid_synth_t,
        chan: c_int,
        sfont_id: c_int,
        bank: c_int,
        preset: c_int,
    ) -> c_int {
        let loaded = self
            .state
            .lock()
            .synths
            .get(&from_ptr(synth))
            .is_some_and(|synth| synth.soundfonts.contains_key(&sfont_id));
        self.with_synth(
            synth,
            Call::ProgramSelect {
                channel: chan,
                sfont_id,
                bank,
                preset,
            },
            loaded && channel(chan) && midi_value(preset),
        )
    }

    unsafe fn new_audio_driver(
        &self,
        settings: *mut fluid_settings_t,
        synth: *mut fluid_synth_t,
    ) -> *mut fluid_audio_driver_t {
        let mut state = self.state.lock();
        if !state.settings.contains_key(&from_ptr(settings))
            || !state.synths.contains_key(&from_ptr(synth))
        {
            return ptr::null_mut();
        }
        let handle = state.handle();
        state.drivers.insert(handle);
        state.calls.push(Call::NewAudioDriver);
        to_ptr(handle)
    }

    unsafe fn delete_audio_driver(&self, driver: *mut fluid_audio_driver_t) {
        let mut state = self.state.lock();
        if state.drivers.remove(&from_ptr(driver)) {
            state.calls.push(Call::DeleteAudioDriver);
        }
    }

    unsafe fn new_player(&self, synth: *mut fluid_synth_t) -> *mut fluid_player_t {
        let mut state = self.state.lock();
        if !state.synths.contains_key(&from_ptr(synth)) {
            return ptr::null_mut();
        }
        let handle = state.handle();
        state.players.insert(
            handle,
            Player {
                status: FLUID_PLAYER_READY,
            },
        );
        state.calls.push(Call::NewPlayer);
        to_ptr(handle)
    }

    unsafe fn delete_player(&self, player: *mut fluid_player_t) -> c_int {
        let mut state = self.state.lock();
        if state.players.remove(&from_ptr(player)).is_none() {
            return FLUID_FAILED;
        }
        state.calls.push(Call::DeletePlayer);
        status(!state.failing_player_delete)
    }

    unsafe fn player_add(&self, player: *mut fluid_player_t, midifile: &CStr) -> c_int {
        let path = name_of(midifile);
        if self.state.lock().failing_midi.contains(&path) {
            return FLUID_FAILED;
        }
        self.with_player(player, Call::PlayerAdd { path }, None)
    }

    unsafe fn player_play(&self, player: *mut fluid_player_t) -> c_int {
        self.with_player(player, Call::PlayerPlay, Some(FLUID_PLAYER_PLAYING))
    }

    unsafe fn player_stop(&self, player: *mut fluid_player_t) -> c_int {
        self.with_player(player, Call::PlayerStop, Some(PLAYER_DONE))
    }

    unsafe fn player_join(&self, player: *mut fluid_player_t) -> c_int {
        // Playback in the mock finishes the moment somebody waits for it.
        let mut state = self.state.lock();
        match state.players.get_mut(&from_ptr(player)) {
            Some(player) => {
                if player.status == FLUID_PLAYER_PLAYING {
                    player.status = PLAYER_DONE;
                }
                state.calls.push(Call::PlayerJoin);
                FLUID_OK
            }
            None => FLUID_FAILED,
        }
    }

    unsafe fn player_get_status(&self, player: *mut fluid_player_t) -> c_int {
        self.state
            .lock()
            .players
            .get(&from_ptr(player))
            .map_or(PLAYER_DONE, |player| player.status)
    }

    unsafe fn player_set_loop(&self, player: *mut fluid_player_t, loop_count: c_int) -> c_int {
        self.with_player(player, Call::PlayerSetLoop { count: loop_count }, None)
    }

    unsafe fn new_event(&self) -> *mut fluid_event_t {
        let mut state = self.state.lock();
        let handle = state.handle();
        state.events.insert(
            handle,
            EventSnapshot {
                source: -1,
                dest: -1,
                kind: None,
            },
        );
        state.calls.push(Call::NewEvent);
        to_ptr(handle)
    }

    unsafe fn delete_event(&self, evt: *mut fluid_event_t) {
        let mut state = self.state.lock();
        if state.events.remove(&from_ptr(evt)).is_some() {
            state.calls.push(Call::DeleteEvent);
        }
    }

    unsafe fn event_timer(&self, evt: *mut fluid_event_t, _data: *mut c_void) {
        self.set_kind(evt, EventKind::Timer);
    }

    unsafe fn event_volume(&self, evt: *mut fluid_event_t, channel: c_int, val: c_int) {
        self.set_kind(
            evt,
            EventKind::Volume {
                channel,
                value: val,
            },
        );
    }

    unsafe fn event_note(
        &self,
        evt: *mut fluid_event_t,
        channel: c_int,
        key: c_short,
        vel: c_short,
        duration: c_uint,
    ) {
        self.set_kind(
            evt,
            EventKind::Note {
                channel,
                key,
                velocity: vel,
                duration,
            },
        );
    }

    unsafe fn event_noteon(
        &self,
        evt: *mut fluid_event_t,
        channel: c_int,
        key: c_short,
        vel: c_short,
    ) {
        self.set_kind(
            evt,
            EventKind::NoteOn {
                channel,
                key,
                velocity: vel,
            },
        );
    }

    unsafe fn event_noteoff(&self, evt: *mut fluid_event_t, channel: c_int, key: c_short) {
        self.set_kind(evt, EventKind::NoteOff { channel, key });
    }

    unsafe fn event_pitch_bend(&self, evt: *mut fluid_event_t, channel: c_int, val: c_int) {
        self.set_kind(
            evt,
            EventKind::PitchBend {
                channel,
                value: val,
            },
        );
    }

    unsafe fn event_pitch_wheelsens(&self, evt: *mut fluid_event_t, channel: c_int, val: c_int) {
        self.set_kind(
            evt,
            EventKind::PitchWheelSens {
                channel,
                value: val,
            },
        );
    }

    unsafe fn event_program_change(&self, evt: *mut fluid_event_t, channel: c_int, program: c_int) {
        self.set_kind(evt, EventKind::ProgramChange { channel, program });
    }

    unsafe fn event_get_type(&self, evt: *mut fluid_event_t) -> c_int {
        self.state
            .lock()
            .events
            .get(&from_ptr(evt))
            .and_then(|event| event.kind.as_ref())
            .map_or(-1, EventKind::native_type)
    }

    unsafe fn event_get_source(&self, evt: *mut fluid_event_t) -> ClientId {
        self.state
            .lock()
            .events
            .get(&from_ptr(evt))
            .map_or(-1, |event| event.source)
    }

    unsafe fn event_set_source(&self, evt: *mut fluid_event_t, src: ClientId) {
        self.with_event(evt, |event| event.source = src);
    }

    unsafe fn event_get_dest(&self, evt: *mut fluid_event_t) -> ClientId {
        self.state
            .lock()
            .events
            .get(&from_ptr(evt))
            .map_or(-1, |event| event.dest)
    }

    unsafe fn event_set_dest(&self, evt: *mut fluid_event_t, dest: ClientId) {
        self.with_event(evt, |event| event.dest = dest);
    }

    unsafe fn new_sequencer(&self, use_system_timer: c_int) -> *mut fluid_sequencer_t {
        let mut state = self.state.lock();
        let handle = state.handle();
        state.sequencers.insert(
            handle,
            Sequencer {
                time_scale: DEFAULT_TIME_SCALE,
                tick: 0,
                next_client: 0,
                clients: BTreeMap::new(),
                scheduled: Vec::new(),
            },
        );
        state.calls.push(Call::NewSequencer {
            system_timer: use_system_timer != 0,
        });
        to_ptr(handle)
    }

    unsafe fn delete_sequencer(&self, seq: *mut fluid_sequencer_t) {
        let deliveries = {
            let mut state = self.state.lock();
            let handle = from_ptr(seq);
            let sequencer = match state.sequencers.remove(&handle) {
                Some(sequencer) => sequencer,
                None => return,
            };
            state.calls.push(Call::DeleteSequencer);
            sequencer
                .clients
                .iter()
                .filter_map(|(id, client)| unregistering(handle, sequencer.tick, *id, client))
                .collect()
        };

        self.deliver(deliveries);
    }

    unsafe fn sequencer_count_clients(&self, seq: *mut fluid_sequencer_t) -> c_int {
        self.state
            .lock()
            .sequencers
            .get(&from_ptr(seq))
            .map_or(0, |seq| seq.clients.len() as c_int)
    }

    unsafe fn sequencer_get_client_id(&self, seq: *mut fluid_sequencer_t, index: c_int) -> ClientId {
        let state = self.state.lock();
        usize::try_from(index)
            .ok()
            .and_then(|index| {
                state
                    .sequencers
                    .get(&from_ptr(seq))
                    .and_then(|seq| seq.clients.keys().nth(index).copied())
            })
            .unwrap_or(FLUID_FAILED as ClientId)
    }

    unsafe fn sequencer_get_client_name(
        &self,
        seq: *mut fluid_sequencer_t,
        id: ClientId,
    ) -> *const c_char {
        // The name lives inside the client, which stays put until unregistered.
        self.state
            .lock()
            .sequencers
            .get(&from_ptr(seq))
            .and_then(|seq| seq.clients.get(&id))
            .map_or(ptr::null(), |client| client.name.as_ptr())
    }

    unsafe fn sequencer_client_is_dest(&self, seq: *mut fluid_sequencer_t, id: ClientId) -> c_int {
        let state = self.state.lock();
        match state
            .sequencers
            .get(&from_ptr(seq))
            .and_then(|seq| seq.clients.get(&id))
        {
            Some(client) if client.is_synth || client.callback.is_some() => FLUID_TRUE,
            _ => FLUID_FALSE,
        }
    }

    unsafe fn sequencer_register_client(
        &self,
        seq: *mut fluid_sequencer_t,
        name: &CStr,
        callback: Option<EventCallback>,
        data: *mut c_void,
    ) -> ClientId {
        let mut state = self.state.lock();
        let sequencer = match state.sequencers.get_mut(&from_ptr(seq)) {
            Some(sequencer) => sequencer,
            None => return FLUID_FAILED as ClientId,
        };
        let id = sequencer.next_client;
        sequencer.next_client += 1;
        sequencer.clients.insert(
            id,
            Client {
                name: name.to_owned(),
                is_synth: false,
                callback: callback.map(|callback| (callback, data as usize)),
            },
        );
        state.calls.push(Call::RegisterClient {
            id,
            name: name_of(name),
        });
        id
    }

    unsafe fn sequencer_unregister_client(&self, seq: *mut fluid_sequencer_t, id: ClientId) {
        let delivery = {
            let mut state = self.state.lock();
            let handle = from_ptr(seq);
            let removed = state.sequencers.get_mut(&handle).and_then(|sequencer| {
                let tick = sequencer.tick;
                sequencer
                    .clients
                    .remove(&id)
                    .map(|client| unregistering(handle, tick, id, &client))
            });
            match removed {
                Some(delivery) => {
                    state.calls.push(Call::UnregisterClient { id });
                    delivery
                }
                None => return,
            }
        };

        self.deliver(delivery.into_iter().collect());
    }

    unsafe fn sequencer_send_now(&self, seq: *mut fluid_sequencer_t, evt: *mut fluid_event_t) {
        let delivery = {
            let mut state = self.state.lock();
            let event = match state.events.get(&from_ptr(evt)) {
                Some(event) => event.clone(),
                None => return,
            };
            let sequencer = match state.sequencers.get(&from_ptr(seq)) {
                Some(sequencer) => sequencer,
                None => return,
            };
            let delivery = sequencer
                .clients
                .get(&event.dest)
                .and_then(|client| client.callback)
                .map(|(callback, data)| Delivery {
                    sequencer: from_ptr(seq),
                    time: sequencer.tick,
                    event: event.clone(),
                    callback,
                    data,
                });
            state.calls.push(Call::SendNow { event });
            delivery
        };

        self.deliver(delivery.into_iter().collect());
    }

    unsafe fn sequencer_send_at(
        &self,
        seq: *mut fluid_sequencer_t,
        evt: *mut fluid_event_t,
        time: c_uint,
        absolute: c_int,
    ) -> c_int {
        let mut state = self.state.lock();
        let event = match state.events.get(&from_ptr(evt)) {
            Some(event) => event.clone(),
            None => return FLUID_FAILED,
        };
        let sequencer = match state.sequencers.get_mut(&from_ptr(seq)) {
            Some(sequencer) => sequencer,
            None => return FLUID_FAILED,
        };
        let time = if absolute != 0 {
            time
        } else {
            sequencer.tick.saturating_add(time)
        };
        let has_callback = match sequencer.clients.get(&event.dest) {
            Some(client) => client.callback.is_some(),
            None => return FLUID_FAILED,
        };
        if has_callback {
            sequencer.scheduled.push((time, event.clone()));
        }
        state.calls.push(Call::SendAt {
            event,
            time,
            absolute: absolute != 0,
        });
        FLUID_OK
    }

    unsafe fn sequencer_get_time_scale(&self, seq: *mut fluid_sequencer_t) -> c_double {
        self.state
            .lock()
            .sequencers
            .get(&from_ptr(seq))
            .map_or(0.0, |seq| seq.time_scale)
    }

    unsafe fn sequencer_set_time_scale(&self, seq: *mut fluid_sequencer_t, scale: c_double) {
        if scale <= 0.0 {
            debug!(scale, "Ignoring non-positive time scale.");
            return;
        }
        let mut state = self.state.lock();
        if let Some(sequencer) = state.sequencers.get_mut(&from_ptr(seq)) {
            sequencer.time_scale = scale;
            state.calls.push(Call::SetTimeScale { scale });
        }
    }

    unsafe fn sequencer_get_tick(&self, seq: *mut fluid_sequencer_t) -> c_uint {
        self.state
            .lock()
            .sequencers
            .get(&from_ptr(seq))
            .map_or(0, |seq| seq.tick)
    }

    unsafe fn sequencer_register_fluidsynth(
        &self,
        seq: *mut fluid_sequencer_t,
        synth: *mut fluid_synth_t,
    ) -> ClientId {
        let mut state = self.state.lock();
        if !state.synths.contains_key(&from_ptr(synth)) {
            return FLUID_FAILED as ClientId;
        }
        let sequencer = match state.sequencers.get_mut(&from_ptr(seq)) {
            Some(sequencer) => sequencer,
            None => return FLUID_FAILED as ClientId,
        };
        let id = sequencer.next_client;
        sequencer.next_client += 1;
        sequencer.clients.insert(
            id,
            Client {
                name: CString::from(c"fluidsynth"),
                is_synth: true,
                callback: None,
            },
        );
        state.calls.push(Call::RegisterSynth { id });
        id
    }
}

#[cfg(test)]
mod test {
    use std::ffi::CString;

    use super::{Call, Fluid, DEFAULT_TIME_SCALE};
    use crate::fluid::{
        Fluid as _, FLUID_FAILED, FLUID_INT_TYPE, FLUID_NO_TYPE, FLUID_OK, FLUID_SEQ_NOTE,
    };

    #[test]
    fn test_settings_types() {
        let fluid = Fluid::new();
        unsafe {
            let settings = fluid.new_settings();
            let key = CString::new("synth.polyphony").expect("valid key");
            assert_eq!(FLUID_INT_TYPE, fluid.settings_get_type(settings, &key));
            let missing = CString::new("synth.nothing").expect("valid key");
            assert_eq!(FLUID_NO_TYPE, fluid.settings_get_type(settings, &missing));
            // Integer keys reject numeric writes.
            assert_eq!(FLUID_FAILED, fluid.settings_setnum(settings, &key, 1.5));
            assert_eq!(FLUID_OK, fluid.settings_setint(settings, &key, 64));
            fluid.delete_settings(settings);
        }
        assert_eq!(0, fluid.live_handles());
    }

    #[test]
    fn test_soundfont_ids() {
        let fluid = Fluid::new();
        unsafe {
            let settings = fluid.new_settings();
            let synth = fluid.new_synth(settings);
            let path = CString::new("piano.sf2").expect("valid path");
            let first = fluid.synth_sfload(synth, &path, 1);
            let second = fluid.synth_sfload(synth, &path, 1);
            assert!(first > 0);
            assert_ne!(first, second);
            let reloaded = fluid.synth_sfreload(synth, first);
            assert!(reloaded > second);
            // The old id is gone once reloaded.
            assert_eq!(FLUID_FAILED, fluid.synth_sfunload(synth, first, 1));
            assert_eq!(FLUID_OK, fluid.synth_sfunload(synth, reloaded, 1));
        }
        assert!(fluid
            .calls()
            .contains(&Call::SfUnload { id: 3, reset: true }));
    }

    #[test]
    fn test_event_types() {
        let fluid = Fluid::new();
        unsafe {
            let event = fluid.new_event();
            assert_eq!(-1, fluid.event_get_type(event));
            fluid.event_note(event, 0, 60, 100, 10);
            assert_eq!(FLUID_SEQ_NOTE, fluid.event_get_type(event));
            fluid.delete_event(event);
        }
    }

    #[test]
    fn test_time_scale_rejects_non_positive() {
        let fluid = Fluid::new();
        unsafe {
            let seq = fluid.new_sequencer(1);
            fluid.sequencer_set_time_scale(seq, 0.0);
            fluid.sequencer_set_time_scale(seq, -5.0);
            assert_eq!(DEFAULT_TIME_SCALE, fluid.sequencer_get_time_scale(seq));
            fluid.sequencer_set_time_scale(seq, 480.0);
            assert_eq!(480.0, fluid.sequencer_get_time_scale(seq));
            fluid.delete_sequencer(seq);
        }
    }
}
