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
use std::{marker::PhantomData, path::Path, ptr::NonNull, sync::Arc};

use tracing::{debug, error, info, span, warn, Level, Span};

use crate::{
    error::{Error, Result},
    fluid::{fluid_player_t, Fluid, FLUID_OK, FLUID_PLAYER_PLAYING},
    synth::Synth,
    util::{filename_display, path_to_cstring},
};

/// Name used in errors for commands that act on the whole queue.
const QUEUE: &str = "player queue";

/// Plays queued MIDI files through a synth.
pub struct Player<'a> {
    fluid: Arc<dyn Fluid>,
    handle: NonNull<fluid_player_t>,
    released: bool,
    span: Span,
    _synth: PhantomData<&'a Synth<'a>>,
}

impl<'a> Player<'a> {
    /// Creates a new player feeding the given synth.
    pub fn new(synth: &'a Synth<'a>) -> Result<Player<'a>> {
        let fluid = synth.fluid().clone();
        // SAFETY: the synth handle is live for 'a.
        let handle =
            NonNull::new(unsafe { fluid.new_player(synth.as_ptr()) }).ok_or(Error::Create("player"))?;

        Ok(Player {
            fluid,
            handle,
            released: false,
            span: span!(Level::INFO, "player"),
            _synth: PhantomData,
        })
    }

    fn as_ptr(&self) -> *mut fluid_player_t {
        self.handle.as_ptr()
    }

    fn check(status: i32, path: &str, reason: &str) -> Result<()> {
        if status != FLUID_OK {
            return Err(Error::Player {
                path: path.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(())
    }

    /// Queues a MIDI file.
    pub fn add(&self, path: impl AsRef<Path>) -> Result<()> {
        let _enter = self.span.enter();
        let path = path.as_ref();
        let midifile = path_to_cstring(path)?;

        // SAFETY: the handle is live for as long as self.
        let status = unsafe { self.fluid.player_add(self.as_ptr(), &midifile) };
        Self::check(status, &path.display().to_string(), "could not be queued")?;

        info!(file = filename_display(path), "Queued MIDI file.");
        Ok(())
    }

    /// Starts or resumes playback of the queue.
    pub fn play(&self) -> Result<()> {
        let _enter = self.span.enter();
        // SAFETY: the handle is live for as long as self.
        let status = unsafe { self.fluid.player_play(self.as_ptr()) };
        Self::check(status, QUEUE, "playback could not be started")?;

        debug!("Playback started.");
        Ok(())
    }

    /// Queues a MIDI file and starts playback.
    pub fn play_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.add(path)?;
        self.play()
    }

    /// Halts playback.
    pub fn stop(&self) -> Result<()> {
        let _enter = self.span.enter();
        // SAFETY: the handle is live for as long as self.
        let status = unsafe { self.fluid.player_stop(self.as_ptr()) };
        Self::check(status, QUEUE, "playback could not be stopped")?;

        debug!("Playback stopped.");
        Ok(())
    }

    /// Blocks until playback has finished. There is no timeout.
    pub fn join(&self) -> Result<()> {
        // SAFETY: the handle is live for as long as self.
        let status = unsafe { self.fluid.player_join(self.as_ptr()) };
        Self::check(status, QUEUE, "could not wait for playback")
    }

    /// Returns true while the native player is playing.
    pub fn is_playing(&self) -> bool {
        // SAFETY: the handle is live for as long as self.
        unsafe { self.fluid.player_get_status(self.as_ptr()) == FLUID_PLAYER_PLAYING }
    }

    /// Stops playback if it is running, resumes it otherwise.
    pub fn pause(&self) -> Result<()> {
        if self.is_playing() {
            self.stop()
        } else {
            self.play()
        }
    }

    /// Sets how many times the queue is played. -1 loops forever.
    pub fn set_loop(&self, count: i32) -> Result<()> {
        // SAFETY: the handle is live for as long as self.
        let status = unsafe { self.fluid.player_set_loop(self.as_ptr(), count) };
        Self::check(status, QUEUE, "loop count rejected")
    }

    /// Stops playback, waits for it to wind down and deletes the native player.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let span = span!(parent: &self.span, Level::INFO, "player teardown");
        let _enter = span.enter();

        if let Err(e) = self.stop() {
            warn!(err = %e, "Unable to stop player.");
        }
        if let Err(e) = self.join() {
            warn!(err = %e, "Unable to join player.");
        }

        // SAFETY: the handle is deleted exactly once, here.
        if unsafe { self.fluid.delete_player(self.as_ptr()) } != FLUID_OK {
            return Err(Error::FatalTeardown(
                "native player could not be deleted".to_string(),
            ));
        }

        Ok(())
    }
}

impl Drop for Player<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            error!(err = %e, "Error tearing down player.");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::Player;
    use crate::{
        error::Error,
        fluid::mock::{self, Call},
        settings::Settings,
        synth::Synth,
    };

    #[test]
    fn test_play_and_join() {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings");
        let synth = Synth::new(&settings).expect("synth");
        let player = Player::new(&synth).expect("player");
        fluid.clear_calls();

        player.play_file("song.mid").expect("play");
        assert!(player.is_playing());
        player.join().expect("join");
        assert!(!player.is_playing());

        assert_eq!(
            vec![
                Call::PlayerAdd {
                    path: "song.mid".to_string()
                },
                Call::PlayerPlay,
                Call::PlayerJoin,
            ],
            fluid.calls()
        );
    }

    #[test]
    fn test_pause_follows_native_status() {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings");
        let synth = Synth::new(&settings).expect("synth");
        let player = Player::new(&synth).expect("player");

        player.play_file("song.mid").expect("play");
        player.pause().expect("pause");
        assert!(!player.is_playing());
        player.pause().expect("resume");
        assert!(player.is_playing());

        // Playback ending on its own is reflected without any local bookkeeping,
        // so the next toggle starts playback again.
        fluid.finish_playback();
        assert!(!player.is_playing());
        player.pause().expect("restart");
        assert!(player.is_playing());
    }

    #[test]
    fn test_add_failure() {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings");
        let synth = Synth::new(&settings).expect("synth");
        let player = Player::new(&synth).expect("player");
        fluid.fail_midi_file("missing.mid");

        assert!(matches!(
            player.play_file("missing.mid"),
            Err(Error::Player { path, .. }) if path == "missing.mid"
        ));
        assert!(!player.is_playing());
    }

    #[test]
    fn test_set_loop() {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings");
        let synth = Synth::new(&settings).expect("synth");
        let player = Player::new(&synth).expect("player");

        player.set_loop(-1).expect("loop");
        assert!(fluid.calls().contains(&Call::PlayerSetLoop { count: -1 }));
    }

    #[test]
    fn test_close_stops_then_joins() {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings");
        let synth = Synth::new(&settings).expect("synth");
        let player = Player::new(&synth).expect("player");
        player.play_file("song.mid").expect("play");
        fluid.clear_calls();

        player.close().expect("close");
        assert_eq!(
            vec![Call::PlayerStop, Call::PlayerJoin, Call::DeletePlayer],
            fluid.calls()
        );
    }

    #[test]
    fn test_failed_delete_is_fatal() {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings");
        let synth = Synth::new(&settings).expect("synth");
        let player = Player::new(&synth).expect("player");
        fluid.fail_player_delete();

        assert!(matches!(player.close(), Err(Error::FatalTeardown(_))));
    }
}
