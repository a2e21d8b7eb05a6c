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
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use fluidbind::audio::AudioDriver;
use fluidbind::config::Session;
use fluidbind::event::Event;
use fluidbind::fluid::{self, Fluid};
use fluidbind::player::Player;
use fluidbind::sequencer::Sequencer;
use fluidbind::settings::{Quality, Settings};
use fluidbind::synth::Synth;
use tracing::{info, warn};

/// The melody played by the notes command.
const MELODY: [i32; 79] = [
    79, 78, 79, 74, 79, 69, 79, 67, 79, 72, 79, 76, //
    79, 78, 79, 74, 79, 69, 79, 67, 79, 72, 79, 76, //
    79, 78, 79, 74, 79, 72, 79, 76, 79, 78, 79, 74, //
    79, 72, 79, 76, 79, 78, 79, 74, 79, 72, 79, 76, //
    79, 76, 74, 71, 69, 67, 69, 67, 64, 67, 64, 62, //
    64, 62, 59, 62, 59, 57, 64, 62, 59, 62, 59, 57, //
    64, 62, 59, 62, 59, 57, 43,
];

/// Chords scheduled by the scale command, one per beat, as offsets into the
/// C scale starting at middle C.
const PROGRESSION: [&[usize]; 5] = [&[0, 4, 7], &[0, 5, 9], &[0, 4, 7], &[2, 5, 7, 11], &[0, 4, 7]];

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Drives the FluidSynth software synthesizer."
)]
struct Cli {
    /// The FluidSynth library to load. Names starting with "mock" use an in-process double.
    #[arg(long, global = true)]
    library: Option<String>,
    /// A session file with settings and soundfonts.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// The quality preset: low, med or high.
    #[arg(long, global = true)]
    quality: Option<Quality>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays MIDI files through the audio interface.
    Play {
        /// The soundfont to play with.
        soundfont: PathBuf,
        /// The MIDI files to play, in order.
        #[arg(required = true)]
        midi_files: Vec<PathBuf>,
        /// How many times to play the files. -1 loops forever.
        #[arg[short, long]]
        loops: Option<i32>,
    },
    /// Plays a short melody note by note.
    Notes {
        /// The soundfont to play with.
        soundfont: PathBuf,
        /// How long each note is held.
        #[arg[short, long, default_value = "100ms"]]
        interval: String,
    },
    /// Schedules a chord progression through the sequencer.
    Scale {
        /// The soundfont to play with.
        soundfont: PathBuf,
        /// The tempo in beats per minute.
        #[arg[short, long, default_value_t = 120]]
        bpm: u32,
        /// How long to let the progression play before exiting.
        #[arg[short, long, default_value = "16s"]]
        wait: String,
    },
    /// Prints a settings key, setting it first if a value is given.
    Setting {
        /// The settings key, e.g. synth.gain.
        key: String,
        /// The new value.
        value: Option<String>,
    },
}

/// Loads the session, applying command line overrides.
fn session(cli: &Cli) -> Result<Session, Box<dyn Error>> {
    let mut session = match &cli.config {
        Some(path) => Session::deserialize(path)?,
        None => Session::from_environment()?,
    };

    if let Some(library) = &cli.library {
        session.set_library(library.clone());
    }
    if let Some(quality) = cli.quality {
        session.set_quality(quality);
    }

    Ok(session)
}

/// Opens FluidSynth and creates settings configured by the session.
fn settings(session: &Session) -> Result<Settings, Box<dyn Error>> {
    let fluid = fluid::open(session.library())?;
    info!(fluid = fluid.describe(), "Opened FluidSynth.");

    let settings = Settings::new(fluid)?;
    session.apply(&settings)?;
    Ok(settings)
}

fn load_soundfonts(synth: &Synth, session: &Session) -> Result<(), Box<dyn Error>> {
    for soundfont in session.soundfonts() {
        synth.load_soundfont(soundfont, true)?;
    }
    Ok(())
}

/// Schedules the chord progression one beat apart, starting shortly after the
/// current tick. Returns the number of notes the sequencer accepted.
fn schedule_progression(sequencer: &Sequencer, scale: &[Event]) -> usize {
    let beat = sequencer.ticks_per_beat();
    let mut ticks = sequencer.ticks() + 10;
    let mut sent = 0;

    for chord in PROGRESSION {
        for index in chord {
            if sequencer.send(&scale[*index], ticks) {
                sent += 1;
            } else {
                warn!(ticks, note = index, "Sequencer refused note.");
            }
        }
        ticks += beat;
    }

    sent
}

/// Builds one note event per key of the C scale, addressed to the given client.
fn c_scale(handle: &Arc<dyn Fluid>, dest: i16, beat: u32) -> Result<Vec<Event>, Box<dyn Error>> {
    let duration = (f64::from(beat) * 0.9) as u32;
    (60..72)
        .map(|key| -> Result<Event, Box<dyn Error>> {
            let event = Event::new(handle.clone())?;
            event.set_dest(dest);
            event.note(0, key, 127, duration);
            Ok(event)
        })
        .collect()
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut session = session(&cli)?;

    match cli.command {
        Commands::Play {
            soundfont,
            midi_files,
            loops,
        } => {
            session.add_soundfont(soundfont);
            let settings = settings(&session)?;
            let synth = Synth::new(&settings)?;
            let _driver = AudioDriver::new(&synth, &settings)?;
            load_soundfonts(&synth, &session)?;

            let player = Player::new(&synth)?;
            if let Some(loops) = loops {
                player.set_loop(loops)?;
            }
            for midi_file in midi_files.iter() {
                player.add(midi_file)?;
            }
            player.play()?;
            player.join()?;
            player.close()?;
        }
        Commands::Notes {
            soundfont,
            interval,
        } => {
            let interval: Duration = DurationString::from_string(interval)?.into();
            session.add_soundfont(soundfont);
            let settings = settings(&session)?;
            let synth = Synth::new(&settings)?;
            let _driver = AudioDriver::new(&synth, &settings)?;
            load_soundfonts(&synth, &session)?;

            for key in MELODY {
                synth.note_on(0, key, 1.0);
                thread::sleep(interval);
                synth.note_off(0, key);
            }
        }
        Commands::Scale {
            soundfont,
            bpm,
            wait,
        } => {
            let wait: Duration = DurationString::from_string(wait)?.into();
            session.add_soundfont(soundfont);
            let settings = settings(&session)?;
            let synth = Synth::new(&settings)?;
            let _driver = AudioDriver::new(&synth, &settings)?;
            load_soundfonts(&synth, &session)?;

            let mut sequencer = Sequencer::new(synth.fluid().clone())?;
            sequencer.set_beats_per_minute(bpm)?;
            println!("BPM: {}", sequencer.beats_per_minute());
            println!("TPB: {}", sequencer.ticks_per_beat());
            println!("TPS: {}", sequencer.ticks_per_second());

            let client = sequencer.add_synth(&synth)?;
            let scale = c_scale(synth.fluid(), client.id, sequencer.ticks_per_beat())?;
            let sent = schedule_progression(&sequencer, &scale);
            info!(sent, "Scheduled progression.");

            thread::sleep(wait);
        }
        Commands::Setting { key, value } => {
            let settings = settings(&session)?;
            if let Some(value) = value {
                settings.set(&key, value)?;
            }
            println!("{} = {}", key, settings.get(&key)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use fluidbind::{
        fluid::mock::{self, Call, EventKind},
        sequencer::Sequencer,
        settings::Settings,
        synth::Synth,
    };

    use super::{c_scale, schedule_progression};

    #[test]
    fn test_schedule_progression() {
        let fluid = Arc::new(mock::Fluid::new());
        let settings = Settings::new(fluid.clone()).expect("settings");
        let synth = Synth::new(&settings).expect("synth");
        let mut sequencer = Sequencer::new(fluid.clone()).expect("sequencer");
        let client = sequencer.add_synth(&synth).expect("add synth");

        let scale = c_scale(synth.fluid(), client.id, sequencer.ticks_per_beat())
            .expect("scale");
        assert_eq!(12, scale.len());
        assert_eq!(16, schedule_progression(&sequencer, &scale));

        let sends: Vec<(u32, i16)> = fluid
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SendAt {
                    event:
                        mock::EventSnapshot {
                            kind: Some(EventKind::Note { key, duration, .. }),
                            ..
                        },
                    time,
                    absolute: true,
                } => {
                    assert_eq!(108, duration);
                    Some((time, key))
                }
                _ => None,
            })
            .collect();

        assert_eq!(
            vec![
                (10, 60),
                (10, 64),
                (10, 67),
                (130, 60),
                (130, 65),
                (130, 69),
                (250, 60),
                (250, 64),
                (250, 67),
                (370, 62),
                (370, 65),
                (370, 67),
                (370, 71),
                (490, 60),
                (490, 64),
                (490, 67),
            ],
            sends
        );
    }
}
