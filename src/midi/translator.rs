//! Turns the polled pitch stream into note-on/note-off commands.
//!
//! Two states, Silent and Sounding, starting Silent. A note change always sends
//! the NoteOff for the old note before the NoteOn for the new one, so at most one
//! note sounds on the channel.

use super::message::{clamp_note, MidiCommand, DEFAULT_VELOCITY, NOTE_MAX, NOTE_MIN};
use crate::dsp::PitchSample;

/// What the output device is currently sounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoteState {
    pub playing: bool,
    pub last_note: u8,
    pub last_velocity: u8,
}

/// Pure transition: the next state and the commands to send, in order.
pub fn transition(
    state: NoteState,
    sample: &PitchSample,
    midi_note: i32,
    channel: u8,
    velocity: u8,
) -> (NoteState, Vec<MidiCommand>) {
    let off = |state: &NoteState| MidiCommand::NoteOff {
        channel,
        note: state.last_note,
        velocity: state.last_velocity,
    };

    if !sample.is_voiced() {
        if state.playing {
            let next = NoteState {
                playing: false,
                ..state
            };
            return (next, vec![off(&state)]);
        }
        return (state, Vec::new());
    }

    let note = clamp_note(midi_note);
    let sounding = NoteState {
        playing: true,
        last_note: note,
        last_velocity: velocity,
    };
    let on = MidiCommand::NoteOn {
        channel,
        note,
        velocity,
    };

    match (state.playing, state.last_note == note) {
        (false, _) => (sounding, vec![on]),
        (true, true) => (state, Vec::new()),
        (true, false) => (sounding, vec![off(&state), on]),
    }
}

/// Final NoteOff for the last sounded note followed by a NoteOff for every note
/// number on the channel, sounding or not.
pub fn drain_commands(state: NoteState, channel: u8) -> Vec<MidiCommand> {
    let sweep = (NOTE_MIN..=NOTE_MAX).map(|note| MidiCommand::NoteOff {
        channel,
        note,
        velocity: state.last_velocity,
    });
    std::iter::once(MidiCommand::NoteOff {
        channel,
        note: state.last_note,
        velocity: state.last_velocity,
    })
    .chain(sweep)
    .collect()
}

/// Stateful wrapper over [`transition`] owned by the MIDI performance loop.
#[derive(Debug, Clone)]
pub struct NoteEventTranslator {
    channel: u8,
    velocity: u8,
    state: NoteState,
}

impl NoteEventTranslator {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            velocity: DEFAULT_VELOCITY,
            state: NoteState::default(),
        }
    }

    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity.min(127);
        self
    }

    pub fn state(&self) -> NoteState {
        self.state
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn translate(&mut self, sample: &PitchSample, midi_note: i32) -> Vec<MidiCommand> {
        let (next, commands) =
            transition(self.state, sample, midi_note, self.channel, self.velocity);
        self.state = next;
        commands
    }

    /// NoteOff for the sounding note, if any, leaving the translator Silent.
    pub fn release(&mut self) -> Option<MidiCommand> {
        let commands = self.translate(&PitchSample::silent(), 0);
        commands.into_iter().next()
    }

    /// Ends the performance: the full drain sequence for the current state.
    pub fn drain(&mut self) -> Vec<MidiCommand> {
        let commands = drain_commands(self.state, self.channel);
        self.state.playing = false;
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voiced(hz: f32) -> PitchSample {
        PitchSample {
            frequency_hz: hz,
            ..PitchSample::silent()
        }
    }

    fn on(note: u8) -> MidiCommand {
        MidiCommand::NoteOn {
            channel: 0,
            note,
            velocity: 100,
        }
    }

    fn off(note: u8) -> MidiCommand {
        MidiCommand::NoteOff {
            channel: 0,
            note,
            velocity: 100,
        }
    }

    #[test]
    fn silence_while_silent_sends_nothing() {
        let (next, commands) = transition(NoteState::default(), &PitchSample::silent(), 0, 0, 100);
        assert_eq!(next, NoteState::default());
        assert!(commands.is_empty());
    }

    #[test]
    fn held_pitch_does_not_retrigger() {
        let mut translator = NoteEventTranslator::new(0);
        assert_eq!(translator.translate(&voiced(220.0), 57), vec![on(57)]);
        assert!(translator.translate(&voiced(221.0), 57).is_empty());
        assert!(translator.state().playing);
    }

    #[test]
    fn note_change_sends_off_before_on() {
        let mut translator = NoteEventTranslator::new(0);
        translator.translate(&voiced(220.0), 57);
        assert_eq!(translator.translate(&voiced(440.0), 69), vec![off(57), on(69)]);
        assert_eq!(translator.state().last_note, 69);
    }

    #[test]
    fn reference_sequence() {
        let mut translator = NoteEventTranslator::new(0);
        let mut sent = Vec::new();
        for (hz, note) in [(220.0, 57), (220.0, 57), (0.0, 0), (440.0, 69)] {
            sent.extend(translator.translate(&voiced(hz), note));
        }
        assert_eq!(sent, vec![on(57), off(57), on(69)]);
    }

    #[test]
    fn never_two_note_ons_without_an_off() {
        let mut translator = NoteEventTranslator::new(4);
        let script = [
            (0.0, 0),
            (110.0, 45),
            (110.0, 45),
            (123.0, 47),
            (0.0, 0),
            (0.0, 0),
            (330.0, 64),
            (349.0, 65),
            (349.0, 65),
            (200.0, 55),
        ];
        let mut sent = Vec::new();
        for (hz, note) in script {
            sent.extend(translator.translate(&voiced(hz), note));
        }
        sent.extend(translator.release());

        let mut sounding = false;
        for command in &sent {
            match command {
                MidiCommand::NoteOn { .. } => {
                    assert!(!sounding, "overlapping NoteOn in {sent:?}");
                    sounding = true;
                }
                MidiCommand::NoteOff { .. } => {
                    assert!(sounding, "unmatched NoteOff in {sent:?}");
                    sounding = false;
                }
                MidiCommand::ProgramChange { .. } => unreachable!(),
            }
        }
        let ons = sent.iter().filter(|c| matches!(c, MidiCommand::NoteOn { .. })).count();
        let offs = sent.iter().filter(|c| matches!(c, MidiCommand::NoteOff { .. })).count();
        assert_eq!(ons, offs);
        assert!(sent.iter().all(|c| c.channel() == 4));
    }

    #[test]
    fn out_of_range_notes_are_clamped() {
        let mut translator = NoteEventTranslator::new(0);
        assert_eq!(translator.translate(&voiced(5000.0), 200), vec![on(127)]);
    }

    #[test]
    fn release_when_silent_is_none() {
        let mut translator = NoteEventTranslator::new(0);
        assert_eq!(translator.release(), None);
    }

    #[test]
    fn drain_sweeps_every_note_once() {
        for start in [
            NoteState::default(),
            NoteState {
                playing: true,
                last_note: 64,
                last_velocity: 100,
            },
        ] {
            let commands = drain_commands(start, 2);
            assert_eq!(commands.len(), 129);
            assert_eq!(
                commands[0],
                MidiCommand::NoteOff {
                    channel: 2,
                    note: start.last_note,
                    velocity: start.last_velocity
                }
            );
            for (expected, command) in (0u8..=127).zip(&commands[1..]) {
                assert!(matches!(
                    command,
                    MidiCommand::NoteOff { channel: 2, note, .. } if *note == expected
                ));
            }
        }
    }

    #[test]
    fn custom_velocity_is_used_and_remembered() {
        let mut translator = NoteEventTranslator::new(1).with_velocity(80);
        translator.translate(&voiced(220.0), 57);
        assert_eq!(
            translator.release(),
            Some(MidiCommand::NoteOff {
                channel: 1,
                note: 57,
                velocity: 80
            })
        );
    }
}
