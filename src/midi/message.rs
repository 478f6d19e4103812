//! Channel-voice messages the performance loop sends.

pub const STATUS_NOTE_OFF: u8 = 0x80;
pub const STATUS_NOTE_ON: u8 = 0x90;
pub const STATUS_PROGRAM_CHANGE: u8 = 0xC0;

pub const NOTE_MIN: u8 = 0;
pub const NOTE_MAX: u8 = 127;

pub const DEFAULT_VELOCITY: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiCommand {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ProgramChange { channel: u8, program: u8 },
}

impl MidiCommand {
    /// Base opcode plus channel number.
    pub fn status_byte(&self) -> u8 {
        match *self {
            MidiCommand::NoteOn { channel, .. } => STATUS_NOTE_ON | (channel & 0x0F),
            MidiCommand::NoteOff { channel, .. } => STATUS_NOTE_OFF | (channel & 0x0F),
            MidiCommand::ProgramChange { channel, .. } => STATUS_PROGRAM_CHANGE | (channel & 0x0F),
        }
    }

    /// Wire bytes: three for note messages, two for a program change.
    pub fn to_bytes(&self) -> Vec<u8> {
        let status = self.status_byte();
        match *self {
            MidiCommand::NoteOn { note, velocity, .. }
            | MidiCommand::NoteOff { note, velocity, .. } => {
                vec![status, note & 0x7F, velocity & 0x7F]
            }
            MidiCommand::ProgramChange { program, .. } => vec![status, program & 0x7F],
        }
    }

    /// Parses a message produced by [`MidiCommand::to_bytes`].
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        let channel = status & 0x0F;
        match status & 0xF0 {
            STATUS_NOTE_ON if bytes.len() >= 3 => Some(MidiCommand::NoteOn {
                channel,
                note: bytes[1],
                velocity: bytes[2],
            }),
            STATUS_NOTE_OFF if bytes.len() >= 3 => Some(MidiCommand::NoteOff {
                channel,
                note: bytes[1],
                velocity: bytes[2],
            }),
            STATUS_PROGRAM_CHANGE if bytes.len() >= 2 => Some(MidiCommand::ProgramChange {
                channel,
                program: bytes[1],
            }),
            _ => None,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiCommand::NoteOn { channel, .. }
            | MidiCommand::NoteOff { channel, .. }
            | MidiCommand::ProgramChange { channel, .. } => channel,
        }
    }
}

/// Clamps an oracle note number into the representable MIDI range.
pub fn clamp_note(note: i32) -> u8 {
    note.clamp(NOTE_MIN as i32, NOTE_MAX as i32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_byte_carries_channel() {
        let on = MidiCommand::NoteOn {
            channel: 3,
            note: 60,
            velocity: 100,
        };
        assert_eq!(on.to_bytes(), vec![0x93, 60, 100]);

        let off = MidiCommand::NoteOff {
            channel: 15,
            note: 127,
            velocity: 0,
        };
        assert_eq!(off.to_bytes(), vec![0x8F, 127, 0]);
    }

    #[test]
    fn program_change_is_two_bytes() {
        let change = MidiCommand::ProgramChange {
            channel: 9,
            program: 41,
        };
        assert_eq!(change.to_bytes(), vec![0xC9, 41]);
        assert_eq!(MidiCommand::parse(&change.to_bytes()), Some(change));
    }

    #[test]
    fn parse_rejects_short_or_foreign_messages() {
        assert_eq!(MidiCommand::parse(&[]), None);
        assert_eq!(MidiCommand::parse(&[0x90, 60]), None);
        assert_eq!(MidiCommand::parse(&[0xB0, 7, 100]), None);
    }

    #[test]
    fn note_numbers_are_clamped() {
        assert_eq!(clamp_note(-4), 0);
        assert_eq!(clamp_note(69), 69);
        assert_eq!(clamp_note(300), 127);
    }
}
