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

//! Parsing of sample metadata hints from file names.
//!
//! Sample libraries usually encode the recording details in the file name, e.g.
//! `Piano_C4_v1-64_rr2_close.wav`. Tokens are separated by underscores, spaces or dots and
//! are recognized independently, so their order does not matter:
//!
//! - Root note: a note name (`C4`, `F#3`, `Bb2`, `C-1`, with C4 = 60), `m60`/`n60`, or a bare
//!   number between 0 and 127.
//! - Velocity range: `v1-64` or `vel1-64`.
//! - Round-robin slot: `rr2`.
//! - Mic position and articulation: matched against known tags.
//!
//! Anything unrecognized is ignored.

use std::path::Path;

/// Known microphone position tags.
const MIC_TAGS: &[(&str, &str)] = &[
    ("close", "close"),
    ("room", "room"),
    ("ambient", "ambient"),
    ("amb", "ambient"),
    ("overhead", "overhead"),
    ("oh", "overhead"),
    ("far", "far"),
    ("near", "near"),
    ("mid", "mid"),
    ("stereo", "stereo"),
    ("mono", "mono"),
    ("di", "di"),
];

/// Known articulation tags.
const ARTICULATION_TAGS: &[(&str, &str)] = &[
    ("sustain", "sustain"),
    ("sus", "sustain"),
    ("staccato", "staccato"),
    ("stac", "staccato"),
    ("legato", "legato"),
    ("pizzicato", "pizzicato"),
    ("pizz", "pizzicato"),
    ("tremolo", "tremolo"),
    ("trem", "tremolo"),
    ("marcato", "marcato"),
    ("spiccato", "spiccato"),
    ("muted", "muted"),
    ("mute", "muted"),
    ("harmonic", "harmonic"),
    ("palm", "palm"),
];

/// Metadata hints extracted from a file name. `None` means the name said nothing about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameHints {
    /// The file name without its extension.
    pub name: String,
    pub root_midi: Option<u8>,
    pub velocity_range: Option<(u8, u8)>,
    pub rr_index: Option<u32>,
    pub mic: Option<String>,
    pub articulation: Option<String>,
}

/// Parses the metadata hints out of a file name or path.
pub fn parse_file_name(file_name: &str) -> NameHints {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    let mut hints = NameHints {
        name: stem.to_string(),
        ..Default::default()
    };
    let mut bare_number: Option<u8> = None;

    for token in stem.split(['_', ' ', '.']).filter(|t| !t.is_empty()) {
        let lower = token.to_ascii_lowercase();

        if hints.root_midi.is_none() {
            if let Some(midi) = parse_note_name(token) {
                hints.root_midi = Some(midi);
                continue;
            }
            if let Some(midi) = lower
                .strip_prefix('m')
                .or_else(|| lower.strip_prefix('n'))
                .and_then(parse_midi_number)
            {
                hints.root_midi = Some(midi);
                continue;
            }
        }

        if hints.velocity_range.is_none() {
            if let Some(range) = parse_velocity_range(&lower) {
                hints.velocity_range = Some(range);
                continue;
            }
        }

        if hints.rr_index.is_none() {
            if let Some(rr) = lower
                .strip_prefix("rr")
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|rr| *rr > 0)
            {
                hints.rr_index = Some(rr);
                continue;
            }
        }

        if hints.mic.is_none() {
            if let Some((_, mic)) = MIC_TAGS.iter().find(|(tag, _)| *tag == lower) {
                hints.mic = Some(mic.to_string());
                continue;
            }
        }

        if hints.articulation.is_none() {
            if let Some((_, art)) = ARTICULATION_TAGS.iter().find(|(tag, _)| *tag == lower) {
                hints.articulation = Some(art.to_string());
                continue;
            }
        }

        if bare_number.is_none() {
            bare_number = parse_midi_number(&lower);
        }
    }

    // A bare number is only trusted as the root when no note name was found.
    if hints.root_midi.is_none() {
        hints.root_midi = bare_number;
    }

    hints
}

/// Parses a note name such as `C4`, `F#3`, `Bb2` or `C-1` into a MIDI note number (C4 = 60).
pub fn parse_note_name(token: &str) -> Option<u8> {
    let mut chars = token.chars().peekable();

    let pitch_class: i32 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let accidental = match chars.peek() {
        Some('#') | Some('s') => {
            chars.next();
            1
        }
        Some('b') => {
            chars.next();
            -1
        }
        _ => 0,
    };

    let octave_str: String = chars.collect();
    // Require an explicit octave so words like "bass" don't parse.
    if octave_str.is_empty()
        || !octave_str
            .trim_start_matches('-')
            .chars()
            .all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let octave: i32 = octave_str.parse().ok()?;

    let midi = (octave + 1) * 12 + pitch_class + accidental;
    u8::try_from(midi).ok().filter(|m| *m <= 127)
}

fn parse_midi_number(token: &str) -> Option<u8> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse::<u8>().ok().filter(|m| *m <= 127)
}

fn parse_velocity_range(token: &str) -> Option<(u8, u8)> {
    let range = token
        .strip_prefix("vel")
        .or_else(|| token.strip_prefix('v'))?;
    let (low, high) = range.split_once('-')?;
    let low = parse_midi_number(low)?;
    let high = parse_midi_number(high)?;
    (low <= high).then_some((low, high))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_names() {
        assert_eq!(parse_note_name("C4"), Some(60));
        assert_eq!(parse_note_name("c4"), Some(60));
        assert_eq!(parse_note_name("A4"), Some(69));
        assert_eq!(parse_note_name("F#3"), Some(54));
        assert_eq!(parse_note_name("Fs3"), Some(54));
        assert_eq!(parse_note_name("Bb2"), Some(46));
        assert_eq!(parse_note_name("C-1"), Some(0));
        assert_eq!(parse_note_name("G9"), Some(127));
        assert_eq!(parse_note_name("A9"), None);
        assert_eq!(parse_note_name("Cb-1"), None);
        assert_eq!(parse_note_name("bass"), None);
        assert_eq!(parse_note_name("B"), None);
        assert_eq!(parse_note_name("close"), None);
    }

    #[test]
    fn test_full_name() {
        let hints = parse_file_name("Piano_C4_v1-64_rr2_close.wav");
        assert_eq!(hints.name, "Piano_C4_v1-64_rr2_close");
        assert_eq!(hints.root_midi, Some(60));
        assert_eq!(hints.velocity_range, Some((1, 64)));
        assert_eq!(hints.rr_index, Some(2));
        assert_eq!(hints.mic, Some("close".to_string()));
        assert_eq!(hints.articulation, None);
    }

    #[test]
    fn test_articulation_and_aliases() {
        let hints = parse_file_name("Violin Pizz A3 vel100-127 OH.flac");
        assert_eq!(hints.root_midi, Some(57));
        assert_eq!(hints.velocity_range, Some((100, 127)));
        assert_eq!(hints.mic, Some("overhead".to_string()));
        assert_eq!(hints.articulation, Some("pizzicato".to_string()));
    }

    #[test]
    fn test_midi_number_roots() {
        assert_eq!(parse_file_name("kick_m36.wav").root_midi, Some(36));
        assert_eq!(parse_file_name("snare_38_rr3.wav").root_midi, Some(38));
        // A note name wins over a bare number.
        assert_eq!(parse_file_name("pad_100_E2.wav").root_midi, Some(40));
        assert_eq!(parse_file_name("pad_200.wav").root_midi, None);
    }

    #[test]
    fn test_nothing_recognized() {
        let hints = parse_file_name("ambience.wav");
        assert_eq!(
            hints,
            NameHints {
                name: "ambience".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_invalid_velocity_range_ignored() {
        assert_eq!(parse_file_name("x_v90-10.wav").velocity_range, None);
        assert_eq!(parse_file_name("x_v0-200.wav").velocity_range, None);
    }
}
