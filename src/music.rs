//! Song-level helpers: stem display order and key transposition.

use std::cmp::Ordering;

use crate::models::song::TrackDescriptor;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

const GUIDE_NAMES: [&str; 4] = ["CUES", "CUE", "GUIDE", "GUIA"];

/// 0 for the click, 1 for the guide/cue track, 2 for everything else.
pub fn track_priority(name: &str) -> u8 {
    let upper = name.trim().to_uppercase();
    if upper == "CLICK" {
        0
    } else if GUIDE_NAMES.contains(&upper.as_str()) {
        1
    } else {
        2
    }
}

pub fn compare_track_names(a: &str, b: &str) -> Ordering {
    track_priority(a)
        .cmp(&track_priority(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| a.cmp(b))
}

pub fn sort_tracks(tracks: &mut [TrackDescriptor]) {
    tracks.sort_by(|a, b| compare_track_names(&a.name, &b.name));
}

fn note_index(note: &str) -> Option<i32> {
    let mut chars = note.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let base = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let accidental = match chars.next() {
        None => 0,
        Some('#') | Some('♯') => 1,
        Some('b') | Some('♭') => -1,
        Some(_) => return None,
    };
    Some(base + accidental)
}

/// Shift a key name like `C#m` or `Bb` by `semitones`, keeping any suffix.
/// Unrecognised keys come back unchanged.
pub fn transpose_key(key: &str, semitones: i32) -> String {
    let key = key.trim();
    let root_len = key
        .char_indices()
        .nth(1)
        .filter(|(_, c)| matches!(c, '#' | 'b' | '♯' | '♭'))
        .map(|(i, c)| i + c.len_utf8())
        .or_else(|| key.chars().next().map(|c| c.len_utf8()));
    let Some(root_len) = root_len else {
        return key.to_string();
    };
    let (root, suffix) = key.split_at(root_len);
    match note_index(root) {
        Some(index) => {
            let shifted = (index + semitones).rem_euclid(12) as usize;
            format!("{}{}", NOTE_NAMES[shifted], suffix)
        }
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> TrackDescriptor {
        TrackDescriptor {
            id: name.into(),
            name: name.into(),
            source_url: format!("{}.mp3", name),
            song_id: "s".into(),
        }
    }

    #[test]
    fn click_then_guide_then_alphabetical() {
        let mut tracks: Vec<_> = ["bass", "Lead Vox", "Cues", "Drums", "click", "acoustic"]
            .into_iter()
            .map(descriptor)
            .collect();
        sort_tracks(&mut tracks);
        let names: Vec<_> = tracks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["click", "Cues", "acoustic", "bass", "Drums", "Lead Vox"]);
    }

    #[test]
    fn guide_aliases() {
        for name in ["CUES", "cue", " Guide ", "GUIA"] {
            assert_eq!(track_priority(name), 1, "{name}");
        }
        assert_eq!(track_priority("Clicks"), 2);
    }

    #[test]
    fn transposes_with_sharps() {
        assert_eq!(transpose_key("C#m", 3), "Em");
        assert_eq!(transpose_key("Bb", 2), "C");
        assert_eq!(transpose_key("A", -2), "G");
        assert_eq!(transpose_key("F#m7", 12), "F#m7");
        assert_eq!(transpose_key("Em", 0), "Em");
        assert_eq!(transpose_key("Bm", 1), "Cm");
    }

    #[test]
    fn leaves_unknown_keys_alone() {
        assert_eq!(transpose_key("", 2), "");
        assert_eq!(transpose_key("H", 2), "H");
    }
}
