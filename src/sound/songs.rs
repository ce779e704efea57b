use super::player::{Note, Song};

/// Equal tempered note frequencies in Hz, integer rounded.
pub const C4: u32 = 262;
pub const D4: u32 = 294;
pub const E4: u32 = 330;
pub const F4: u32 = 349;
pub const G4: u32 = 392;
pub const A4: u32 = 440;
pub const B4: u32 = 494;
pub const C5: u32 = 523;
pub const D5: u32 = 587;
pub const E5: u32 = 659;
/// A rest; the speaker stays silent for the note's duration.
pub const R: u32 = 0;

const fn note(frequency: u32, duration: u32) -> Note {
	Note { frequency, duration }
}

/// Boot chime, played once the core is up.
pub const STARTUP: Song<'static> = Song {
	notes: &[
		note(623, 306),
		note(312, 77),
		note(467, 460),
		note(415, 537),
		note(623, 153),
		note(467, 920),
	],
	name: Some("startup chime"),
};

/// Falling farewell chime.
pub const SHUTDOWN: Song<'static> = Song {
	notes: &[
		note(831, 375),
		note(623, 375),
		note(415, 375),
		note(467, 750),
	],
	name: Some("shutdown chime"),
};

/// C major scale, up and back down.
pub const SCALE: Song<'static> = Song {
	notes: &[
		note(C4, 200),
		note(D4, 200),
		note(E4, 200),
		note(F4, 200),
		note(G4, 200),
		note(A4, 200),
		note(B4, 200),
		note(C5, 200),
		note(R, 400),
		note(C5, 200),
		note(B4, 200),
		note(A4, 200),
		note(G4, 200),
		note(F4, 200),
		note(E4, 200),
		note(D4, 200),
		note(C4, 400),
	],
	name: Some("c major scale"),
};

/// The songs offered by the menu, in display order.
pub fn builtin() -> &'static [Song<'static>] {
	static BUILTIN: [Song<'static>; 3] = [SCALE, STARTUP, SHUTDOWN];
	&BUILTIN
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builtin_songs_are_playable() {
		for song in builtin() {
			assert!(!song.notes.is_empty());
			assert!(song.name.is_some());
		}
	}

	#[test]
	fn scale_rest_is_really_a_rest() {
		assert!(SCALE.notes.iter().any(|n| n.frequency == R && n.duration > 0));
	}
}
