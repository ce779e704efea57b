use super::speaker;
use crate::cpu::pit;
use crate::io::keyboard;

/// A single sequencer step. Zero frequency is a rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
	/// Square wave frequency in Hz; 0 keeps the speaker silent.
	pub frequency: u32,
	/// How long to hold it, in milliseconds.
	pub duration: u32,
}

/// An immutable sequence of notes. The slice must outlive the `play` call
/// borrowing it.
#[derive(Debug, Clone, Copy)]
pub struct Song<'a> {
	/// The notes, in playing order.
	pub notes: &'a [Note],
	/// Display name for menus and status lines.
	pub name: Option<&'a str>,
}

/// Outcome of playing a song.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayResult {
	/// Every note ran to its end.
	Completed,
	/// ESC arrived while playing.
	StoppedByUser,
	/// The song had no notes; nothing was touched.
	InvalidSong,
}

/// Anything that can perform a [Song].
pub trait SongPlayer {
	/// Play the song to the end, or until a stop request arrives.
	fn play(&self, song: &Song) -> PlayResult;
}

/// Milliseconds per sleep slice. The stop flag is observed at least this
/// often, which bounds the keypress-to-silence latency.
const SLICE_MS: u32 = 25;
/// Silent tail carved out of each note so repeated pitches articulate.
const GAP_MS: u32 = 5;

/// How long a note sounds and how long it stays silent afterwards. The gap
/// comes out of the note's own duration, so total time is exact; notes too
/// short to donate a gap, and rests, play undivided.
fn hold_and_gap(note: &Note) -> (u32, u32) {
	if note.frequency != 0 && note.duration > GAP_MS {
		(note.duration - GAP_MS, GAP_MS)
	} else {
		(note.duration, 0)
	}
}

/// Song player driving PIT channel 2 through the speaker driver, keeping
/// time with the tick clock. It never touches the interrupt flag: the tick
/// clock and the keyboard's stop request both depend on interrupts staying
/// live during playback.
pub struct PitSongPlayer;

impl PitSongPlayer {
	pub const fn new() -> Self {
		PitSongPlayer
	}

	/// Sleep `ms` in stop-aware slices. Slices are cut against the note's
	/// absolute deadline so they cannot accumulate drift. True if a stop
	/// request arrived.
	fn sleep_sliced(ms: u32) -> bool {
		let start = pit::ticks();
		let total_ticks = ms.wrapping_mul(pit::ticks_per_ms());
		loop {
			let elapsed = pit::ticks().wrapping_sub(start);
			if elapsed >= total_ticks {
				return false;
			}
			let remaining_ms = (total_ticks - elapsed) / pit::ticks_per_ms();
			pit::sleep_interrupt(remaining_ms.clamp(1, SLICE_MS));
			if keyboard::stop_requested() {
				return true;
			}
		}
	}
}

impl SongPlayer for PitSongPlayer {
	fn play(&self, song: &Song) -> PlayResult {
		if song.notes.is_empty() {
			return PlayResult::InvalidSong;
		}
		keyboard::clear_stop();
		speaker::enable_speaker();

		for note in song.notes {
			if keyboard::stop_requested() {
				speaker::disable_speaker();
				return PlayResult::StoppedByUser;
			}
			// a zero duration still programs the frequency, so runs of
			// rests collapse into one silence
			speaker::play_tone(note.frequency);
			let (hold, gap) = hold_and_gap(note);
			if Self::sleep_sliced(hold) {
				speaker::disable_speaker();
				return PlayResult::StoppedByUser;
			}
			if gap > 0 {
				speaker::stop_tone();
				if Self::sleep_sliced(gap) {
					speaker::disable_speaker();
					return PlayResult::StoppedByUser;
				}
			}
		}

		speaker::disable_speaker();
		PlayResult::Completed
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_song_is_invalid_and_touches_nothing() {
		let song = Song { notes: &[], name: None };
		assert_eq!(PitSongPlayer::new().play(&song), PlayResult::InvalidSong);
	}

	#[test]
	fn gap_is_carved_out_of_the_note() {
		let note = Note { frequency: 440, duration: 500 };
		assert_eq!(hold_and_gap(&note), (495, 5));
	}

	#[test]
	fn rests_play_undivided() {
		let rest = Note { frequency: 0, duration: 100 };
		assert_eq!(hold_and_gap(&rest), (100, 0));
	}

	#[test]
	fn short_notes_keep_their_full_length() {
		let blip = Note { frequency: 880, duration: 4 };
		assert_eq!(hold_and_gap(&blip), (4, 0));
		let zero = Note { frequency: 880, duration: 0 };
		assert_eq!(hold_and_gap(&zero), (0, 0));
	}
}
