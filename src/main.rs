#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod kernel {
	extern crate alloc;

	use alloc::boxed::Box;
	use bootloader::{entry_point, BootInfo};
	use chime::{
		io::{keyboard, vga},
		println,
		sound::{
			player::{PitSongPlayer, PlayResult, Song, SongPlayer},
			songs,
		},
	};

	entry_point!(kernel_main);

	/// Entry point for the kernel. Returns [!] because it is never supposed
	/// to exit.
	fn kernel_main(_boot_info: &'static BootInfo) -> ! {
		chime::init();

		vga::clear();
		println!("chime - PC speaker music kernel");

		// the player is boxed so the shell owns it the way the original
		// shells owned their allocated players; a stack value works too
		let player = Box::new(PitSongPlayer::new());
		player.play(&songs::STARTUP);

		song_menu(&*player)
	}

	fn song_menu(player: &dyn SongPlayer) -> ! {
		loop {
			println!();
			println!("select a song (ESC stops playback):");
			for (number, song) in songs::builtin().iter().enumerate() {
				println!("  {}. {}", number + 1, song.name.unwrap_or("untitled"));
			}

			let key = keyboard::get_char();
			let choice = (key as char)
				.to_digit(10)
				.and_then(|digit| digit.checked_sub(1))
				.and_then(|index| songs::builtin().get(index as usize));
			match choice {
				Some(song) => play_and_report(player, song),
				None => println!("no song bound to '{}'", key as char),
			}
		}
	}

	fn play_and_report(player: &dyn SongPlayer, song: &Song) {
		println!("playing {}...", song.name.unwrap_or("untitled"));
		match player.play(song) {
			PlayResult::Completed => println!("done"),
			PlayResult::StoppedByUser => println!("stopped"),
			PlayResult::InvalidSong => println!("nothing to play"),
		}
	}
}

#[cfg(not(target_os = "none"))]
fn main() {
	eprintln!("chime is a bare metal kernel; build a boot image with `cargo bootimage`");
}
