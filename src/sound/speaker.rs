use crate::cpu::pit::PIT_BASE_FREQ;
use bitflags::bitflags;
use x86_64::instructions::port::Port;

const CHANNEL_2: u16 = 0x42; // Read/Write
const MODE_COMMAND: u16 = 0x43; // Write
const CONTROL_PORT: u16 = 0x61; // Read/Write

bitflags! {
	/// Port 0x61 bits that couple PIT channel 2 to the speaker cone.
	struct Gate: u8 {
		const TIMER_2 = 1 << 0;
		const SPEAKER_DATA = 1 << 1;
		const ON = Self::TIMER_2.bits | Self::SPEAKER_DATA.bits;
	}
}

/// Reload divisor for a square wave at `hz`, clipped to the counter's
/// 16-bit range. Frequencies below ~18 Hz all land on 0xFFFF.
pub fn divisor_for(hz: u32) -> u16 {
	(PIT_BASE_FREQ / hz).clamp(1, 0xFFFF) as u16
}

/// Program channel 2 for a square wave at `hz` and gate the speaker.
/// A frequency of zero is a rest: the speaker is silenced instead.
pub fn play_tone(hz: u32) {
	if hz == 0 {
		stop_tone();
		return;
	}
	let divisor = divisor_for(hz);
	let mut command: Port<u8> = Port::new(MODE_COMMAND);
	let mut data: Port<u8> = Port::new(CHANNEL_2);
	unsafe {
		// channel 2, lo/hi access, mode 3 (square wave), binary
		command.write(0xB6);
		data.write((divisor & 0xff) as u8);
		data.write((divisor >> 8) as u8);
	}
	enable_speaker();
}

/// Silence the speaker.
pub fn stop_tone() {
	disable_speaker();
}

/// Gate the speaker onto channel 2. Idempotent: bits that are already set
/// are not rewritten, so a running tone keeps running without a click.
pub fn enable_speaker() {
	let mut port: Port<u8> = Port::new(CONTROL_PORT);
	unsafe {
		let status = port.read();
		if status & Gate::ON.bits() != Gate::ON.bits() {
			port.write(status | Gate::ON.bits());
		}
	}
}

/// Clear the gate bits. Idempotent.
pub fn disable_speaker() {
	let mut port: Port<u8> = Port::new(CONTROL_PORT);
	unsafe {
		let status = port.read();
		port.write(status & !Gate::ON.bits());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn concert_pitch_divisors() {
		assert_eq!(divisor_for(440), 2711);
		assert_eq!(divisor_for(880), 1355);
	}

	#[test]
	fn low_frequencies_clip_to_the_counter_range() {
		assert_eq!(divisor_for(18), 0xFFFF);
		assert_eq!(divisor_for(1), 0xFFFF);
	}

	#[test]
	fn high_frequencies_clip_to_one() {
		assert_eq!(divisor_for(2_000_000), 1);
	}

	#[test]
	fn gate_bits_are_the_low_two() {
		assert_eq!(Gate::ON.bits(), 0x03);
	}
}
