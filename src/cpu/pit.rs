use super::interrupts::{self, IRQ_TIMER};
use core::sync::atomic::{AtomicU32, Ordering};
use x86_64::{
	instructions::{interrupts::enable_and_hlt, port::Port},
	structures::idt::InterruptStackFrame,
};

const CHANNEL_0: u16 = 0x40; // Read/Write
const MODE_COMMAND: u16 = 0x43; // Write

/// Base frequency of the 8253/8254 oscillator, in Hz.
pub const PIT_BASE_FREQ: u32 = 1_193_180;

/// Tick rate the kernel runs at. At 1000 Hz one tick is one millisecond,
/// which is what the sleep functions assume note durations in.
pub const DEFAULT_HZ: u32 = 1000;

/// Monotonic tick counter. Written only by the IRQ0 callback; wraps at
/// 2^32, so interval math uses wrapping subtraction.
static TICKS: AtomicU32 = AtomicU32::new(0);

/// Ticks per millisecond for the configured rate. Set once in [setup].
static TICKS_PER_MS: AtomicU32 = AtomicU32::new(1);

/// Compute the channel 0 reload divisor for a target interrupt rate.
pub fn divisor(hz: u32) -> u16 {
	(PIT_BASE_FREQ / hz) as u16
}

/// Ticks needed to cover `ms` milliseconds at the configured rate.
fn ticks_for(ms: u32) -> u32 {
	ms.wrapping_mul(TICKS_PER_MS.load(Ordering::Relaxed))
}

/// Install the IRQ0 callback and program PIT channel 0 for `hz` interrupts
/// per second. `hz` is 100 or 1000; rates below 1000 Hz make every sleep
/// round up to the coarser tick.
pub fn setup(hz: u32) {
	TICKS_PER_MS.store(if hz >= 1000 { hz / 1000 } else { 1 }, Ordering::Relaxed);
	interrupts::register_callback(IRQ_TIMER, tick);

	let divisor = divisor(hz);
	let mut command: Port<u8> = Port::new(MODE_COMMAND);
	let mut data: Port<u8> = Port::new(CHANNEL_0);
	unsafe {
		// channel 0, lo/hi access, mode 3 (square wave), binary
		command.write(0x36);
		data.write((divisor & 0xff) as u8);
		data.write((divisor >> 8) as u8);
	}
}

/// The IRQ0 callback. The only writer of the tick counter.
fn tick(_stack_frame: &InterruptStackFrame) {
	TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Current tick count.
pub fn ticks() -> u32 {
	TICKS.load(Ordering::Relaxed)
}

/// Ticks per millisecond at the configured rate, never zero.
pub fn ticks_per_ms() -> u32 {
	TICKS_PER_MS.load(Ordering::Relaxed)
}

/// Whole seconds since the tick clock was started.
pub fn uptime_seconds() -> u32 {
	ticks() / (TICKS_PER_MS.load(Ordering::Relaxed) * 1000)
}

/// Spin until `ms` milliseconds have passed. CPU-hot; prefer
/// [sleep_interrupt] whenever interrupts are enabled.
pub fn sleep_busy(ms: u32) {
	let start = ticks();
	let target = ticks_for(ms);
	while ticks().wrapping_sub(start) < target {
		core::hint::spin_loop();
	}
}

/// Sleep for `ms` milliseconds, halting until the next interrupt between
/// deadline checks. `sti; hlt` is a single atomic pair here: an IRQ0 that
/// fires in between cannot slip past the halt and deadlock us.
pub fn sleep_interrupt(ms: u32) {
	let start = ticks();
	let target = ticks_for(ms);
	while ticks().wrapping_sub(start) < target {
		enable_and_hlt();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn divisor_for_kernel_rate() {
		// 1193180 / 1000
		assert_eq!(divisor(1000), 1193);
	}

	#[test]
	fn divisor_for_legacy_rate() {
		assert_eq!(divisor(100), 11931);
	}

	#[test]
	fn deadline_survives_counter_wraparound() {
		// the loop condition is ticks().wrapping_sub(start) < target
		let start = u32::MAX - 1;
		let target = 4;
		let now = start.wrapping_add(3); // counter wrapped through zero
		assert!(now.wrapping_sub(start) < target);
		let now = start.wrapping_add(4);
		assert!(now.wrapping_sub(start) >= target);
	}

	#[test]
	fn one_tick_is_one_millisecond() {
		assert_eq!(ticks_for(50), 50);
	}
}
