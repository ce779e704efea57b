use crate::cpu::interrupts::{self, IRQ_KEYBOARD};
use bitflags::bitflags;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use x86_64::{
	instructions::{interrupts::enable_and_hlt, port::Port},
	structures::idt::InterruptStackFrame,
};

const DATA_PORT: u16 = 0x60; // Read/Write

/// Scancodes with the top bit set are key releases.
const RELEASE_BIT: u8 = 0x80;

const SC_ESCAPE: u8 = 0x01;
const SC_LEFT_SHIFT: u8 = 0x2A;
const SC_RIGHT_SHIFT: u8 = 0x36;
const SC_CAPS_LOCK: u8 = 0x3A;
const SC_EXTENDED_PREFIX: u8 = 0xE0;

/// Scancode set 1, US layout, without modifiers. Zero entries have no
/// character mapping and are dropped.
#[rustfmt::skip]
static SCANCODES: [u8; 128] = [
	0, 0, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t',
	b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', 0,
	b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\',
	b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ',
	0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Scancode set 1 with shift (or, for letters, caps) applied.
#[rustfmt::skip]
static SCANCODES_SHIFTED: [u8; 128] = [
	0, 0, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08, b'\t',
	b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n', 0,
	b'A', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', 0, b'|',
	b'Z', b'X', b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*', 0, b' ',
	0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

bitflags! {
	/// Modifier state carried between scancodes.
	struct Modifiers: u8 {
		const SHIFT = 1 << 0;
		const CAPS = 1 << 1;
		/// One-shot 0xE0 latch; lives for exactly one following scancode.
		const EXTENDED = 1 << 2;
	}
}

/// Key events produced by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
	/// A decoded character, ready for the input queue.
	Char(u8),
	/// ESC: whatever is running should stop.
	Cancel,
}

/// Scancode set 1 state machine. Pure state; all port and queue traffic
/// stays in the irq path, so tests can drive this directly.
#[derive(Debug)]
pub struct Decoder {
	modifiers: Modifiers,
}

impl Decoder {
	/// A decoder with no modifiers down.
	pub const fn new() -> Self {
		Decoder {
			modifiers: Modifiers::empty(),
		}
	}

	/// Feed one byte from the wire. Returns a key event when the byte
	/// completes one.
	pub fn decode(&mut self, scancode: u8) -> Option<Key> {
		if scancode == SC_EXTENDED_PREFIX {
			self.modifiers.insert(Modifiers::EXTENDED);
			return None;
		}
		let extended = self.modifiers.contains(Modifiers::EXTENDED);
		self.modifiers.remove(Modifiers::EXTENDED);

		if scancode & RELEASE_BIT != 0 {
			match scancode & !RELEASE_BIT {
				SC_LEFT_SHIFT | SC_RIGHT_SHIFT => self.modifiers.remove(Modifiers::SHIFT),
				_ => {}
			}
			return None;
		}

		// Extended keys (arrows, right ctrl/alt, ...) have no character
		// mapping; this also keeps the fake shifts some keyboards send
		// around them from flipping the real shift state.
		if extended {
			return None;
		}

		match scancode {
			SC_LEFT_SHIFT | SC_RIGHT_SHIFT => {
				self.modifiers.insert(Modifiers::SHIFT);
				None
			}
			SC_CAPS_LOCK => {
				self.modifiers.toggle(Modifiers::CAPS);
				None
			}
			SC_ESCAPE => Some(Key::Cancel),
			_ => match self.to_ascii(scancode) {
				0 => None,
				ch => Some(Key::Char(ch)),
			},
		}
	}

	/// Table lookup. Letters select case by shift XOR caps; digits and
	/// symbols by shift alone.
	fn to_ascii(&self, scancode: u8) -> u8 {
		let plain = SCANCODES[scancode as usize];
		let shift = self.modifiers.contains(Modifiers::SHIFT);
		let upper = if plain.is_ascii_lowercase() {
			shift != self.modifiers.contains(Modifiers::CAPS)
		} else {
			shift
		};
		if upper {
			SCANCODES_SHIFTED[scancode as usize]
		} else {
			plain
		}
	}
}

const QUEUE_SIZE: usize = 256;

/// Single-producer single-consumer character ring. The producer is the IRQ1
/// handler and only it advances `head`; the consumer runs in thread context
/// and only it advances `tail`. On one CPU that makes a lock unnecessary.
struct Queue {
	buf: UnsafeCell<[u8; QUEUE_SIZE]>,
	head: AtomicUsize,
	tail: AtomicUsize,
}

unsafe impl Sync for Queue {}

impl Queue {
	const fn new() -> Self {
		Queue {
			buf: UnsafeCell::new([0; QUEUE_SIZE]),
			head: AtomicUsize::new(0),
			tail: AtomicUsize::new(0),
		}
	}

	/// Producer side. A full ring drops the new byte.
	fn push(&self, byte: u8) {
		let head = self.head.load(Ordering::Relaxed);
		let next = (head + 1) % QUEUE_SIZE;
		if next == self.tail.load(Ordering::Acquire) {
			return;
		}
		unsafe {
			(*self.buf.get())[head] = byte;
		}
		self.head.store(next, Ordering::Release);
	}

	/// Consumer side.
	fn pop(&self) -> Option<u8> {
		let tail = self.tail.load(Ordering::Relaxed);
		if tail == self.head.load(Ordering::Acquire) {
			return None;
		}
		let byte = unsafe { (*self.buf.get())[tail] };
		self.tail.store((tail + 1) % QUEUE_SIZE, Ordering::Release);
		Some(byte)
	}
}

static QUEUE: Queue = Queue::new();
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);
static DECODER: spin::Mutex<Decoder> = spin::Mutex::new(Decoder::new());

/// Register the IRQ1 callback. The keyboard line itself is already open in
/// the pic masks.
pub fn setup() {
	interrupts::register_callback(IRQ_KEYBOARD, keyboard_interrupt);
}

fn keyboard_interrupt(_stack_frame: &InterruptStackFrame) {
	read_input();
}

/// Called on keyboard interrupt. Reads the scancode from the keyboard data
/// port and feeds it to the decoder.
fn read_input() {
	let mut data_port: Port<u8> = Port::new(DATA_PORT);
	let scancode = unsafe { data_port.read() };
	match DECODER.lock().decode(scancode) {
		Some(Key::Char(ch)) => QUEUE.push(ch),
		Some(Key::Cancel) => STOP_REQUESTED.store(true, Ordering::Release),
		None => {}
	}
}

/// Next decoded character, if one is waiting.
pub fn try_get_char() -> Option<u8> {
	QUEUE.pop()
}

/// Next decoded character, halting until one arrives.
pub fn get_char() -> u8 {
	loop {
		if let Some(ch) = try_get_char() {
			return ch;
		}
		enable_and_hlt();
	}
}

/// Whether ESC has been pressed since the last [clear_stop].
pub fn stop_requested() -> bool {
	STOP_REQUESTED.load(Ordering::Acquire)
}

/// Reset the stop request latch.
pub fn clear_stop() {
	STOP_REQUESTED.store(false, Ordering::Release)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn decode_all(decoder: &mut Decoder, scancodes: &[u8]) -> Vec<u8> {
		scancodes
			.iter()
			.filter_map(|&sc| match decoder.decode(sc) {
				Some(Key::Char(ch)) => Some(ch),
				_ => None,
			})
			.collect()
	}

	#[test]
	fn plain_letters_and_digits() {
		let mut d = Decoder::new();
		// a, 1, space
		assert_eq!(decode_all(&mut d, &[0x1E, 0x02, 0x39]), b"a1 ");
	}

	#[test]
	fn shift_mixing() {
		let mut d = Decoder::new();
		// press lshift, press a, release a, release lshift, press a
		let stream = [0x2A, 0x1E, 0x9E, 0xAA, 0x1E];
		assert_eq!(decode_all(&mut d, &stream), b"Aa");
	}

	#[test]
	fn caps_affects_letters_only() {
		let mut d = Decoder::new();
		// caps on, then a and 1
		assert_eq!(decode_all(&mut d, &[0x3A, 0x1E, 0x02]), b"A1");
		// caps off again
		assert_eq!(decode_all(&mut d, &[0x3A, 0x1E]), b"a");
	}

	#[test]
	fn shift_cancels_caps_for_letters() {
		let mut d = Decoder::new();
		// caps on, shift down: letters drop back to lowercase, digits shift
		let stream = [0x3A, 0x2A, 0x1E, 0x02];
		assert_eq!(decode_all(&mut d, &stream), b"a!");
	}

	#[test]
	fn right_shift_works_too() {
		let mut d = Decoder::new();
		assert_eq!(decode_all(&mut d, &[0x36, 0x27, 0xB6, 0x27]), b":;");
	}

	#[test]
	fn releases_produce_nothing() {
		let mut d = Decoder::new();
		assert_eq!(decode_all(&mut d, &[0x9E, 0x82]), b"");
	}

	#[test]
	fn extended_prefix_is_one_shot() {
		let mut d = Decoder::new();
		// E0 48 is an arrow: dropped. The a afterwards decodes normally.
		assert_eq!(decode_all(&mut d, &[0xE0, 0x48, 0x1E]), b"a");
	}

	#[test]
	fn fake_shift_around_extended_key_leaves_shift_alone() {
		let mut d = Decoder::new();
		// E0 2A E0 47 E0 AA is what some boards send for Home
		let stream = [0xE0, 0x2A, 0xE0, 0x47, 0xE0, 0xAA, 0x1E];
		assert_eq!(decode_all(&mut d, &stream), b"a");
	}

	#[test]
	fn escape_is_a_cancel() {
		let mut d = Decoder::new();
		assert_eq!(d.decode(0x01), Some(Key::Cancel));
		// its release is silent
		assert_eq!(d.decode(0x81), None);
	}

	#[test]
	fn unmapped_scancodes_are_dropped() {
		let mut d = Decoder::new();
		// F1 and numlock
		assert_eq!(decode_all(&mut d, &[0x3B, 0x45]), b"");
	}

	#[test]
	fn queue_is_fifo() {
		let q = Queue::new();
		q.push(b'x');
		q.push(b'y');
		assert_eq!(q.pop(), Some(b'x'));
		assert_eq!(q.pop(), Some(b'y'));
		assert_eq!(q.pop(), None);
	}

	#[test]
	fn full_queue_drops_newest() {
		let q = Queue::new();
		for i in 0..QUEUE_SIZE {
			q.push(i as u8);
		}
		// capacity is QUEUE_SIZE - 1; the last push was dropped
		let mut drained = 0;
		while q.pop().is_some() {
			drained += 1;
		}
		assert_eq!(drained, QUEUE_SIZE - 1);
		// ring works again after draining
		q.push(b'z');
		assert_eq!(q.pop(), Some(b'z'));
	}

	#[test]
	fn stop_latch() {
		clear_stop();
		assert!(!stop_requested());
		STOP_REQUESTED.store(true, Ordering::Release);
		assert!(stop_requested());
		clear_stop();
		assert!(!stop_requested());
	}
}
