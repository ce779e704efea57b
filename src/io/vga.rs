use crate::mem::volatile::V;
use core::fmt;
use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::instructions::{interrupts, port::Port};

/// Rows in the text buffer.
pub const BUFFER_HEIGHT: usize = 25;
/// Columns in the text buffer.
pub const BUFFER_WIDTH: usize = 80;

const VGA_BUFFER: usize = 0xB8000;
const CRTC_INDEX: u16 = 0x3D4; // Write
const CRTC_DATA: u16 = 0x3D5; // Read/Write

/// The classic 16 VGA colors.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
	Black = 0,
	Blue = 1,
	Green = 2,
	Cyan = 3,
	Red = 4,
	Magenta = 5,
	Brown = 6,
	LightGray = 7,
	DarkGray = 8,
	LightBlue = 9,
	LightGreen = 10,
	LightCyan = 11,
	LightRed = 12,
	Pink = 13,
	Yellow = 14,
	White = 15,
}

/// VGA attribute byte, `(bg << 4) | fg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl ColorCode {
	/// Combine a foreground and a background color.
	pub const fn new(foreground: Color, background: Color) -> ColorCode {
		ColorCode((background as u8) << 4 | (foreground as u8))
	}

	/// Wrap a raw attribute byte.
	pub const fn from_attr(attr: u8) -> ColorCode {
		ColorCode(attr)
	}
}

/// One character cell as laid out in the hardware buffer.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct ScreenChar {
	ascii_character: u8,
	color_code: ColorCode,
}

#[repr(transparent)]
struct Buffer {
	chars: [[V<ScreenChar>; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

/// Writes to the text buffer at 0xB8000. Sequential output goes to the
/// bottom row, scrolling everything up as lines fill.
pub struct Writer {
	column_position: usize,
	color_code: ColorCode,
	buffer: &'static mut Buffer,
}

impl Writer {
	fn write_byte(&mut self, byte: u8) {
		match byte {
			b'\n' => self.new_line(),
			byte => {
				if self.column_position >= BUFFER_WIDTH {
					self.new_line();
				}
				let row = BUFFER_HEIGHT - 1;
				let col = self.column_position;
				self.buffer.chars[row][col].write(ScreenChar {
					ascii_character: byte,
					color_code: self.color_code,
				});
				self.column_position += 1;
			}
		}
	}

	fn write_string(&mut self, s: &str) {
		for byte in s.bytes() {
			match byte {
				// printable range, or newline
				0x20..=0x7e | b'\n' => self.write_byte(byte),
				_ => self.write_byte(0xfe),
			}
		}
		self.update_cursor();
	}

	/// Move every row up by one and blank the bottom row.
	fn scroll_up(&mut self) {
		for row in 1..BUFFER_HEIGHT {
			for col in 0..BUFFER_WIDTH {
				let character = self.buffer.chars[row][col].read();
				self.buffer.chars[row - 1][col].write(character);
			}
		}
		self.clear_row(BUFFER_HEIGHT - 1);
	}

	fn new_line(&mut self) {
		self.scroll_up();
		self.column_position = 0;
	}

	fn clear_row(&mut self, row: usize) {
		let blank = ScreenChar {
			ascii_character: b' ',
			color_code: self.color_code,
		};
		for col in 0..BUFFER_WIDTH {
			self.buffer.chars[row][col].write(blank);
		}
	}

	fn clear_screen(&mut self) {
		for row in 0..BUFFER_HEIGHT {
			self.clear_row(row);
		}
		self.column_position = 0;
		self.update_cursor();
	}

	fn set_char(&mut self, row: usize, col: usize, ch: u8, attr: u8) {
		if row >= BUFFER_HEIGHT || col >= BUFFER_WIDTH {
			return;
		}
		self.buffer.chars[row][col].write(ScreenChar {
			ascii_character: ch,
			color_code: ColorCode::from_attr(attr),
		});
	}

	/// Move the hardware cursor to the current write position.
	fn update_cursor(&mut self) {
		let pos = ((BUFFER_HEIGHT - 1) * BUFFER_WIDTH + self.column_position) as u16;
		let mut index: Port<u8> = Port::new(CRTC_INDEX);
		let mut data: Port<u8> = Port::new(CRTC_DATA);
		unsafe {
			index.write(0x0F);
			data.write(pos as u8);
			index.write(0x0E);
			data.write((pos >> 8) as u8);
		}
	}
}

impl fmt::Write for Writer {
	fn write_str(&mut self, s: &str) -> fmt::Result {
		self.write_string(s);
		Ok(())
	}
}

lazy_static! {
	/// Mutex wrapping the global [Writer].
	pub static ref WRITER: Mutex<Writer> = Mutex::new(Writer {
		column_position: 0,
		color_code: ColorCode::new(Color::LightGray, Color::Black),
		buffer: unsafe { &mut *(VGA_BUFFER as *mut Buffer) },
	});
}

/// Put one character cell directly, bypassing the sequential cursor flow.
pub fn draw(row: usize, col: usize, ch: u8, attr: u8) {
	interrupts::without_interrupts(|| {
		WRITER.lock().set_char(row, col, ch, attr);
	});
}

/// Scroll everything up one row.
pub fn scroll() {
	interrupts::without_interrupts(|| {
		WRITER.lock().scroll_up();
	});
}

/// Blank the whole screen.
pub fn clear() {
	interrupts::without_interrupts(|| {
		WRITER.lock().clear_screen();
	});
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
	use core::fmt::Write;
	// Same discipline as serial: no irq may run while the lock is held.
	interrupts::without_interrupts(|| {
		let _ = WRITER.lock().write_fmt(args);
	});
}

/// Print to the VGA text screen.
#[macro_export]
macro_rules! print {
	($($arg:tt)*) => ($crate::io::vga::_print(format_args!($($arg)*)));
}

/// Print to the VGA text screen, with a trailing newline.
#[macro_export]
macro_rules! println {
	() => ($crate::print!("\n"));
	($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn attribute_byte_layout() {
		// (bg << 4) | fg
		assert_eq!(ColorCode::new(Color::White, Color::Blue), ColorCode(0x1F));
		assert_eq!(ColorCode::new(Color::LightGray, Color::Black), ColorCode(0x07));
		assert_eq!(ColorCode::new(Color::Yellow, Color::Red), ColorCode(0x4E));
	}

	#[test]
	fn raw_attribute_roundtrip() {
		assert_eq!(ColorCode::from_attr(0x1F), ColorCode::new(Color::White, Color::Blue));
	}
}
