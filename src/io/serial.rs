use lazy_static::lazy_static;
use spin::Mutex;
use uart_16550::SerialPort;

const COM1: u16 = 0x3F8;

lazy_static! {
	/// First serial port. All kernel diagnostics go out here.
	pub static ref SERIAL1: Mutex<SerialPort> = {
		let mut serial_port = unsafe { SerialPort::new(COM1) };
		serial_port.init();
		Mutex::new(serial_port)
	};
}

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
	use core::fmt::Write;
	// Interrupts stay off while the lock is held so an irq handler logging
	// mid-print cannot deadlock against us.
	x86_64::instructions::interrupts::without_interrupts(|| {
		let _ = SERIAL1.lock().write_fmt(args);
	});
}

/// Print to the serial port.
#[macro_export]
macro_rules! serial_print {
	($($arg:tt)*) => ($crate::io::serial::_print(format_args!($($arg)*)));
}

/// Print to the serial port, with a trailing newline.
#[macro_export]
macro_rules! serial_println {
	() => ($crate::serial_print!("\n"));
	($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
	($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(concat!($fmt, "\n"), $($arg)*));
}
