use crate::{println, serial_println};
use lazy_static::lazy_static;
use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

/// Offset of the first pic in the chained pics
pub const PIC_1_OFFSET: u8 = 32;
/// Offset of the second pic in the chained pics
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

const IRQS: usize = 16;

/// IRQ line of the PIT channel 0 heartbeat.
pub const IRQ_TIMER: u8 = 0;
/// IRQ line of the PS/2 keyboard.
pub const IRQ_KEYBOARD: u8 = 1;

/// Mutex wrapping chained pics. This is the interface for communicating with the pics.
pub static PICS: Mutex<ChainedPics> = Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

/// An irq handler. Runs with the interrupt flag cleared; must not allocate.
pub type IrqCallback = fn(&InterruptStackFrame);

static CALLBACKS: Mutex<[Option<IrqCallback>; IRQS]> = Mutex::new([None; IRQS]);

macro_rules! irq_gates {
	($(($name:ident, $irq:expr)),+ $(,)?) => {
		$(
			extern "x86-interrupt" fn $name(stack_frame: InterruptStackFrame) {
				irq_handler(stack_frame, $irq);
			}
		)+

		fn set_irq_handlers(idt: &mut InterruptDescriptorTable) {
			$(
				unsafe {
					idt[(PIC_1_OFFSET + $irq) as usize]
						.set_handler_fn($name)
						.set_stack_index(1);
				}
			)+
		}
	};
}

irq_gates!(
	(irq0_handler, 0),
	(irq1_handler, 1),
	(irq2_handler, 2),
	(irq3_handler, 3),
	(irq4_handler, 4),
	(irq5_handler, 5),
	(irq6_handler, 6),
	(irq7_handler, 7),
	(irq8_handler, 8),
	(irq9_handler, 9),
	(irq10_handler, 10),
	(irq11_handler, 11),
	(irq12_handler, 12),
	(irq13_handler, 13),
	(irq14_handler, 14),
	(irq15_handler, 15),
);

lazy_static! {
	/// The interrupt descriptor table. Gates 0-31 lead to the exception
	/// handlers, 32-47 to the irq dispatch.
	static ref IDT: InterruptDescriptorTable = {
		let mut idt = InterruptDescriptorTable::new();

		unsafe {
			idt.divide_error.set_handler_fn(divide_error_handler).set_stack_index(1);
			idt.debug.set_handler_fn(debug_handler).set_stack_index(1);
			idt.non_maskable_interrupt.set_handler_fn(non_maskable_interrupt_handler).set_stack_index(1);
			idt.breakpoint.set_handler_fn(breakpoint_handler).set_stack_index(1);
			idt.overflow.set_handler_fn(overflow_handler).set_stack_index(1);
			idt.bound_range_exceeded.set_handler_fn(bound_range_exceeded_handler).set_stack_index(1);
			idt.invalid_opcode.set_handler_fn(invalid_opcode_handler).set_stack_index(1);
			idt.device_not_available.set_handler_fn(device_not_available_handler).set_stack_index(1);
			idt.double_fault.set_handler_fn(double_fault_handler).set_stack_index(0);
			idt.invalid_tss.set_handler_fn(invalid_tss_handler).set_stack_index(1);
			idt.segment_not_present.set_handler_fn(segment_not_present_handler).set_stack_index(1);
			idt.stack_segment_fault.set_handler_fn(stack_segment_fault_handler).set_stack_index(1);
			idt.general_protection_fault.set_handler_fn(general_protection_fault_handler).set_stack_index(1);
			idt.page_fault.set_handler_fn(page_fault_handler).set_stack_index(1);
			idt.x87_floating_point.set_handler_fn(x87_floating_point_handler).set_stack_index(1);
			idt.alignment_check.set_handler_fn(alignment_check_handler).set_stack_index(1);
			idt.machine_check.set_handler_fn(machine_check_handler).set_stack_index(1);
			idt.simd_floating_point.set_handler_fn(simd_floating_point_handler).set_stack_index(1);
			idt.virtualization.set_handler_fn(virtualization_handler).set_stack_index(1);
			idt.security_exception.set_handler_fn(security_exception_handler).set_stack_index(1);
		}

		set_irq_handlers(&mut idt);

		idt
	};
}

/// Set up the interrupt descriptor table and remap the chained pics. Only
/// the timer and keyboard lines are left unmasked. The interrupt flag is
/// not touched here; `sti` happens once at the end of bring-up.
pub fn setup() {
	IDT.load();
	unsafe {
		let mut pics = PICS.lock();
		pics.initialize();
		pics.write_masks(0b1111_1100, 0b1111_1111);
	}
}

fn irq_handler(stack_frame: InterruptStackFrame, irq: u8) {
	let callback = CALLBACKS.lock()[irq as usize];
	match callback {
		Some(callback) => callback(&stack_frame),
		None => {
			serial_println!("unhandled IRQ {}", irq);
			println!("unhandled IRQ {}", irq);
		}
	}
	// EOI goes out last, after the handler's own state updates are done.
	unsafe {
		PICS.lock().notify_end_of_interrupt(PIC_1_OFFSET + irq);
	}
}

/// Register a handler function to be called when the interrupt with the
/// given irq happens. Replaces any previously registered handler.
pub fn register_callback(irq: u8, callback: IrqCallback) {
	x86_64::instructions::interrupts::without_interrupts(|| {
		CALLBACKS.lock()[irq as usize] = Some(callback);
	});
}

/// Remove the handler for the given irq, returning the line to the default
/// log-and-EOI behaviour.
pub fn unregister_callback(irq: u8) {
	x86_64::instructions::interrupts::without_interrupts(|| {
		CALLBACKS.lock()[irq as usize] = None;
	});
}

fn apply_mask(masks: [u8; 2], irq: u8, masked: bool) -> [u8; 2] {
	let [mut master, mut slave] = masks;
	let which = if irq < 8 { &mut master } else { &mut slave };
	let bit = 1 << (irq % 8);
	if masked {
		*which |= bit;
	} else {
		*which &= !bit;
	}
	[master, slave]
}

fn change_mask(irq: u8, masked: bool) {
	x86_64::instructions::interrupts::without_interrupts(|| {
		let mut pics = PICS.lock();
		unsafe {
			let [master, slave] = apply_mask(pics.read_masks(), irq, masked);
			pics.write_masks(master, slave);
		}
	});
}

/// Open an irq line on the pics.
pub fn unmask_irq(irq: u8) {
	change_mask(irq, false);
}

/// Close an irq line on the pics.
pub fn mask_irq(irq: u8) {
	change_mask(irq, true);
}

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
	exception("division by zero", stack_frame)
}

extern "x86-interrupt" fn debug_handler(stack_frame: InterruptStackFrame) {
	exception("debug", stack_frame)
}

extern "x86-interrupt" fn non_maskable_interrupt_handler(stack_frame: InterruptStackFrame) {
	exception("non maskable interrupt", stack_frame)
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
	exception("breakpoint", stack_frame)
}

extern "x86-interrupt" fn overflow_handler(stack_frame: InterruptStackFrame) {
	exception("overflow", stack_frame)
}

extern "x86-interrupt" fn bound_range_exceeded_handler(stack_frame: InterruptStackFrame) {
	exception("bound range exceeded", stack_frame)
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
	exception("invalid opcode", stack_frame)
}

extern "x86-interrupt" fn device_not_available_handler(stack_frame: InterruptStackFrame) {
	exception("device not available", stack_frame)
}

/// Interrupt handler for double faults. Always halts.
extern "x86-interrupt" fn double_fault_handler(stack_frame: InterruptStackFrame, error_code: u64) -> ! {
	exception_error("double fault", stack_frame, error_code)
}

extern "x86-interrupt" fn invalid_tss_handler(stack_frame: InterruptStackFrame, error_code: u64) {
	exception_error("invalid tss", stack_frame, error_code)
}

extern "x86-interrupt" fn segment_not_present_handler(stack_frame: InterruptStackFrame, error_code: u64) {
	exception_error("segment not present", stack_frame, error_code)
}

extern "x86-interrupt" fn stack_segment_fault_handler(stack_frame: InterruptStackFrame, error_code: u64) {
	exception_error("stack segment fault", stack_frame, error_code)
}

extern "x86-interrupt" fn general_protection_fault_handler(stack_frame: InterruptStackFrame, error_code: u64) {
	exception_error("general protection fault", stack_frame, error_code)
}

/// Interrupt handler for page faults. Currently it **does not** solve the
/// page fault, rather prints the accessed address and halts.
extern "x86-interrupt" fn page_fault_handler(stack_frame: InterruptStackFrame, error_code: PageFaultErrorCode) {
	use x86_64::registers::control::Cr2;
	serial_println!("EXCEPTION: page fault");
	serial_println!(" - Accessed Address: {:?}", Cr2::read());
	serial_println!(" - Error Code: {:?}", error_code);
	serial_println!(" - {:#?}", stack_frame);
	println!("EXCEPTION: page fault at {:?}", Cr2::read());
	halt()
}

extern "x86-interrupt" fn x87_floating_point_handler(stack_frame: InterruptStackFrame) {
	exception("x87 floating point", stack_frame)
}

extern "x86-interrupt" fn alignment_check_handler(stack_frame: InterruptStackFrame, error_code: u64) {
	exception_error("alignment check", stack_frame, error_code)
}

extern "x86-interrupt" fn machine_check_handler(stack_frame: InterruptStackFrame) -> ! {
	exception("machine check", stack_frame)
}

extern "x86-interrupt" fn simd_floating_point_handler(stack_frame: InterruptStackFrame) {
	exception("simd floating point", stack_frame)
}

extern "x86-interrupt" fn virtualization_handler(stack_frame: InterruptStackFrame) {
	exception("virtualization", stack_frame)
}

extern "x86-interrupt" fn security_exception_handler(stack_frame: InterruptStackFrame, error_code: u64) {
	exception_error("security exception", stack_frame, error_code)
}

fn exception(name: &str, stack_frame: InterruptStackFrame) -> ! {
	serial_println!("EXCEPTION: {} \n - {:#?}", name, stack_frame);
	println!("EXCEPTION: {}", name);
	halt()
}

fn exception_error(name: &str, stack_frame: InterruptStackFrame, error_code: u64) -> ! {
	serial_println!(
		"EXCEPTION: {} \n - ERRORCODE:{} \n - {:#?}",
		name,
		error_code,
		stack_frame
	);
	println!("EXCEPTION: {} (error code {})", name, error_code);
	halt()
}

/// There is no recovery from an exception: clear the interrupt flag and
/// halt forever.
fn halt() -> ! {
	x86_64::instructions::interrupts::disable();
	loop {
		x86_64::instructions::hlt();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mask_bit_math() {
		// unmasking irq 3 clears bit 3 of the master mask
		assert_eq!(apply_mask([0xFF, 0xFF], 3, false), [0xF7, 0xFF]);
		// slave lines use the second mask byte
		assert_eq!(apply_mask([0xFF, 0xFF], 8, false), [0xFF, 0xFE]);
		assert_eq!(apply_mask([0xFF, 0xFF], 15, false), [0xFF, 0x7F]);
	}

	#[test]
	fn mask_roundtrip() {
		let opened = apply_mask([0xFF, 0xFF], 5, false);
		assert_eq!(apply_mask(opened, 5, true), [0xFF, 0xFF]);
	}

	#[test]
	fn boot_masks_open_timer_and_keyboard_only() {
		let mut masks = [0b1111_1100u8, 0b1111_1111u8];
		for irq in 2..16 {
			masks = apply_mask(masks, irq, true);
		}
		// masking everything above irq 1 changes nothing
		assert_eq!(masks, [0b1111_1100, 0b1111_1111]);
	}
}
