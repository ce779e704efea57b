/// Global descriptor table and task state segment.
pub mod gdt;
/// IDT, the chained pics, and per-IRQ dispatch.
pub mod interrupts;
/// PIT channel 0 tick clock and sleeps.
pub mod pit;
