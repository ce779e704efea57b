/// Walking a song's notes against the tick clock.
pub mod player;
/// Songs that ship with the kernel.
pub mod songs;
/// PIT channel 2 and the speaker gate.
pub mod speaker;
