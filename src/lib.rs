//! Core wavetable synthesizer engine for a Gravis UltraSound GF1
//! emulation: 32 independent voices reading from a shared 1 MiB sample
//! store, mixed into a stereo frame stream through a soft limiter.
//!
//! [`Engine`] is the single entry point a host wires up: it owns every
//! piece of card state and borrows the host's downstream mixer, PIC, and
//! DMA channel in for the duration of each call (see [`collab`]).

pub mod collab;
pub mod config;
pub mod dma;
pub mod engine;
pub mod error;
pub mod irq;
pub mod memory;
pub mod registers;
pub mod sample_memory;
pub mod tables;
pub mod timer;
pub mod voice;

pub use engine::Engine;
pub use error::Error;
