//! Narrow collaborator traits the host implements (§6).
//!
//! These mirror the teacher's `Mapper`/`ExpansionAudio` style: small traits
//! with the minimum surface the core actually calls, so the host can plug
//! in whatever DMA controller, PIC, and downstream resampler it already has
//! without the core knowing their concrete types.

/// The downstream consumer of mixed stereo frames (§6 "Downstream mixer
/// contract").
pub trait Mixer {
    /// Receive up to 64 interleaved signed 16-bit stereo frames.
    fn push_block(&mut self, frames: &[[i16; 2]]);
    /// The card's base mix rate changed (driven by active-voice count).
    fn set_frequency(&mut self, hz: u32);
    /// Enable or disable the mix callback entirely.
    fn enable(&mut self, enabled: bool);
}

/// The host's programmable interrupt controller (§6 "PIC collaborator
/// contract").
pub trait Pic {
    /// Edge the given host IRQ line.
    fn activate_irq(&mut self, irq_number: u8);
}

/// One host DMA channel (§6 "DMA collaborator contract").
pub trait DmaChannel {
    /// Bytes remaining in the host's current transfer descriptor.
    fn current_count(&self) -> usize;
    /// Whether the channel is configured for 16-bit transfers (doubles the
    /// effective byte count, §4.9).
    fn is_16bit(&self) -> bool;
    /// Copy `count` bytes from host memory into `dst` (card reads from
    /// host, i.e. host-to-card upload).
    fn read(&mut self, count: usize, dst: &mut [u8]);
    /// Copy `count` bytes from `src` to host memory (card-to-host).
    fn write(&mut self, count: usize, src: &[u8]);
    /// Register (or clear, with `None`) a callback the channel invokes the
    /// next time it is unmasked.
    fn register_callback(&mut self, callback: Option<Box<dyn FnMut() + Send>>);
}
