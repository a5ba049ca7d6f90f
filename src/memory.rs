//! Shared layout constants: sample memory sizing, fixed-point shifts, the
//! host register port map, and global register indices.
//!
//! Centralizing these keeps the hardware layout in one location and avoids
//! magic numbers scattered across `voice`, `registers`, and `engine`.

/// Sample memory geometry (§3).
pub mod sample {
    /// Total size of the on-card sample store, in bytes.
    pub const SIZE: usize = 1 << 20;
    /// Mask applied to an address to wrap it modulo [`SIZE`].
    pub const ADDR_MASK: u32 = (SIZE as u32) - 1;
}

/// 20.9 fixed-point phase layout (§3, §9).
pub mod fixed_point {
    /// Number of fractional bits in a `wave_addr`/`wave_add` value.
    pub const FRAC_BITS: u32 = 9;
    /// `1 << FRAC_BITS`: one whole sample-memory byte in fixed-point units.
    pub const ONE: u32 = 1 << FRAC_BITS;
    /// Mask isolating the fractional part of a fixed-point address.
    pub const FRAC_MASK: u32 = ONE - 1;
}

/// Host register port offsets, relative to the card's configured base port
/// (§6, "Register port map").
pub mod port {
    pub const MIX_CONTROL: u16 = 0x200;
    pub const IRQ_STATUS: u16 = 0x206;
    pub const TIMER_STATUS_CMD: u16 = 0x208;
    pub const TIMER_MASK_CMD: u16 = 0x209;
    pub const TIMER_CMD_MIRROR: u16 = 0x20A;
    pub const IRQ_DMA_ASSIGN: u16 = 0x20B;
    pub const CURRENT_VOICE: u16 = 0x302;
    pub const GLOBAL_REG_SELECT: u16 = 0x303;
    pub const GLOBAL_REG_DATA_LOW: u16 = 0x304;
    pub const GLOBAL_REG_DATA_HIGH: u16 = 0x305;
    pub const DRAM_IO: u16 = 0x307;
}

/// Lookup tables used by port `0x20B` to translate the low 3 bits of a
/// written value into an IRQ line or DMA channel number (§6).
pub mod assignment {
    pub const IRQ_LUT: [u8; 8] = [0, 2, 5, 3, 7, 11, 12, 15];
    pub const DMA_LUT: [u8; 8] = [0, 1, 3, 5, 6, 7, 0, 0];
}

/// Global register indices (`spec.md` §3/§4.10; per-voice register space
/// assigned per `SPEC_FULL.md` §3 "supplemented features").
pub mod global_reg {
    pub const WAVE_CTRL: u8 = 0x00;
    pub const WAVE_FREQ: u8 = 0x01;
    pub const WAVE_START_HIGH: u8 = 0x02;
    pub const WAVE_START_LOW: u8 = 0x03;
    pub const WAVE_END_HIGH: u8 = 0x04;
    pub const WAVE_END_LOW: u8 = 0x05;
    pub const RAMP_RATE: u8 = 0x06;
    pub const RAMP_START: u8 = 0x07;
    pub const RAMP_END: u8 = 0x08;
    pub const RAMP_CTRL: u8 = 0x09;
    pub const WAVE_ADDR_HIGH: u8 = 0x0A;
    pub const WAVE_ADDR_LOW: u8 = 0x0B;
    pub const PAN_POT: u8 = 0x0C;
    pub const RAMP_CUR: u8 = 0x0D;
    pub const ACTIVE_VOICES: u8 = 0x0E;
    pub const CURRENT_VOICE_IRQ: u8 = 0x0F;

    pub const DMA_LOW: u8 = 0x42;
    pub const DMA_HIGH: u8 = 0x43;
    pub const DMA_CONTROL: u8 = 0x41;
    pub const DRAM_LOW: u8 = 0x44;
    pub const DRAM_HIGH: u8 = 0x45;
    pub const TIMER1_COUNT: u8 = 0x46;
    pub const TIMER2_COUNT: u8 = 0x47;

    pub const RESET: u8 = 0x4C;

    /// Status register published at `0x8F` (voice IRQ source + `irq_chan`).
    pub const VOICE_IRQ_STATUS: u8 = 0x8F;
}
