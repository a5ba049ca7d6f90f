//! Per-voice phase/ramp state machine and sample generator (§3, §4.3–§4.6).
//!
//! A `Voice` is a plain value struct (per the design notes in `spec.md` §9):
//! it holds no back-reference to the engine. Shared state — sample memory,
//! the volume/pan tables, the mix accumulator, the IRQ aggregator, and the
//! engine-wide peak amplitude — is passed in by reference on every call.

use bitflags::bitflags;

use crate::irq::IrqAggregator;
use crate::limiter::StereoPeak;
use crate::memory::fixed_point::{FRAC_MASK, FRAC_BITS, ONE};
use crate::sample_memory::SampleMemory;
use crate::tables::{PanTable, VolumeTable};

bitflags! {
    /// Control flags shared by `wave_ctrl` and `ramp_ctrl` (§3). Bit 2 means
    /// "16-bit sample data" on `wave_ctrl` and "rollover only" on `ramp_ctrl";
    /// both names are kept as aliases for the same bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VoiceCtrl: u8 {
        const STOPPED       = 0b0000_0001;
        const STOP_REQUEST  = 0b0000_0010;
        const SIXTEEN_BIT   = 0b0000_0100;
        const ROLLOVER_ONLY = 0b0000_0100;
        const LOOP          = 0b0000_1000;
        const BIDIRECTIONAL = 0b0001_0000;
        const IRQ_ENABLED   = 0b0010_0000;
        const DECREASING    = 0b0100_0000;
        const IRQ_PENDING   = 0b1000_0000;
    }
}

/// Both bits set is the "manual IRQ" pattern described in §3.
const MANUAL_IRQ_MASK: u8 = VoiceCtrl::DECREASING.bits() | VoiceCtrl::IRQ_PENDING.bits();
/// Either bit set means the corresponding state machine does not advance (§4.4/§4.5).
const STOPPED_MASK: VoiceCtrl = VoiceCtrl::STOPPED.union(VoiceCtrl::STOP_REQUEST);

#[derive(Debug, Clone)]
pub struct Voice {
    index: usize,

    wave_start: u32,
    wave_end: u32,
    wave_addr: u32,
    wave_add: u32,
    wave_ctrl: VoiceCtrl,
    /// Raw 16-bit frequency register, kept for exact register read-back
    /// (`wave_add` is derived and lossy).
    freq: u16,

    ramp_start: u16,
    ramp_end: u16,
    ramp_cur: u16,
    ramp_incr: u16,
    ramp_ctrl: VoiceCtrl,
    /// Raw ramp-rate register, kept for read-back.
    ramp_rate: u8,

    pan_pot: u8,
}

impl Voice {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            wave_start: 0,
            wave_end: 0,
            wave_addr: 0,
            wave_add: 0,
            wave_ctrl: VoiceCtrl::STOPPED,
            freq: 0,
            ramp_start: 0,
            ramp_end: 0,
            ramp_cur: 0,
            ramp_incr: 0,
            ramp_ctrl: VoiceCtrl::STOPPED,
            ramp_rate: 0,
            pan_pot: 7,
        }
    }

    /// Full reset to the power-up / global-reset state (§4.10, global reg `0x4C`).
    pub fn reset(&mut self) {
        self.wave_ctrl = VoiceCtrl::STOPPED;
        self.ramp_ctrl = VoiceCtrl::STOPPED;
        self.pan_pot = 7;
        self.ramp_cur = 0;
    }

    fn stopped(ctrl: VoiceCtrl) -> bool {
        ctrl.intersects(STOPPED_MASK)
    }

    /// Whether this voice contributes nothing to the current block (§4.6).
    pub fn fully_disabled(&self) -> bool {
        Self::stopped(self.wave_ctrl) && Self::stopped(self.ramp_ctrl)
    }

    // --- register writes -------------------------------------------------

    pub fn write_wave_ctrl(&mut self, value: u8, irq: &mut IrqAggregator) {
        let new = VoiceCtrl::from_bits_truncate(value);
        Self::apply_manual_irq(self.wave_ctrl, new, self.index, irq, IrqAggregator::set_wave, IrqAggregator::clear_wave);
        self.wave_ctrl = new;
    }

    pub fn write_ramp_ctrl(&mut self, value: u8, irq: &mut IrqAggregator) {
        let new = VoiceCtrl::from_bits_truncate(value);
        Self::apply_manual_irq(self.ramp_ctrl, new, self.index, irq, IrqAggregator::set_ramp, IrqAggregator::clear_ramp);
        self.ramp_ctrl = new;
    }

    fn apply_manual_irq(
        old: VoiceCtrl,
        new: VoiceCtrl,
        index: usize,
        irq: &mut IrqAggregator,
        set: fn(&mut IrqAggregator, usize),
        clear: fn(&mut IrqAggregator, usize),
    ) {
        let was = old.bits() & MANUAL_IRQ_MASK == MANUAL_IRQ_MASK;
        let now = new.bits() & MANUAL_IRQ_MASK == MANUAL_IRQ_MASK;
        if now && !was {
            set(irq, index);
        } else if !now && was {
            clear(irq, index);
        }
    }

    pub fn wave_ctrl(&self) -> u8 {
        self.wave_ctrl.bits()
    }

    pub fn ramp_ctrl(&self) -> u8 {
        self.ramp_ctrl.bits()
    }

    pub fn write_freq(&mut self, freq: u16) {
        self.freq = freq;
        self.wave_add = (freq as u32).div_ceil(2);
    }

    pub fn freq(&self) -> u16 {
        self.freq
    }

    pub fn wave_add(&self) -> u32 {
        self.wave_add
    }

    pub fn write_wave_start_high(&mut self, value: u16) {
        self.wave_start = (self.wave_start & 0xFFFF) | ((value as u32) << 16);
    }

    pub fn write_wave_start_low(&mut self, value: u16) {
        self.wave_start = (self.wave_start & 0xFFFF_0000) | value as u32;
    }

    pub fn write_wave_end_high(&mut self, value: u16) {
        self.wave_end = (self.wave_end & 0xFFFF) | ((value as u32) << 16);
    }

    pub fn write_wave_end_low(&mut self, value: u16) {
        self.wave_end = (self.wave_end & 0xFFFF_0000) | value as u32;
    }

    pub fn write_wave_addr_high(&mut self, value: u16) {
        self.wave_addr = (self.wave_addr & 0xFFFF) | ((value as u32) << 16);
    }

    pub fn write_wave_addr_low(&mut self, value: u16) {
        self.wave_addr = (self.wave_addr & 0xFFFF_0000) | value as u32;
    }

    pub fn wave_start(&self) -> u32 {
        self.wave_start
    }

    pub fn wave_end(&self) -> u32 {
        self.wave_end
    }

    pub fn wave_addr(&self) -> u32 {
        self.wave_addr
    }

    /// Directly set the playback position (used by tests and by the host
    /// repositioning a voice outside of normal phase advancement).
    pub fn set_wave_addr(&mut self, addr: u32) {
        self.wave_addr = addr;
    }

    pub fn write_ramp_rate(&mut self, rate: u8) {
        self.ramp_rate = rate;
        let scale = (rate & 0x3F) as u32;
        let divider = 1u32 << (3 * (rate >> 6));
        self.ramp_incr = if scale == 0 || divider == 0 {
            0
        } else {
            scale.div_ceil(divider) as u16
        };
    }

    pub fn ramp_rate(&self) -> u8 {
        self.ramp_rate
    }

    pub fn write_ramp_start(&mut self, value: u8) {
        self.ramp_start = (value as u16) << 4;
    }

    pub fn write_ramp_end(&mut self, value: u8) {
        self.ramp_end = (value as u16) << 4;
    }

    pub fn ramp_start(&self) -> u8 {
        (self.ramp_start >> 4) as u8
    }

    pub fn ramp_end(&self) -> u8 {
        (self.ramp_end >> 4) as u8
    }

    pub fn write_ramp_cur(&mut self, value: u16) {
        self.ramp_cur = (value >> 4) & 0x0FFF;
    }

    pub fn ramp_cur(&self) -> u16 {
        self.ramp_cur << 4
    }

    pub fn write_pan(&mut self, value: u8) {
        self.pan_pot = (value & 0x0F).min(15);
    }

    pub fn pan(&self) -> u8 {
        self.pan_pot
    }

    // --- sample generation -------------------------------------------------

    /// Fetch, scale, pan and accumulate `n` frames into `acc`, advancing the
    /// phase and volume ramp after every frame (§4.6). `acc` must have at
    /// least `n` entries; entries beyond `n` are left untouched.
    pub fn generate(
        &mut self,
        n: usize,
        mem: &SampleMemory,
        volume_table: &VolumeTable,
        pan_table: &PanTable,
        acc: &mut [[f32; 2]],
        peak: &mut StereoPeak,
        irq: &mut IrqAggregator,
    ) {
        if self.fully_disabled() {
            return;
        }
        let gains = pan_table.get(self.pan_pot);
        for frame in acc.iter_mut().take(n) {
            let sample = self.fetch_sample(mem);
            let gain = volume_table.get(self.ramp_cur);
            let scaled = sample * gain;

            frame[0] += scaled * gains.left;
            frame[1] += scaled * gains.right;
            peak.left = peak.left.max(frame[0].abs());
            peak.right = peak.right.max(frame[1].abs());

            self.update_phase(irq);
            self.update_ramp(irq);
        }
    }

    fn fetch_sample(&self, mem: &SampleMemory) -> f32 {
        if self.wave_ctrl.contains(VoiceCtrl::SIXTEEN_BIT) {
            self.fetch_16(mem)
        } else {
            self.fetch_8(mem)
        }
    }

    fn fetch_8(&self, mem: &SampleMemory) -> f32 {
        let base = self.wave_addr >> FRAC_BITS;
        let s0 = mem.read_i8(base) as i32;
        debug_assert!(s0 <= i8::MAX as i32 && s0 >= i8::MIN as i32);

        if self.wave_add < ONE {
            let s1 = mem.read_i8(base.wrapping_add(1)) as i32;
            let frac = (self.wave_addr & FRAC_MASK) as f32 / ONE as f32;
            (s0 as f32 + (s1 - s0) as f32 * frac) * 256.0
        } else {
            (s0 * 256) as f32
        }
    }

    fn fetch_16(&self, mem: &SampleMemory) -> f32 {
        let base = self.wave_addr >> FRAC_BITS;
        let hold = base & 0x0C_0000;
        let addr = hold | ((base & 0x1_FFFF) << 1);

        let read_sample = |lo_addr: u32| -> i32 {
            let lsb = mem.read(lo_addr) as i32;
            let msb = mem.read_i8(lo_addr.wrapping_add(1)) as i32;
            (msb << 8) | lsb
        };

        let s0 = read_sample(addr);
        debug_assert!(s0 <= i16::MAX as i32 && s0 >= i16::MIN as i32);

        if self.wave_add < ONE {
            let s1 = read_sample(addr.wrapping_add(2));
            let frac = (self.wave_addr & FRAC_MASK) as f32 / ONE as f32;
            s0 as f32 + (s1 - s0) as f32 * frac
        } else {
            s0 as f32
        }
    }

    fn update_phase(&mut self, irq: &mut IrqAggregator) {
        if Self::stopped(self.wave_ctrl) {
            return;
        }
        let decreasing = self.wave_ctrl.contains(VoiceCtrl::DECREASING);
        let addr = self.wave_addr as i64;
        let add = self.wave_add as i64;
        let (new_addr, wave_left) = if decreasing {
            let new_addr = addr - add;
            (new_addr, self.wave_start as i64 - new_addr)
        } else {
            let new_addr = addr + add;
            (new_addr, new_addr - self.wave_end as i64)
        };
        self.wave_addr = new_addr as u32;

        if wave_left < 0 {
            return;
        }
        if self.wave_ctrl.contains(VoiceCtrl::IRQ_ENABLED) {
            irq.set_wave(self.index);
        }
        if self.ramp_ctrl.contains(VoiceCtrl::ROLLOVER_ONLY) {
            return;
        }
        if self.wave_ctrl.contains(VoiceCtrl::LOOP) {
            let mut decreasing = decreasing;
            if self.wave_ctrl.contains(VoiceCtrl::BIDIRECTIONAL) {
                self.wave_ctrl.toggle(VoiceCtrl::DECREASING);
                decreasing = !decreasing;
            }
            self.wave_addr = if decreasing {
                (self.wave_end as i64 - wave_left) as u32
            } else {
                (self.wave_start as i64 + wave_left) as u32
            };
        } else {
            self.wave_ctrl.insert(VoiceCtrl::STOPPED);
            self.wave_addr = if decreasing { self.wave_start } else { self.wave_end };
        }
    }

    fn update_ramp(&mut self, irq: &mut IrqAggregator) {
        if Self::stopped(self.ramp_ctrl) {
            return;
        }
        let decreasing = self.ramp_ctrl.contains(VoiceCtrl::DECREASING);
        let cur = self.ramp_cur as i32;
        let incr = self.ramp_incr as i32;
        let (new_cur, ramp_left) = if decreasing {
            let new_cur = cur - incr;
            (new_cur, self.ramp_start as i32 - new_cur)
        } else {
            let new_cur = cur + incr;
            (new_cur, new_cur - self.ramp_end as i32)
        };
        self.ramp_cur = new_cur.clamp(0, 4095) as u16;

        if ramp_left < 0 {
            return;
        }
        if self.ramp_ctrl.contains(VoiceCtrl::IRQ_ENABLED) {
            irq.set_ramp(self.index);
        }
        if self.ramp_ctrl.contains(VoiceCtrl::LOOP) {
            let mut decreasing = decreasing;
            if self.ramp_ctrl.contains(VoiceCtrl::BIDIRECTIONAL) {
                self.ramp_ctrl.toggle(VoiceCtrl::DECREASING);
                decreasing = !decreasing;
            }
            self.ramp_cur = if decreasing {
                (self.ramp_end as i32 - ramp_left).clamp(0, 4095) as u16
            } else {
                (self.ramp_start as i32 + ramp_left).clamp(0, 4095) as u16
            };
        } else {
            self.ramp_ctrl.insert(VoiceCtrl::STOPPED);
            self.ramp_cur = if decreasing { self.ramp_start } else { self.ramp_end };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_unity(voice: &mut Voice) {
        voice.write_ramp_cur(4095 << 4);
        voice.ramp_ctrl = VoiceCtrl::STOPPED;
    }

    #[test]
    fn stopped_voice_does_not_advance_or_emit() {
        let mut voice = Voice::new(0);
        voice.write_wave_start_low(0);
        voice.write_wave_end_low(255 << 9);
        voice.write_freq(1024);
        ramp_unity(&mut voice);
        voice.write_pan(7);
        // wave_ctrl defaults to STOPPED.
        let mem = SampleMemory::new();
        let volume = VolumeTable::new();
        let pan = PanTable::new();
        let mut irq = IrqAggregator::new(14);
        let mut peak = StereoPeak::default();
        let mut acc = vec![[0.0f32; 2]; 4];
        let addr_before = voice.wave_addr();
        voice.generate(4, &mem, &volume, &pan, &mut acc, &mut peak, &mut irq);
        assert_eq!(voice.wave_addr(), addr_before);
        assert_eq!(acc, vec![[0.0, 0.0]; 4]);
    }

    #[test]
    fn forward_8bit_play_stops_at_end_without_irq() {
        let mut mem = SampleMemory::new();
        for i in 0u32..256 {
            mem.write(i, (i as i32 - 128) as u8);
        }
        let mut voice = Voice::new(0);
        voice.write_wave_start_low(0);
        voice.write_wave_end_low(255 << 9);
        voice.write_freq(1024); // wave_add == 512 == ONE: no interpolation
        ramp_unity(&mut voice);
        voice.write_pan(7);
        voice.wave_ctrl = VoiceCtrl::empty(); // playing, 8-bit, no loop, not decreasing

        let volume = VolumeTable::new();
        let pan = PanTable::new();
        let mut irq = IrqAggregator::new(14);
        let mut peak = StereoPeak::default();
        let mut acc = vec![[0.0f32; 2]; 256];

        voice.generate(256, &mem, &volume, &pan, &mut acc, &mut peak, &mut irq);

        assert!(voice.wave_ctrl.contains(VoiceCtrl::STOPPED));
        assert!(!irq.wave_pending(0));
        let expected0 = (0i32 - 128) as f32 * 256.0 * std::f32::consts::FRAC_1_SQRT_2;
        assert!((acc[0][0] - expected0).abs() < 1.0);
    }

    #[test]
    fn looping_voice_sets_wave_irq_and_wraps() {
        let mem = SampleMemory::new();
        let mut voice = Voice::new(0);
        voice.write_wave_start_low(0);
        voice.write_wave_end_low(255 << 9);
        voice.write_freq(1024);
        ramp_unity(&mut voice);
        voice.wave_ctrl = VoiceCtrl::LOOP | VoiceCtrl::IRQ_ENABLED;

        let volume = VolumeTable::new();
        let pan = PanTable::new();
        let mut irq = IrqAggregator::new(14);
        let mut peak = StereoPeak::default();
        let mut acc = vec![[0.0f32; 2]; 300];

        voice.generate(300, &mem, &volume, &pan, &mut acc, &mut peak, &mut irq);

        assert!(irq.wave_pending(0));
        assert!(voice.wave_addr() >= voice.wave_start());
        assert!(voice.wave_addr() <= voice.wave_end());
    }

    #[test]
    fn bidirectional_loop_oscillates_between_bounds() {
        let mem = SampleMemory::new();
        let mut voice = Voice::new(0);
        voice.write_wave_start_low(0);
        voice.write_wave_end_low(8 << 9);
        voice.write_freq(1024);
        ramp_unity(&mut voice);
        voice.wave_ctrl = VoiceCtrl::LOOP | VoiceCtrl::BIDIRECTIONAL;

        let volume = VolumeTable::new();
        let pan = PanTable::new();
        let mut irq = IrqAggregator::new(14);
        let mut peak = StereoPeak::default();
        let mut acc = vec![[0.0f32; 2]; 400];

        voice.generate(400, &mem, &volume, &pan, &mut acc, &mut peak, &mut irq);

        assert!(voice.wave_addr() >= voice.wave_start());
        assert!(voice.wave_addr() <= voice.wave_end());
    }

    #[test]
    fn centered_pan_produces_equal_channels() {
        let mut mem = SampleMemory::new();
        mem.write(0, 64);
        let mut voice = Voice::new(0);
        voice.write_wave_start_low(0);
        voice.write_wave_end_low(1 << 9);
        voice.write_freq(1024);
        ramp_unity(&mut voice);
        voice.write_pan(7);
        voice.wave_ctrl = VoiceCtrl::LOOP;

        let volume = VolumeTable::new();
        let pan = PanTable::new();
        let mut irq = IrqAggregator::new(14);
        let mut peak = StereoPeak::default();
        let mut acc = vec![[0.0f32; 2]; 1];

        voice.generate(1, &mem, &volume, &pan, &mut acc, &mut peak, &mut irq);
        assert!((acc[0][0] - acc[0][1]).abs() < 1e-3);
    }

    #[test]
    fn frequency_roundtrip_and_wave_add_derivation() {
        let mut voice = Voice::new(0);
        voice.write_freq(1001);
        assert_eq!(voice.freq(), 1001);
        assert_eq!(voice.wave_add(), 501); // ceil(1001/2)
    }

    #[test]
    fn manual_irq_pattern_sets_and_clears_aggregator_bit() {
        let mut voice = Voice::new(3);
        let mut irq = IrqAggregator::new(14);
        voice.write_wave_ctrl(0xC0, &mut irq);
        assert!(irq.wave_pending(3));
        voice.write_wave_ctrl(0x00, &mut irq);
        assert!(!irq.wave_pending(3));
    }
}
