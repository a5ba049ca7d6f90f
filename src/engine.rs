//! Top-level orchestrator: register port dispatch and the per-block mix
//! callback (§4.10).
//!
//! `Engine` is the single owned value the host constructs once (§9,
//! "Global mutable card state... becomes a single owned `Engine` value").
//! It owns every piece of state the CORE is responsible for; the host's
//! mixer, PIC, and DMA channel are borrowed in for the duration of each
//! call rather than stored, keeping `Engine` free of any reference back
//! into host state.

use tracing::{debug, trace, warn};

use crate::collab::{DmaChannel, Mixer, Pic};
use crate::dma::DmaEngine;
use crate::irq::IrqAggregator;
use crate::limiter::{SoftLimiter, StereoPeak};
use crate::memory::{global_reg, port};
use crate::registers::GlobalRegs;
use crate::sample_memory::SampleMemory;
use crate::tables::{PanTable, VolumeTable};
use crate::timer::TimerBank;
use crate::voice::Voice;

/// Maximum frames Engine will mix in a single callback (§4.10).
pub const MAX_BLOCK_FRAMES: usize = 64;

pub struct Engine {
    voices: Vec<Voice>,
    sample_memory: SampleMemory,
    volume_table: VolumeTable,
    pan_table: PanTable,
    irq: IrqAggregator,
    timers: TimerBank,
    dma: DmaEngine,
    regs: GlobalRegs,
    limiter: SoftLimiter,
    peak: StereoPeak,

    /// Pending low byte of a global register data write (port `0x304`),
    /// latched until the high byte write at `0x305` executes it.
    data_latch_low: u8,
    /// Resolved IRQ/DMA line numbers, applied by the most recent `0x20B`
    /// write (§6).
    assigned_irq: u8,
    assigned_dma: u8,

    mix_buffer: Vec<[f32; 2]>,
    output_buffer: Vec<[i16; 2]>,
}

impl Engine {
    pub fn new() -> Self {
        let regs = GlobalRegs::new();
        let voices = (0..32).map(Voice::new).collect();
        Self {
            voices,
            sample_memory: SampleMemory::new(),
            volume_table: VolumeTable::new(),
            pan_table: PanTable::new(),
            irq: IrqAggregator::new(regs.active_voices()),
            timers: TimerBank::new(),
            dma: DmaEngine::new(),
            regs,
            limiter: SoftLimiter::new(),
            peak: StereoPeak::after_reset(),
            data_latch_low: 0,
            assigned_irq: 0,
            assigned_dma: 0,
            mix_buffer: Vec::with_capacity(MAX_BLOCK_FRAMES),
            output_buffer: Vec::with_capacity(MAX_BLOCK_FRAMES),
        }
    }

    /// Direct access to sample memory for host single-byte pokes outside
    /// the `0x307` port path, and for tests staging sample data.
    pub fn sample_memory_mut(&mut self) -> &mut SampleMemory {
        &mut self.sample_memory
    }

    pub fn sample_memory(&self) -> &SampleMemory {
        &self.sample_memory
    }

    pub fn voice(&self, index: usize) -> &Voice {
        &self.voices[index]
    }

    pub fn irq(&self) -> &IrqAggregator {
        &self.irq
    }

    pub fn peak(&self) -> StereoPeak {
        self.peak
    }

    // --- register I/O ------------------------------------------------------

    pub fn write_port(&mut self, offset: u16, value: u8, pic: &mut dyn Pic, mixer: &mut dyn Mixer) {
        match offset {
            port::MIX_CONTROL => self.regs.write_mix_control(value),
            port::TIMER_STATUS_CMD => self.timers.write_command(value),
            port::TIMER_MASK_CMD => {
                self.timers.write_raise_irq_mask(value & 0x01 != 0, value & 0x02 != 0);
            }
            port::IRQ_DMA_ASSIGN => self.apply_irq_dma_assignment(value),
            port::CURRENT_VOICE => self.regs.select_voice(value),
            port::GLOBAL_REG_SELECT => {
                self.regs.select_register(value);
                self.data_latch_low = 0;
            }
            port::GLOBAL_REG_DATA_LOW => self.data_latch_low = value,
            port::GLOBAL_REG_DATA_HIGH => {
                let data = ((value as u16) << 8) | self.data_latch_low as u16;
                self.execute_global_write(self.regs.selected_register(), data, pic, mixer);
            }
            port::DRAM_IO => {
                let addr = self.regs.dram_addr();
                self.sample_memory.write(addr, value);
            }
            _ => warn!(offset, value, "write to unmapped GUS port"),
        }
    }

    /// 16-bit word write to `0x304`: executes immediately (§6).
    pub fn write_port16(&mut self, offset: u16, value: u16, pic: &mut dyn Pic, mixer: &mut dyn Mixer) {
        if offset == port::GLOBAL_REG_DATA_LOW {
            self.execute_global_write(self.regs.selected_register(), value, pic, mixer);
        } else {
            warn!(offset, value, "16-bit write to a port that only supports 8-bit access");
        }
    }

    pub fn read_port(&mut self, offset: u16) -> u8 {
        match offset {
            port::IRQ_STATUS => self.irq.status_byte() | self.timers.status_byte(),
            port::TIMER_STATUS_CMD | port::TIMER_CMD_MIRROR => self.timers.status_byte(),
            port::CURRENT_VOICE => self.regs.selected_voice() as u8,
            port::GLOBAL_REG_SELECT => self.regs.selected_register(),
            port::GLOBAL_REG_DATA_LOW => {
                (self.execute_global_read(self.regs.selected_register()) & 0xFF) as u8
            }
            port::GLOBAL_REG_DATA_HIGH => {
                (self.execute_global_read(self.regs.selected_register()) >> 8) as u8
            }
            port::DRAM_IO => self.sample_memory.read(self.regs.dram_addr()),
            _ => {
                warn!(offset, "read from unmapped GUS port");
                0
            }
        }
    }

    fn apply_irq_dma_assignment(&mut self, value: u8) {
        let index = (value & 0x07) as usize;
        if self.regs.mix_control() & 0b0100_0000 != 0 {
            self.assigned_irq = crate::memory::assignment::IRQ_LUT[index];
        } else {
            self.assigned_dma = crate::memory::assignment::DMA_LUT[index];
        }
    }

    fn execute_global_write(&mut self, index: u8, data: u16, pic: &mut dyn Pic, mixer: &mut dyn Mixer) {
        let voice_idx = self.regs.selected_voice();
        // Registers narrower than 16 bits are triggered by the high-byte
        // write to `0x305`; the byte that matters is the one just written,
        // which lands in the high half of the reassembled word (§6).
        let byte = (data >> 8) as u8;
        match index {
            global_reg::WAVE_CTRL => self.voices[voice_idx].write_wave_ctrl(byte, &mut self.irq),
            global_reg::WAVE_FREQ => self.voices[voice_idx].write_freq(data),
            global_reg::WAVE_START_HIGH => self.voices[voice_idx].write_wave_start_high(data),
            global_reg::WAVE_START_LOW => self.voices[voice_idx].write_wave_start_low(data),
            global_reg::WAVE_END_HIGH => self.voices[voice_idx].write_wave_end_high(data),
            global_reg::WAVE_END_LOW => self.voices[voice_idx].write_wave_end_low(data),
            global_reg::RAMP_RATE => self.voices[voice_idx].write_ramp_rate(byte),
            global_reg::RAMP_START => self.voices[voice_idx].write_ramp_start(byte),
            global_reg::RAMP_END => self.voices[voice_idx].write_ramp_end(byte),
            global_reg::RAMP_CTRL => self.voices[voice_idx].write_ramp_ctrl(byte, &mut self.irq),
            global_reg::WAVE_ADDR_HIGH => self.voices[voice_idx].write_wave_addr_high(data),
            global_reg::WAVE_ADDR_LOW => self.voices[voice_idx].write_wave_addr_low(data),
            global_reg::PAN_POT => self.voices[voice_idx].write_pan(byte),
            global_reg::RAMP_CUR => self.voices[voice_idx].write_ramp_cur(data),
            global_reg::ACTIVE_VOICES => self.set_active_voices(byte, mixer),
            global_reg::DMA_CONTROL => self.dma.write_control(byte),
            global_reg::DMA_LOW => self.dma.write_addr_low(byte),
            global_reg::DMA_HIGH => self.dma.write_addr_high(byte),
            global_reg::DRAM_LOW => self.regs.write_dram_addr_low(data),
            global_reg::DRAM_HIGH => self.regs.write_dram_addr_high(byte),
            global_reg::TIMER1_COUNT => self.timers.timer0.write_count(byte),
            global_reg::TIMER2_COUNT => self.timers.timer1.write_count(byte),
            global_reg::RESET => self.apply_reset(byte, mixer),
            _ => debug!(index, data, "unknown global register write ignored"),
        }
        if self.irq.recompute() && self.regs.irq_line_enabled() {
            pic.activate_irq(self.assigned_irq);
        }
    }

    fn execute_global_read(&mut self, index: u8) -> u16 {
        let voice_idx = self.regs.selected_voice();
        match index {
            global_reg::WAVE_CTRL => self.voices[voice_idx].wave_ctrl() as u16,
            global_reg::WAVE_FREQ => self.voices[voice_idx].freq(),
            global_reg::WAVE_START_HIGH => (self.voices[voice_idx].wave_start() >> 16) as u16,
            global_reg::WAVE_START_LOW => (self.voices[voice_idx].wave_start() & 0xFFFF) as u16,
            global_reg::WAVE_END_HIGH => (self.voices[voice_idx].wave_end() >> 16) as u16,
            global_reg::WAVE_END_LOW => (self.voices[voice_idx].wave_end() & 0xFFFF) as u16,
            global_reg::RAMP_RATE => self.voices[voice_idx].ramp_rate() as u16,
            global_reg::RAMP_START => self.voices[voice_idx].ramp_start() as u16,
            global_reg::RAMP_END => self.voices[voice_idx].ramp_end() as u16,
            global_reg::RAMP_CTRL => self.voices[voice_idx].ramp_ctrl() as u16,
            global_reg::WAVE_ADDR_HIGH => (self.voices[voice_idx].wave_addr() >> 16) as u16,
            global_reg::WAVE_ADDR_LOW => (self.voices[voice_idx].wave_addr() & 0xFFFF) as u16,
            global_reg::PAN_POT => self.voices[voice_idx].pan() as u16,
            global_reg::RAMP_CUR => self.voices[voice_idx].ramp_cur(),
            global_reg::ACTIVE_VOICES => (self.regs.active_voices() - 1) as u16,
            global_reg::DMA_CONTROL => self.dma.control() as u16,
            global_reg::DRAM_LOW => (self.regs.dram_addr() & 0xFFFF) as u16,
            global_reg::DRAM_HIGH => ((self.regs.dram_addr() >> 16) & 0xFF) as u16,
            global_reg::TIMER1_COUNT => self.timers.timer0.count() as u16,
            global_reg::TIMER2_COUNT => self.timers.timer1.count() as u16,
            global_reg::VOICE_IRQ_STATUS => {
                let chan = self.irq.irq_chan();
                let wave = self.irq.wave_pending(chan);
                let ramp = self.irq.ramp_pending(chan);
                let mut status = chan as u16 & 0x1F;
                if wave {
                    status |= 0x40;
                }
                if ramp {
                    status |= 0x80;
                }
                self.irq.ack_current();
                status
            }
            _ => {
                debug!(index, "unknown global register read, returning 0");
                0
            }
        }
    }

    fn set_active_voices(&mut self, data: u8, mixer: &mut dyn Mixer) {
        let active = self.regs.write_active_voices_raw(data);
        self.irq.set_active_voices(active);
        let rate = self.regs.base_mix_rate();
        mixer.set_frequency(rate);
        for voice in self.voices.iter_mut() {
            // Re-derive wave_add/ramp_incr from their already-stored raw
            // registers so a rate change takes effect without losing state.
            let freq = voice.freq();
            voice.write_freq(freq);
            let rate = voice.ramp_rate();
            voice.write_ramp_rate(rate);
        }
        mixer.enable(true);
    }

    fn apply_reset(&mut self, data: u8, mixer: &mut dyn Mixer) {
        if data & 0x01 != 0 {
            for voice in self.voices.iter_mut() {
                voice.reset();
            }
            self.irq.reset();
            self.timers.reset();
            self.peak = StereoPeak::after_reset();
            trace!("full synthesizer reset performed");
        }
        let irq_enabled = data & 0x04 != 0;
        mixer.enable(irq_enabled);
    }

    // --- mix callback --------------------------------------------------

    /// Mix `n` (≤ [`MAX_BLOCK_FRAMES`]) frames, emit them to `mixer`, and
    /// re-evaluate the IRQ aggregator (§4.10).
    pub fn mix_block(&mut self, n: usize, mixer: &mut dyn Mixer, pic: &mut dyn Pic) {
        let n = n.min(MAX_BLOCK_FRAMES);
        self.mix_buffer.clear();
        self.mix_buffer.resize(n, [0.0, 0.0]);

        for voice_idx in 0..self.regs.active_voices() {
            self.voices[voice_idx].generate(
                n,
                &self.sample_memory,
                &self.volume_table,
                &self.pan_table,
                &mut self.mix_buffer,
                &mut self.peak,
                &mut self.irq,
            );
        }

        self.limiter.process(&self.mix_buffer, &mut self.peak, &mut self.output_buffer);
        mixer.push_block(&self.output_buffer);

        if self.irq.recompute() && self.regs.irq_line_enabled() {
            pic.activate_irq(self.assigned_irq);
        }
    }

    /// Advance both timers by `elapsed_us` microseconds, notifying the PIC
    /// on a newly-raised timer IRQ (§4.8).
    pub fn advance_timers(&mut self, elapsed_us: f64, pic: &mut dyn Pic) {
        let (t0, t1) = self.timers.advance(elapsed_us);
        if t0 {
            self.irq.set_timer_bit(crate::irq::STATUS_TIMER0);
        }
        if t1 {
            self.irq.set_timer_bit(crate::irq::STATUS_TIMER1);
        }
        if (t0 || t1) && self.regs.irq_line_enabled() {
            pic.activate_irq(self.assigned_irq);
        }
    }

    /// Trigger a DMA transfer after the host unmasks `channel` (§4.9).
    pub fn begin_dma_transfer(&mut self, channel: &mut dyn DmaChannel, pic: &mut dyn Pic) {
        let notify = self.dma.begin_transfer(channel, &mut self.sample_memory, &mut self.irq);
        if notify && self.regs.irq_line_enabled() {
            pic.activate_irq(self.assigned_dma);
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
