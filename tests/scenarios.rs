//! End-to-end mix scenarios exercising `Engine` purely through its port
//! interface, the way a host would drive it.

use gus_core::collab::{Mixer, Pic};
use gus_core::engine::Engine;
use gus_core::memory::{global_reg, port};
use gus_core::voice::VoiceCtrl;

struct RecordingMixer {
    frames: Vec<[i16; 2]>,
    frequency: u32,
    enabled: bool,
}

impl RecordingMixer {
    fn new() -> Self {
        Self { frames: Vec::new(), frequency: 0, enabled: false }
    }
}

impl Mixer for RecordingMixer {
    fn push_block(&mut self, frames: &[[i16; 2]]) {
        self.frames.extend_from_slice(frames);
    }
    fn set_frequency(&mut self, hz: u32) {
        self.frequency = hz;
    }
    fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

struct RecordingPic {
    activations: Vec<u8>,
}

impl RecordingPic {
    fn new() -> Self {
        Self { activations: Vec::new() }
    }
}

impl Pic for RecordingPic {
    fn activate_irq(&mut self, irq_number: u8) {
        self.activations.push(irq_number);
    }
}

fn select_voice(engine: &mut Engine, voice: u8, pic: &mut RecordingPic, mixer: &mut RecordingMixer) {
    engine.write_port(port::CURRENT_VOICE, voice, pic, mixer);
}

fn write_global(engine: &mut Engine, index: u8, data: u16, pic: &mut RecordingPic, mixer: &mut RecordingMixer) {
    engine.write_port(port::GLOBAL_REG_SELECT, index, pic, mixer);
    engine.write_port(port::GLOBAL_REG_DATA_LOW, (data & 0xFF) as u8, pic, mixer);
    engine.write_port(port::GLOBAL_REG_DATA_HIGH, (data >> 8) as u8, pic, mixer);
}

/// Single-byte global registers (`WAVE_CTRL`, `PAN_POT`, `RESET`, ...) are
/// triggered by writing the value straight to the high-byte port, the same
/// way real driver code pokes `0x305` directly without bothering with the
/// low-byte latch (§6).
fn write_global_byte(engine: &mut Engine, index: u8, value: u8, pic: &mut RecordingPic, mixer: &mut RecordingMixer) {
    engine.write_port(port::GLOBAL_REG_SELECT, index, pic, mixer);
    engine.write_port(port::GLOBAL_REG_DATA_HIGH, value, pic, mixer);
}

fn load_ramp_into_memory(engine: &mut Engine) {
    let mem = engine.sample_memory_mut();
    for i in 0u32..256 {
        mem.write(i, (i as i32 - 128) as u8);
    }
}

fn setup_voice0_forward(engine: &mut Engine, wave_ctrl: u8, pic: &mut RecordingPic, mixer: &mut RecordingMixer) {
    select_voice(engine, 0, pic, mixer);
    write_global(engine, global_reg::WAVE_START_LOW, 0, pic, mixer);
    write_global(engine, global_reg::WAVE_START_HIGH, 0, pic, mixer);
    write_global(engine, global_reg::WAVE_END_LOW, (255u16 << 9) & 0xFFFF, pic, mixer);
    write_global(engine, global_reg::WAVE_END_HIGH, (255u32 << 9 >> 16) as u16, pic, mixer);
    write_global(engine, global_reg::WAVE_ADDR_LOW, 0, pic, mixer);
    write_global(engine, global_reg::WAVE_ADDR_HIGH, 0, pic, mixer);
    write_global(engine, global_reg::WAVE_FREQ, 1024, pic, mixer); // wave_add = 512 = 1<<9
    write_global(engine, global_reg::RAMP_CUR, 4095 << 4, pic, mixer);
    write_global_byte(engine, global_reg::PAN_POT, 7, pic, mixer);
    write_global_byte(engine, global_reg::WAVE_CTRL, wave_ctrl, pic, mixer);
}

#[test]
fn s1_silence_after_reset() {
    let mut engine = Engine::new();
    let mut mixer = RecordingMixer::new();
    let mut pic = RecordingPic::new();

    write_global_byte(&mut engine, global_reg::RESET, 0x01, &mut pic, &mut mixer);
    engine.mix_block(64, &mut mixer, &mut pic);

    assert_eq!(mixer.frames.len(), 64);
    assert!(mixer.frames.iter().all(|f| *f == [0, 0]));
}

#[test]
fn s2_single_8bit_forward_play() {
    let mut engine = Engine::new();
    let mut mixer = RecordingMixer::new();
    let mut pic = RecordingPic::new();

    load_ramp_into_memory(&mut engine);
    setup_voice0_forward(&mut engine, 0, &mut pic, &mut mixer); // playing, 8-bit, no loop

    for _ in 0..4 {
        engine.mix_block(64, &mut mixer, &mut pic);
    }

    assert_eq!(mixer.frames.len(), 256);
    for k in 0..256usize {
        let expected = (k as i32 - 128) as f32 * 256.0 * std::f32::consts::FRAC_1_SQRT_2;
        let actual = mixer.frames[k][0] as f32;
        assert!((actual - expected).abs() <= 1.0, "k={k}: expected {expected}, got {actual}");
    }
    assert!(!engine.irq().wave_pending(0));
}

#[test]
fn s3_looping_with_irq() {
    let mut engine = Engine::new();
    let mut mixer = RecordingMixer::new();
    let mut pic = RecordingPic::new();

    load_ramp_into_memory(&mut engine);
    let ctrl = (VoiceCtrl::LOOP | VoiceCtrl::IRQ_ENABLED).bits();
    setup_voice0_forward(&mut engine, ctrl, &mut pic, &mut mixer);

    for _ in 0..5 {
        engine.mix_block(64, &mut mixer, &mut pic);
    }

    assert!(engine.irq().wave_pending(0));
    let addr = engine.voice(0).wave_addr();
    assert!(addr >= engine.voice(0).wave_start());
    assert!(addr <= engine.voice(0).wave_end());
}

#[test]
fn s4_bidirectional_loop_oscillates() {
    let mut engine = Engine::new();
    let mut mixer = RecordingMixer::new();
    let mut pic = RecordingPic::new();

    select_voice(&mut engine, 0, &mut pic, &mut mixer);
    write_global(&mut engine, global_reg::WAVE_START_LOW, 0, &mut pic, &mut mixer);
    write_global(&mut engine, global_reg::WAVE_END_LOW, 8 << 9, &mut pic, &mut mixer);
    write_global(&mut engine, global_reg::WAVE_ADDR_LOW, 0, &mut pic, &mut mixer);
    write_global(&mut engine, global_reg::WAVE_FREQ, 1024, &mut pic, &mut mixer);
    write_global(&mut engine, global_reg::RAMP_CUR, 4095 << 4, &mut pic, &mut mixer);
    write_global_byte(&mut engine, global_reg::PAN_POT, 7, &mut pic, &mut mixer);
    let ctrl = (VoiceCtrl::LOOP | VoiceCtrl::BIDIRECTIONAL).bits();
    write_global_byte(&mut engine, global_reg::WAVE_CTRL, ctrl, &mut pic, &mut mixer);

    for _ in 0..8 {
        engine.mix_block(64, &mut mixer, &mut pic);
        let addr = engine.voice(0).wave_addr();
        assert!(addr >= engine.voice(0).wave_start());
        assert!(addr <= engine.voice(0).wave_end());
    }
}

#[test]
fn s5_pan_centering_produces_equal_channels() {
    let mut engine = Engine::new();
    let mut mixer = RecordingMixer::new();
    let mut pic = RecordingPic::new();

    load_ramp_into_memory(&mut engine);
    let ctrl = VoiceCtrl::LOOP.bits();
    setup_voice0_forward(&mut engine, ctrl, &mut pic, &mut mixer);

    engine.mix_block(64, &mut mixer, &mut pic);

    for frame in &mixer.frames {
        assert!((frame[0] - frame[1]).abs() <= 1);
    }
}

#[test]
fn s6_soft_limiter_engages_then_releases() {
    let mut engine = Engine::new();
    let mut mixer = RecordingMixer::new();
    let mut pic = RecordingPic::new();

    // Three loud hard-left 16-bit voices together push the accumulator well
    // past INT16_MAX so the limiter must engage.
    for voice in 0..3u8 {
        select_voice(&mut engine, voice, &mut pic, &mut mixer);
        {
            let mem = engine.sample_memory_mut();
            let base = (voice as u32) * 4;
            mem.write(base, 0xFF); // LSB
            mem.write(base + 1, 0x7F); // MSB -> 0x7FFF
        }
        write_global(&mut engine, global_reg::WAVE_START_LOW, 0, &mut pic, &mut mixer);
        write_global(&mut engine, global_reg::WAVE_END_LOW, 1 << 9, &mut pic, &mut mixer);
        write_global(
            &mut engine,
            global_reg::WAVE_ADDR_LOW,
            ((voice as u32 * 2) << 9) as u16,
            &mut pic,
            &mut mixer,
        );
        write_global(&mut engine, global_reg::WAVE_FREQ, 1024, &mut pic, &mut mixer);
        write_global(&mut engine, global_reg::RAMP_CUR, 4095 << 4, &mut pic, &mut mixer);
        write_global_byte(&mut engine, global_reg::PAN_POT, 0, &mut pic, &mut mixer); // hard left
        let ctrl = (VoiceCtrl::LOOP | VoiceCtrl::SIXTEEN_BIT).bits();
        write_global_byte(&mut engine, global_reg::WAVE_CTRL, ctrl, &mut pic, &mut mixer);
    }

    engine.mix_block(4, &mut mixer, &mut pic);
    assert!(mixer.frames.iter().all(|f| f[0] <= i16::MAX && f[0] >= i16::MIN));
    let peak_after_loud_block = engine.peak();
    assert!(peak_after_loud_block.left >= gus_core::limiter::THRESHOLD);

    // Stop every voice and keep mixing quiet blocks; the limiter must
    // release, one volume step per block, until it is no longer limiting.
    for voice in 0..3u8 {
        select_voice(&mut engine, voice, &mut pic, &mut mixer);
        write_global_byte(&mut engine, global_reg::WAVE_CTRL, 0x01, &mut pic, &mut mixer);
    }
    let mut blocks = 0;
    while engine.peak().left >= gus_core::limiter::THRESHOLD && blocks < 10_000 {
        engine.mix_block(4, &mut mixer, &mut pic);
        blocks += 1;
    }
    assert!(engine.peak().left < gus_core::limiter::THRESHOLD);
}
