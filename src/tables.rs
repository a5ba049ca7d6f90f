//! Precomputed lookup tables shared across voices (§4.1, §4.2).
//!
//! Both tables are built once at [`Engine`](crate::engine::Engine) construction
//! time and held as plain owned arrays; there is no process-wide singleton.

use std::f32::consts::PI;

/// Per-step logarithmic gain ratio: each table entry is this much quieter
/// than the next (~0.0235 dB).
const STEP_RATIO: f32 = 1.002_709_201;

/// 4096-entry logarithmic-to-linear volume gain table (§4.1).
#[derive(Debug, Clone)]
pub struct VolumeTable {
    gains: Box<[f32; 4096]>,
}

impl VolumeTable {
    pub fn new() -> Self {
        let mut gains = Box::new([0.0f32; 4096]);
        gains[4095] = 1.0;
        for i in (1..4096).rev() {
            gains[i - 1] = gains[i] / STEP_RATIO;
        }
        gains[0] = 0.0;
        Self { gains }
    }

    /// Gain for a 12-bit ramp index, clamped to the valid range.
    #[inline]
    pub fn get(&self, index: u16) -> f32 {
        self.gains[(index & 0x0FFF) as usize]
    }
}

impl Default for VolumeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Constant-power stereo gain pair for one of the 16 pan positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanGains {
    pub left: f32,
    pub right: f32,
}

/// 16-entry constant-power pan table (§4.2). Position 0 is hard-left, 7 is
/// center, 15 is hard-right.
#[derive(Debug, Clone)]
pub struct PanTable {
    positions: [PanGains; 16],
}

impl PanTable {
    pub fn new() -> Self {
        let mut positions = [PanGains { left: 0.0, right: 0.0 }; 16];
        for (p, slot) in positions.iter_mut().enumerate() {
            let p = p as f32;
            let denom = if p < 7.0 { 7.0 } else { 8.0 };
            let norm = (p - 7.0) / denom;
            let angle = (norm + 1.0) * PI / 4.0;
            *slot = PanGains {
                left: angle.cos(),
                right: angle.sin(),
            };
        }
        Self { positions }
    }

    /// Gain pair for a 4-bit pan index, clamped to `[0, 15]`.
    #[inline]
    pub fn get(&self, index: u8) -> PanGains {
        self.positions[index.min(15) as usize]
    }
}

impl Default for PanTable {
    fn default() -> Self {
        Self::new()
    }
}
