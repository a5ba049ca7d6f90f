//! The two Adlib-compatible programmable timers (§3, §4.8).
//!
//! Real hardware schedules timer expiry with an external clock; this core
//! has no scheduler of its own (§5: "cooperative single-threaded... all
//! operations complete synchronously"), so [`Timer::advance`] is an explicit
//! tick the [`Engine`](crate::engine::Engine) calls once per mix block with
//! the elapsed wall-clock microseconds for that block.

/// Base tick period, in microseconds, for timer 0.
const BASE_PERIOD_0_US: f64 = 80.0;
/// Base tick period, in microseconds, for timer 1.
const BASE_PERIOD_1_US: f64 = 320.0;

const CMD_RESET_FLAGS: u8 = 0b1000_0000;
const CMD_MASK_TIMER2: u8 = 0b0100_0000;
const CMD_MASK_TIMER1: u8 = 0b0010_0000;
const CMD_START_TIMER2: u8 = 0b0000_0010;
const CMD_START_TIMER1: u8 = 0b0000_0001;

#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    /// 8-bit reload value; tick period is `(256 - value) * base_period`.
    value: u8,
    base_period_us: f64,
    running: bool,
    masked: bool,
    raise_irq: bool,
    reached: bool,
    /// Microseconds remaining until the next expiry, re-armed on expiry
    /// while `running` stays set (§4.8 "if still running, reschedule").
    remaining_us: f64,
}

impl Timer {
    fn new(base_period_us: f64) -> Self {
        Self {
            value: 0xFF,
            base_period_us,
            running: false,
            masked: false,
            raise_irq: false,
            reached: false,
            remaining_us: 0.0,
        }
    }

    fn period_us(&self) -> f64 {
        (256 - self.value as u32) as f64 * self.base_period_us
    }

    pub fn write_count(&mut self, value: u8) {
        self.value = value;
    }

    pub fn count(&self) -> u8 {
        self.value
    }

    fn start(&mut self) {
        self.running = true;
        self.remaining_us = self.period_us();
    }

    fn stop(&mut self) {
        self.running = false;
    }

    pub fn reached(&self) -> bool {
        self.reached
    }

    /// Advance by `elapsed_us` microseconds. Returns `true` if this timer
    /// newly expired and should request the PIC (i.e. `raise_irq` is set
    /// and it was not already `reached`).
    fn advance(&mut self, elapsed_us: f64) -> bool {
        if !self.running {
            return false;
        }
        self.remaining_us -= elapsed_us;
        let mut newly_raised = false;
        while self.remaining_us <= 0.0 {
            let was_reached = self.reached;
            if !self.masked {
                self.reached = true;
            }
            if self.raise_irq && !was_reached && self.reached {
                newly_raised = true;
            }
            if self.running {
                self.remaining_us += self.period_us();
            } else {
                break;
            }
        }
        newly_raised
    }
}

/// Both card timers plus the Adlib-style command register decode (§6 ports
/// `0x208`/`0x209`/`0x20A`).
#[derive(Debug, Clone)]
pub struct TimerBank {
    pub timer0: Timer,
    pub timer1: Timer,
}

impl TimerBank {
    pub fn new() -> Self {
        Self {
            timer0: Timer::new(BASE_PERIOD_0_US),
            timer1: Timer::new(BASE_PERIOD_1_US),
        }
    }

    pub fn reset(&mut self) {
        self.timer0 = Timer::new(BASE_PERIOD_0_US);
        self.timer1 = Timer::new(BASE_PERIOD_1_US);
    }

    /// Decode a write to the Adlib-compatible command register (§4.8):
    /// the reset-flags bit clears both `reached` flags; mask bits gate
    /// `reached`; start/stop bits gate `running`.
    pub fn write_command(&mut self, value: u8) {
        if value & CMD_RESET_FLAGS != 0 {
            self.timer0.reached = false;
            self.timer1.reached = false;
            return;
        }
        self.timer0.masked = value & CMD_MASK_TIMER1 != 0;
        self.timer1.masked = value & CMD_MASK_TIMER2 != 0;
        if value & CMD_START_TIMER1 != 0 {
            self.timer0.start();
        } else {
            self.timer0.stop();
        }
        if value & CMD_START_TIMER2 != 0 {
            self.timer1.start();
        } else {
            self.timer1.stop();
        }
    }

    pub fn write_raise_irq_mask(&mut self, timer0_raises: bool, timer1_raises: bool) {
        self.timer0.raise_irq = timer0_raises;
        self.timer1.raise_irq = timer1_raises;
    }

    /// Classic Adlib status byte: bit 7 set if either timer is reached and
    /// unmasked, bit 6 timer 1 reached, bit 5 timer 0 reached.
    pub fn status_byte(&self) -> u8 {
        let mut status = 0u8;
        if self.timer0.reached {
            status |= 0b0010_0000;
        }
        if self.timer1.reached {
            status |= 0b0100_0000;
        }
        if status != 0 {
            status |= 0b1000_0000;
        }
        status
    }

    /// Tick both timers by `elapsed_us`. Returns `(timer0_raised, timer1_raised)`.
    pub fn advance(&mut self, elapsed_us: f64) -> (bool, bool) {
        (self.timer0.advance(elapsed_us), self.timer1.advance(elapsed_us))
    }
}

impl Default for TimerBank {
    fn default() -> Self {
        Self::new()
    }
}
