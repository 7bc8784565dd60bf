//! SYNC producer/consumer (component F), grounded in
//! `original_source/301/CO_SYNC.{h,c}`.

use crate::driver::CanBus;
use crate::emcy::{Emcy, ErrorBit};
use crate::enums::EmergencyErrorCode;
use crate::error::CanOpenError;
use crate::frame::{CanFrame, FrameCodec, Sync as SyncFrame};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    Normal,
    /// The synchronous window (OD 0x1007) has elapsed since the last SYNC;
    /// TPDOs outside the window must be discarded by the caller.
    PassedWindow,
}

pub struct Sync {
    is_producer: bool,
    period_us: u32,
    window_us: u32,
    counter_overflow: u8,
    timer_us: u32,
    /// Toggles on every successfully-received (consumer) or transmitted
    /// (producer) SYNC; RPDO double-buffer selection reads this.
    rx_toggle: bool,
    producer_counter: u8,
    timed_out: bool,
    window_flagged: bool,
    last_counter: Option<u8>,
}

impl Sync {
    pub fn new(is_producer: bool, period_us: u32, window_us: u32, counter_overflow: u8) -> Self {
        Self {
            is_producer,
            period_us,
            window_us,
            counter_overflow,
            timer_us: 0,
            rx_toggle: false,
            producer_counter: 1,
            timed_out: false,
            window_flagged: false,
            last_counter: None,
        }
    }

    pub fn rx_toggle(&self) -> bool {
        self.rx_toggle
    }

    pub fn last_counter(&self) -> Option<u8> {
        self.last_counter
    }

    /// RX callback for the consumer path: verifies DLC against whether a
    /// counter byte is expected, then toggles and records the counter.
    pub fn on_frame(&mut self, frame: &CanFrame) -> Result<(), CanOpenError> {
        let expected_len = if self.counter_overflow == 0 { 0 } else { 1 };
        if frame.data().len() != expected_len {
            return Err(CanOpenError::BadMessage(format!(
                "SYNC DLC {} does not match configured counter mode",
                frame.data().len()
            )));
        }
        let parsed = SyncFrame::decode(frame)?;
        self.last_counter = parsed.counter;
        self.rx_toggle = !self.rx_toggle;
        self.timer_us = 0;
        self.timed_out = false;
        self.window_flagged = false;
        Ok(())
    }

    /// Mainline step. Returns [`SyncStatus::PassedWindow`] on the tick the
    /// window is first exceeded (edge-triggered, once per SYNC period).
    pub fn process(&mut self, bus: &dyn CanBus, emcy: &Emcy, dt_us: u32) -> Result<SyncStatus, CanOpenError> {
        self.timer_us = self.timer_us.saturating_add(dt_us);

        if self.is_producer {
            if self.period_us != 0 && self.timer_us >= self.period_us {
                self.timer_us = 0;
                self.window_flagged = false;
                let counter = if self.counter_overflow > 0 {
                    let c = self.producer_counter;
                    self.producer_counter = if c >= self.counter_overflow { 1 } else { c + 1 };
                    Some(c)
                } else {
                    None
                };
                bus.send(&SyncFrame { counter }.encode())?;
                self.rx_toggle = !self.rx_toggle;
            }
        } else {
            if self.period_us != 0 {
                let timeout = self.period_us + self.period_us / 2;
                if !self.timed_out && self.timer_us > timeout {
                    self.timed_out = true;
                    emcy.error_enum(true, ErrorBit::SyncTimeOut, EmergencyErrorCode::Communication, 0);
                }
            }
        }

        if self.window_us != 0 && !self.window_flagged && self.timer_us > self.window_us {
            self.window_flagged = true;
            return Ok(SyncStatus::PassedWindow);
        }
        Ok(SyncStatus::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LoopbackBus;

    #[test]
    fn consumer_toggles_exactly_once_per_frame() {
        let mut sync = Sync::new(false, 10_000, 0, 0);
        let frame = CanFrame::new(0x080, &[]).unwrap();
        assert!(!sync.rx_toggle());
        sync.on_frame(&frame).unwrap();
        assert!(sync.rx_toggle());
        sync.on_frame(&frame).unwrap();
        assert!(!sync.rx_toggle());
    }

    #[test]
    fn producer_emits_rolling_counter() {
        let mut sync = Sync::new(true, 1000, 0, 3);
        let bus = LoopbackBus::new();
        let emcy = Emcy::new(0x01, 8, true);
        for expected in [1u8, 2, 3, 1] {
            sync.process(&bus, &emcy, 1000).unwrap();
            let sent = bus.take_sent();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].data(), &[expected]);
        }
    }

    #[test]
    fn consumer_timeout_fires_once_at_1_5x_period() {
        let mut sync = Sync::new(false, 1000, 0, 0);
        let bus = LoopbackBus::new();
        let emcy = Emcy::new(0x01, 8, true);
        sync.process(&bus, &emcy, 1500).unwrap();
        assert!(!emcy.is_error(ErrorBit::SyncTimeOut));
        sync.process(&bus, &emcy, 1).unwrap();
        assert!(emcy.is_error(ErrorBit::SyncTimeOut));
    }

    #[test]
    fn window_violation_is_edge_triggered() {
        let mut sync = Sync::new(false, 0, 500, 0);
        let bus = LoopbackBus::new();
        let emcy = Emcy::new(0x01, 8, true);
        assert_eq!(sync.process(&bus, &emcy, 600).unwrap(), SyncStatus::PassedWindow);
        assert_eq!(sync.process(&bus, &emcy, 1).unwrap(), SyncStatus::Normal);
    }
}
