//! TIME stamp producer/consumer (component G), grounded in
//! `original_source/301/CO_TIME.{h,c}`.

use crate::driver::CanBus;
use crate::error::CanOpenError;
use crate::frame::{CanFrame, FrameCodec, TimeOfDay};

pub struct TimeStamp {
    is_producer: bool,
    period_ms: u32,
    timer_us: u32,
    last: Option<TimeOfDay>,
}

impl TimeStamp {
    pub fn new(is_producer: bool, period_ms: u32) -> Self {
        Self {
            is_producer,
            period_ms,
            timer_us: 0,
            last: None,
        }
    }

    /// Consumer RX path.
    pub fn on_frame(&mut self, frame: &CanFrame) -> Result<(), CanOpenError> {
        self.last = Some(TimeOfDay::decode(frame)?);
        Ok(())
    }

    pub fn last(&self) -> Option<TimeOfDay> {
        self.last
    }

    /// Producer mainline step: emits the given time-of-day once `period_ms`
    /// has elapsed. A `period_ms` of 0 means "send every call" (one-shot
    /// producers driven entirely by the application).
    pub fn process(
        &mut self,
        bus: &dyn CanBus,
        dt_us: u32,
        current: TimeOfDay,
    ) -> Result<(), CanOpenError> {
        if !self.is_producer {
            return Ok(());
        }
        self.timer_us = self.timer_us.saturating_add(dt_us);
        if self.period_ms == 0 || self.timer_us >= self.period_ms.saturating_mul(1000) {
            self.timer_us = 0;
            bus.send(&current.encode())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LoopbackBus;

    #[test]
    fn producer_emits_after_period() {
        let mut ts = TimeStamp::new(true, 1000);
        let bus = LoopbackBus::new();
        let stamp = TimeOfDay::new(123, 456);
        ts.process(&bus, 500_000, stamp).unwrap();
        assert!(bus.take_sent().is_empty());
        ts.process(&bus, 500_000, stamp).unwrap();
        let sent = bus.take_sent();
        assert_eq!(sent.len(), 1);
        let back = TimeOfDay::decode(&sent[0]).unwrap();
        assert_eq!(back.days, 456);
        assert_eq!(back.ms_since_midnight(), 123);
    }

    #[test]
    fn consumer_records_last_stamp() {
        let mut ts = TimeStamp::new(false, 0);
        let frame = TimeOfDay::new(42, 1).encode();
        ts.on_frame(&frame).unwrap();
        assert_eq!(ts.last().unwrap().ms_since_midnight(), 42);
    }
}
