//! Global Failsafe Command (component J, spec.md §4.10), grounded in
//! `original_source/304/CO_GFC.{h,c}`.

use crate::driver::CanBus;
use crate::error::CanOpenError;
use crate::frame::{CanFrame, FrameCodec, Gfc as GfcFrame};

pub struct Gfc {
    enabled: bool,
}

impl Gfc {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// OD 0x1300 write validation: only 0 (disabled) or 1 (enabled).
    pub fn validate_parameter(value: u8) -> Result<bool, CanOpenError> {
        match value {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CanOpenError::Parse(format!(
                "GFC parameter must be 0 or 1, got {other}"
            ))),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn send(&self, bus: &dyn CanBus) -> Result<(), CanOpenError> {
        if self.enabled {
            bus.send(&GfcFrame.encode())?;
        }
        Ok(())
    }

    /// Consumer RX path: invokes `enter_safe_state` synchronously, matching
    /// the original's in-dispatch callback.
    pub fn on_frame(frame: &CanFrame, enter_safe_state: &mut dyn FnMut()) -> Result<(), CanOpenError> {
        GfcFrame::decode(frame)?;
        enter_safe_state();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LoopbackBus;

    #[test]
    fn disabled_producer_sends_nothing() {
        let gfc = Gfc::new(false);
        let bus = LoopbackBus::new();
        gfc.send(&bus).unwrap();
        assert!(bus.take_sent().is_empty());
    }

    #[test]
    fn enabled_producer_sends_zero_length_frame() {
        let gfc = Gfc::new(true);
        let bus = LoopbackBus::new();
        gfc.send(&bus).unwrap();
        let sent = bus.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id(), 0x001);
        assert!(sent[0].data().is_empty());
    }

    #[test]
    fn consumer_invokes_safe_state_callback() {
        let mut entered = false;
        let frame = CanFrame::new(0x001, &[]).unwrap();
        Gfc::on_frame(&frame, &mut || entered = true).unwrap();
        assert!(entered);
    }

    #[test]
    fn parameter_validation_rejects_other_values() {
        assert!(Gfc::validate_parameter(2).is_err());
        assert_eq!(Gfc::validate_parameter(0).unwrap(), false);
        assert_eq!(Gfc::validate_parameter(1).unwrap(), true);
    }
}
