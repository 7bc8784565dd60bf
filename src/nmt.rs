//! NMT state machine and Heartbeat producer (component D), grounded in
//! `original_source/301/CO_NMT_Heartbeat.{h,c}`.

use crate::driver::CanBus;
use crate::emcy::{Emcy, ErrorBit};
use crate::enums::EmergencyErrorRegister;
use crate::error::CanOpenError;
use crate::frame::{CanFrame, FrameCodec, Guard, Nmt, NmtCommand, NmtState};
use crate::od::ObjectDictionary;

/// `CO_NMT_reset_cmd_t`: what the application/runtime must do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NmtResetCmd {
    ResetNot,
    ResetComm,
    ResetApp,
    ResetQuit,
}

/// Per-group error-behavior policy byte from OD 0x1029: what state an
/// OPERATIONAL node falls back to when that error group is raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorBehavior {
    StayOperational,
    GoPreOperational,
    GoStopped,
}

impl ErrorBehavior {
    fn from_policy_byte(byte: u8) -> Self {
        match byte {
            0 => Self::GoPreOperational,
            2 => Self::GoStopped,
            _ => Self::StayOperational,
        }
    }
}

pub struct Nmt301 {
    node_id: u8,
    auto_start_operational: bool,
    state: NmtState,
    hb_period_ms: u32,
    hb_timer_us: u32,
    /// Unconditional "send heartbeat this tick" edge, set on state changes
    /// and at bootup.
    send_now: bool,
    booted: bool,
}

impl Nmt301 {
    pub fn new(node_id: u8, auto_start_operational: bool, hb_period_ms: u32) -> Self {
        Self {
            node_id,
            auto_start_operational,
            state: NmtState::Initializing,
            hb_period_ms,
            hb_timer_us: 0,
            send_now: false,
            booted: false,
        }
    }

    pub fn state(&self) -> NmtState {
        self.state
    }

    pub fn set_hb_period_ms(&mut self, period_ms: u32) {
        self.hb_period_ms = period_ms;
        self.hb_timer_us = 0;
    }

    fn transmit(&self, bus: &dyn CanBus) -> Result<(), CanOpenError> {
        let frame = Guard::new(self.node_id, false, self.state).encode();
        bus.send(&frame)
    }

    /// Dispatches a just-received NMT command frame; `od` supplies the
    /// error-register gate for ENTER_OPERATIONAL. Returns the reset command
    /// the top-level runtime must act on, or `ResetNot` for ordinary state
    /// transitions this type already applied.
    pub fn on_nmt_frame(&mut self, frame: &CanFrame, od: &ObjectDictionary) -> NmtResetCmd {
        if frame.data().len() != 2 {
            return NmtResetCmd::ResetNot;
        }
        let Ok(nmt) = Nmt::decode(frame) else {
            return NmtResetCmd::ResetNot;
        };
        if nmt.target_node != 0 && nmt.target_node != self.node_id {
            return NmtResetCmd::ResetNot;
        }
        match nmt.command {
            NmtCommand::EnterOperational => {
                let err_reg = od.read_u8(crate::od::index::ERROR_REGISTER, 0).unwrap_or(0);
                if err_reg == 0 {
                    self.set_state(NmtState::Operational);
                }
                NmtResetCmd::ResetNot
            }
            NmtCommand::EnterStop => {
                self.set_state(NmtState::Stopped);
                NmtResetCmd::ResetNot
            }
            NmtCommand::EnterPreOperational => {
                self.set_state(NmtState::PreOperational);
                NmtResetCmd::ResetNot
            }
            NmtCommand::ResetNode | NmtCommand::ResetCommunication => Self::reset_cmd_for(nmt.command),
        }
    }

    fn set_state(&mut self, new_state: NmtState) {
        if new_state != self.state {
            self.state = new_state;
            self.send_now = true;
            log::info!("NMT state -> {:?}", new_state);
        }
    }

    /// Error-driven demotion (spec.md §4.3): only while OPERATIONAL. Mirrors
    /// `CO_NMT_Heartbeat.c`'s six OD 0x1029 policy bytes (subs 1-6):
    /// sub2 = communication group, sub1 = nested fallback for bus-off/HB
    /// consumer timeout/remote-reset sub-cases, sub3 gates whether a
    /// CAN-passive condition promotes the communication bit at all, sub4 =
    /// generic group, sub5 = device-profile group, sub6 = manufacturer
    /// group. Every block is evaluated in sequence, so a later group's
    /// policy can override an earlier one's, exactly as the original does.
    pub fn on_error_register_changed(&mut self, emcy: &Emcy, od: &ObjectDictionary) {
        if self.state != NmtState::Operational {
            return;
        }
        let mut error_register = emcy.error_register();

        let can_passive = emcy.is_error(ErrorBit::CanTxBusPassive) || emcy.is_error(ErrorBit::CanRxBusPassive);
        if can_passive {
            let gate = Self::read_policy(od, 3);
            if gate == 0 || gate == 2 {
                error_register |= EmergencyErrorRegister::COMMUNICATION;
            }
        }
        if error_register.is_empty() {
            return;
        }

        let mut target = self.state;

        if error_register.contains(EmergencyErrorRegister::COMMUNICATION) {
            match ErrorBehavior::from_policy_byte(Self::read_policy(od, 2)) {
                ErrorBehavior::GoPreOperational => target = NmtState::PreOperational,
                ErrorBehavior::GoStopped => target = NmtState::Stopped,
                ErrorBehavior::StayOperational => {
                    let nested = emcy.is_error(ErrorBit::CanTxBusOff)
                        || emcy.is_error(ErrorBit::HeartbeatConsumer)
                        || emcy.is_error(ErrorBit::HbConsumerRemoteReset);
                    if nested {
                        match ErrorBehavior::from_policy_byte(Self::read_policy(od, 1)) {
                            ErrorBehavior::GoPreOperational => target = NmtState::PreOperational,
                            ErrorBehavior::GoStopped => target = NmtState::Stopped,
                            ErrorBehavior::StayOperational => {}
                        }
                    }
                }
            }
        }

        for (bit, sub) in [
            (EmergencyErrorRegister::GENERIC, 4u8),
            (EmergencyErrorRegister::DEVICE_PROFILE_SPECIFIC, 5u8),
            (EmergencyErrorRegister::MANUFACTURER_SPECIFIC, 6u8),
        ] {
            if !error_register.contains(bit) {
                continue;
            }
            match ErrorBehavior::from_policy_byte(Self::read_policy(od, sub)) {
                ErrorBehavior::GoPreOperational => target = NmtState::PreOperational,
                ErrorBehavior::GoStopped => target = NmtState::Stopped,
                ErrorBehavior::StayOperational => {}
            }
        }

        if target != self.state {
            self.set_state(target);
        }
    }

    /// A missing or unreadable policy byte defaults to `StayOperational`
    /// rather than demoting, so a custom OD table that omits OD 0x1029
    /// subs never unconditionally forces every error into PRE_OPERATIONAL.
    fn read_policy(od: &ObjectDictionary, sub: u8) -> u8 {
        od.read_u8(crate::od::index::ERROR_BEHAVIOR, sub).unwrap_or(1)
    }

    /// Mainline step: bootup transmission, periodic HB, state-change HB.
    /// `dt_us` is elapsed time since the previous call.
    pub fn process(
        &mut self,
        bus: &dyn CanBus,
        dt_us: u32,
    ) -> Result<NmtResetCmd, CanOpenError> {
        if !self.booted {
            self.booted = true;
            self.transmit(bus)?;
            self.state = if self.auto_start_operational {
                NmtState::Operational
            } else {
                NmtState::PreOperational
            };
            log::info!("NMT booted into {:?}", self.state);
            return Ok(NmtResetCmd::ResetNot);
        }

        if self.send_now {
            self.send_now = false;
            self.transmit(bus)?;
        } else if self.hb_period_ms != 0 {
            self.hb_timer_us = self.hb_timer_us.saturating_add(dt_us);
            if self.hb_timer_us >= self.hb_period_ms.saturating_mul(1000) {
                self.hb_timer_us = 0;
                self.transmit(bus)?;
            }
        }
        Ok(NmtResetCmd::ResetNot)
    }

    /// Dispatches a RESET_NODE/RESET_COMMUNICATION command into a runtime
    /// signal; called by the top-level orchestrator after `on_nmt_frame`
    /// observes one of those two commands.
    pub fn reset_cmd_for(command: NmtCommand) -> NmtResetCmd {
        match command {
            NmtCommand::ResetNode => NmtResetCmd::ResetApp,
            NmtCommand::ResetCommunication => NmtResetCmd::ResetComm,
            _ => NmtResetCmd::ResetNot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LoopbackBus;
    use crate::od::table::default_od;

    #[test]
    fn boots_then_autostarts_operational() {
        let mut nmt = Nmt301::new(0x10, true, 500);
        let bus = LoopbackBus::new();
        nmt.process(&bus, 0).unwrap();
        let sent = bus.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id(), 0x710);
        assert_eq!(sent[0].data(), &[0x00]);
        assert_eq!(nmt.state(), NmtState::Operational);
    }

    #[test]
    fn boots_preoperational_without_autostart() {
        let mut nmt = Nmt301::new(0x10, false, 500);
        let bus = LoopbackBus::new();
        nmt.process(&bus, 0).unwrap();
        assert_eq!(nmt.state(), NmtState::PreOperational);
    }

    #[test]
    fn periodic_heartbeat_fires_at_configured_period() {
        let mut nmt = Nmt301::new(0x10, true, 500);
        let bus = LoopbackBus::new();
        nmt.process(&bus, 0).unwrap();
        bus.take_sent();
        for _ in 0..499 {
            nmt.process(&bus, 1000).unwrap();
        }
        assert!(bus.take_sent().is_empty());
        nmt.process(&bus, 1000).unwrap();
        let sent = bus.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data(), &[0x05]);
    }

    #[test]
    fn enter_operational_gated_on_error_register() {
        let od = default_od(0x10);
        od.write_u8(crate::od::index::ERROR_REGISTER, 0, 1).unwrap();
        let mut nmt = Nmt301::new(0x10, false, 0);
        let bus = LoopbackBus::new();
        nmt.process(&bus, 0).unwrap();
        let frame = Nmt {
            command: NmtCommand::EnterOperational,
            target_node: 0x10,
        }
        .encode();
        nmt.on_nmt_frame(&frame, &od);
        assert_eq!(nmt.state(), NmtState::PreOperational);

        od.write_u8(crate::od::index::ERROR_REGISTER, 0, 0).unwrap();
        nmt.on_nmt_frame(&frame, &od);
        assert_eq!(nmt.state(), NmtState::Operational);
    }

    #[test]
    fn wrong_length_nmt_frame_is_ignored() {
        let od = default_od(0x10);
        let mut nmt = Nmt301::new(0x10, true, 0);
        let bus = LoopbackBus::new();
        nmt.process(&bus, 0).unwrap();
        let bad = CanFrame::new(0x000, &[0x02]).unwrap();
        nmt.on_nmt_frame(&bad, &od);
        assert_eq!(nmt.state(), NmtState::Operational);
    }
}
