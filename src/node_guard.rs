//! Node Guarding slave and master (component I, spec.md §4.9), grounded in
//! `original_source/301/CO_Node_Guarding.{h,c}`.

use crate::driver::CanBus;
use crate::emcy::{Emcy, ErrorBit};
use crate::enums::EmergencyErrorCode;
use crate::error::CanOpenError;
use crate::frame::{CanFrame, FrameCodec, Guard, NmtState, COB_ID_GUARD_BASE};

/// Slave side: answers RTR with a toggled `{nmtState | toggleBit}` frame and
/// supervises its own life-guarding timer.
pub struct NodeGuardSlave {
    node_id: u8,
    toggle: bool,
    life_time_us: u32,
    life_timer_us: u32,
    enabled: bool,
}

impl NodeGuardSlave {
    /// `life_time_us = guardTime(ms) * lifeTimeFactor * 1000`; `0` disables
    /// life-guarding supervision (still answers RTR if `enabled`).
    pub fn new(node_id: u8, life_time_us: u32) -> Self {
        Self {
            node_id,
            toggle: false,
            life_time_us,
            life_timer_us: 0,
            enabled: life_time_us > 0,
        }
    }

    /// RTR RX callback.
    pub fn on_rtr(&mut self, frame: &CanFrame, bus: &dyn CanBus, state: NmtState) -> Result<(), CanOpenError> {
        if !frame.is_rtr() || frame.id() != COB_ID_GUARD_BASE + self.node_id as u16 {
            return Ok(());
        }
        let reply = Guard::new(self.node_id, self.toggle, state);
        self.toggle = !self.toggle;
        self.life_timer_us = 0;
        bus.send(&reply.encode())
    }

    pub fn process(&mut self, emcy: &Emcy, dt_us: u32) {
        if !self.enabled {
            return;
        }
        self.life_timer_us = self.life_timer_us.saturating_add(dt_us);
        if self.life_timer_us >= self.life_time_us {
            emcy.error_enum(true, ErrorBit::HeartbeatConsumer, EmergencyErrorCode::Communication, 0);
        }
    }
}

struct GuardedNode {
    node_id: u8,
    expect_toggle: bool,
    timer_us: u32,
    monitoring_active: bool,
}

/// Master side: polls each monitored node with an RTR every `guard_time_us`
/// and checks the toggle bit alternates.
pub struct NodeGuardMaster {
    guard_time_us: u32,
    nodes: Vec<GuardedNode>,
}

impl NodeGuardMaster {
    pub fn new(guard_time_us: u32, node_ids: &[u8]) -> Self {
        Self {
            guard_time_us,
            nodes: node_ids
                .iter()
                .map(|&node_id| GuardedNode {
                    node_id,
                    expect_toggle: false,
                    timer_us: 0,
                    monitoring_active: true,
                })
                .collect(),
        }
    }

    /// Call with the response frame as soon as it is received (before the
    /// next `process` tick that would otherwise treat it as a timeout).
    pub fn on_response(&mut self, frame: &CanFrame, emcy: &Emcy) {
        let Ok(guard) = Guard::decode(frame) else {
            return;
        };
        let Some(node) = self.nodes.iter_mut().find(|n| n.node_id == guard.node_id) else {
            return;
        };
        if guard.toggle != node.expect_toggle {
            emcy.error_enum(true, ErrorBit::HeartbeatConsumer, EmergencyErrorCode::Communication, node.node_id as u32);
            node.monitoring_active = false;
            return;
        }
        node.expect_toggle = !node.expect_toggle;
        node.timer_us = 0;
        node.monitoring_active = true;
    }

    pub fn monitoring_active(&self, node_id: u8) -> Option<bool> {
        self.nodes.iter().find(|n| n.node_id == node_id).map(|n| n.monitoring_active)
    }

    pub fn process(&mut self, bus: &dyn CanBus, emcy: &Emcy, dt_us: u32) -> Result<(), CanOpenError> {
        for node in self.nodes.iter_mut() {
            node.timer_us = node.timer_us.saturating_add(dt_us);
            if node.timer_us >= self.guard_time_us {
                if node.timer_us > self.guard_time_us && node.monitoring_active {
                    // Previous RTR's response never arrived.
                    emcy.error_enum(true, ErrorBit::HeartbeatConsumer, EmergencyErrorCode::Communication, node.node_id as u32);
                    node.monitoring_active = false;
                }
                node.timer_us = 0;
                bus.send(&CanFrame::new_rtr(COB_ID_GUARD_BASE + node.node_id as u16, 1)?)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LoopbackBus;

    #[test]
    fn slave_replies_with_alternating_toggle() {
        let mut slave = NodeGuardSlave::new(0x10, 0);
        let bus = LoopbackBus::new();
        let rtr = CanFrame::new_rtr(0x710, 1).unwrap();
        slave.on_rtr(&rtr, &bus, NmtState::Operational).unwrap();
        slave.on_rtr(&rtr, &bus, NmtState::Operational).unwrap();
        let sent = bus.take_sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].data(), &[0x05]);
        assert_eq!(sent[1].data(), &[0x85]);
    }

    #[test]
    fn slave_raises_emergency_on_lifetime_expiry() {
        let mut slave = NodeGuardSlave::new(0x10, 1000);
        let emcy = Emcy::new(0x10, 8, true);
        slave.process(&emcy, 999);
        assert!(!emcy.is_error(ErrorBit::HeartbeatConsumer));
        slave.process(&emcy, 2);
        assert!(emcy.is_error(ErrorBit::HeartbeatConsumer));
    }

    #[test]
    fn master_detects_missing_response() {
        let mut master = NodeGuardMaster::new(1000, &[0x10]);
        let bus = LoopbackBus::new();
        let emcy = Emcy::new(0x01, 8, true);
        master.process(&bus, &emcy, 1000).unwrap();
        master.process(&bus, &emcy, 1000).unwrap();
        assert_eq!(master.monitoring_active(0x10), Some(false));
        assert!(emcy.is_error(ErrorBit::HeartbeatConsumer));
    }

    #[test]
    fn master_accepts_correctly_toggled_response() {
        let mut master = NodeGuardMaster::new(1000, &[0x10]);
        let emcy = Emcy::new(0x01, 8, true);
        let reply = Guard::new(0x10, false, NmtState::Operational).encode();
        master.on_response(&reply, &emcy);
        assert_eq!(master.monitoring_active(0x10), Some(true));
        assert!(!emcy.is_error(ErrorBit::HeartbeatConsumer));
    }
}
