//! Heartbeat consumer (component E), grounded in
//! `original_source/301/CO_HBconsumer.{h,c}`.

use crate::emcy::{Emcy, ErrorBit};
use crate::enums::EmergencyErrorCode;
use crate::frame::{FrameCodec, Guard, NmtState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HbState {
    Unconfigured,
    Unknown,
    Active,
    Timeout,
}

struct Monitor {
    node_id: u8,
    time_us: u32,
    nmt_state: Option<NmtState>,
    hb_state: HbState,
    timeout_timer_us: u32,
    /// Set by the RX path, drained by `process`.
    pending: Option<NmtState>,
}

impl Monitor {
    fn unconfigured() -> Self {
        Self {
            node_id: 0,
            time_us: 0,
            nmt_state: None,
            hb_state: HbState::Unconfigured,
            timeout_timer_us: 0,
            pending: None,
        }
    }
}

/// Per-node heartbeat supervision table, bounded by OD 0x1016 sub 0.
pub struct HbConsumer {
    monitors: Vec<Monitor>,
    was_all_active: bool,
}

impl HbConsumer {
    /// `entries` is `(nodeId, time_ms)` read from OD 0x1016 sub-indices
    /// 1..=count; entries with `nodeId == 0 || time == 0` are UNCONFIGURED.
    pub fn new(entries: &[(u8, u32)]) -> Self {
        let monitors = entries
            .iter()
            .map(|&(node_id, time_ms)| {
                if node_id == 0 || time_ms == 0 {
                    Monitor::unconfigured()
                } else {
                    Monitor {
                        node_id,
                        time_us: time_ms * 1000,
                        nmt_state: None,
                        hb_state: HbState::Unknown,
                        timeout_timer_us: 0,
                        pending: None,
                    }
                }
            })
            .collect();
        Self {
            monitors,
            was_all_active: false,
        }
    }

    /// RX callback: call for every received Guard/Heartbeat frame while the
    /// runtime is PRE/OPERATIONAL. DLC must already have been checked to be 1
    /// by the caller (spec.md §4.4).
    pub fn on_heartbeat(&mut self, frame_node_id: u8, state: NmtState) {
        if let Some(m) = self
            .monitors
            .iter_mut()
            .find(|m| m.hb_state != HbState::Unconfigured && m.node_id == frame_node_id)
        {
            m.pending = Some(state);
        }
    }

    /// Convenience wrapper decoding a raw Guard-shaped Heartbeat frame.
    pub fn on_heartbeat_frame(&mut self, frame: &crate::frame::CanFrame) {
        if frame.data().len() != 1 {
            return;
        }
        if let Ok(guard) = Guard::decode(frame) {
            self.on_heartbeat(guard.node_id, guard.state);
        }
    }

    pub fn all_monitored_active(&self) -> bool {
        self.monitors
            .iter()
            .all(|m| matches!(m.hb_state, HbState::Unconfigured | HbState::Active))
    }

    pub fn all_monitored_operational(&self) -> bool {
        self.monitors
            .iter()
            .all(|m| m.hb_state == HbState::Unconfigured || m.nmt_state == Some(NmtState::Operational))
    }

    pub fn node_state(&self, node_id: u8) -> Option<NmtState> {
        self.monitors
            .iter()
            .find(|m| m.hb_state != HbState::Unconfigured && m.node_id == node_id)
            .and_then(|m| m.nmt_state)
    }

    /// Mainline step: advances timeout timers, applies pending frames,
    /// raises/clears the shared emergency bits.
    pub fn process(&mut self, emcy: &Emcy, dt_us: u32, nmt_changed: &mut dyn FnMut(u8, NmtState)) {
        for m in self.monitors.iter_mut() {
            if m.hb_state == HbState::Unconfigured {
                continue;
            }

            if let Some(state) = m.pending.take() {
                if state == NmtState::Initializing {
                    if m.hb_state == HbState::Active {
                        emcy.error_enum(
                            true,
                            ErrorBit::HbConsumerRemoteReset,
                            EmergencyErrorCode::Communication,
                            m.node_id as u32,
                        );
                    }
                    m.hb_state = HbState::Unknown;
                    m.nmt_state = None;
                } else {
                    m.hb_state = HbState::Active;
                    m.timeout_timer_us = 0;
                    if m.nmt_state != Some(state) {
                        m.nmt_state = Some(state);
                        nmt_changed(m.node_id, state);
                    }
                }
            }

            if m.hb_state == HbState::Active {
                m.timeout_timer_us = m.timeout_timer_us.saturating_add(dt_us);
                if m.timeout_timer_us >= m.time_us {
                    m.hb_state = HbState::Timeout;
                    m.nmt_state = Some(NmtState::Initializing);
                    emcy.error_enum(
                        true,
                        ErrorBit::HeartbeatConsumer,
                        EmergencyErrorCode::Communication,
                        m.node_id as u32,
                    );
                }
            }
        }

        let now_all_active = self.all_monitored_active();
        if now_all_active && !self.was_all_active {
            emcy.error_enum(false, ErrorBit::HeartbeatConsumer, EmergencyErrorCode::ErrorResetOrNoError, 0);
            emcy.error_enum(false, ErrorBit::HbConsumerRemoteReset, EmergencyErrorCode::ErrorResetOrNoError, 0);
        }
        self.was_all_active = now_all_active;
    }

    /// Called when the node leaves PRE/OPERATIONAL: clears all monitor
    /// state per spec.md §4.4.
    pub fn reset_all(&mut self) {
        for m in self.monitors.iter_mut() {
            if m.hb_state != HbState::Unconfigured {
                m.hb_state = HbState::Unknown;
                m.nmt_state = None;
                m.timeout_timer_us = 0;
                m.pending = None;
            }
        }
        self.was_all_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emcy::Emcy;

    #[test]
    fn unconfigured_entries_are_skipped() {
        let consumer = HbConsumer::new(&[(0, 1000), (5, 0), (0x20, 1000)]);
        assert!(consumer.all_monitored_active());
    }

    #[test]
    fn active_after_first_heartbeat_then_times_out() {
        let mut consumer = HbConsumer::new(&[(0x20, 1000)]);
        let emcy = Emcy::new(0x01, 8, true);
        let mut changes = Vec::new();
        consumer.on_heartbeat(0x20, NmtState::PreOperational);
        consumer.process(&emcy, 0, &mut |id, st| changes.push((id, st)));
        assert_eq!(consumer.node_state(0x20), Some(NmtState::PreOperational));
        assert!(consumer.all_monitored_active());

        consumer.process(&emcy, 1_000_000, &mut |id, st| changes.push((id, st)));
        assert!(!consumer.all_monitored_active());
        assert!(emcy.is_error(ErrorBit::HeartbeatConsumer));
    }

    #[test]
    fn remote_reset_detected_then_recovers() {
        let mut consumer = HbConsumer::new(&[(0x20, 1000)]);
        let emcy = Emcy::new(0x01, 8, true);
        consumer.on_heartbeat(0x20, NmtState::PreOperational);
        consumer.process(&emcy, 0, &mut |_, _| {});

        consumer.on_heartbeat(0x20, NmtState::Initializing);
        consumer.process(&emcy, 0, &mut |_, _| {});
        assert!(emcy.is_error(ErrorBit::HbConsumerRemoteReset));

        consumer.on_heartbeat(0x20, NmtState::Operational);
        consumer.process(&emcy, 0, &mut |_, _| {});
        assert!(consumer.all_monitored_active());
        assert!(!emcy.is_error(ErrorBit::HbConsumerRemoteReset));
    }
}
