//! LSS master (component L, spec.md §4.8), grounded in
//! `original_source/305/CO_LSSmaster.{h,c}`.

use crate::driver::CanBus;
use crate::error::CanOpenError;
use crate::frame::{CanFrame, FrameCodec, LssFrame};
use crate::lss_slave::LssAddress;

const CS_SWITCH_GLOBAL: u8 = 0x04;
const CS_SWITCH_SEL_VENDOR: u8 = 0x40;
const CS_SWITCH_SEL_PRODUCT: u8 = 0x41;
const CS_SWITCH_SEL_REV: u8 = 0x42;
const CS_SWITCH_SEL_SERIAL: u8 = 0x43;
const CS_SWITCH_SEL_RESPONSE: u8 = 0x44;
const CS_CFG_NODE_ID: u8 = 0x11;
const CS_CFG_BIT_TIMING: u8 = 0x13;
const CS_CFG_ACTIVATE_BIT_TIMING: u8 = 0x15;
const CS_CFG_STORE: u8 = 0x17;
const CS_IDENT_SLAVE: u8 = 0x4F;
const CS_IDENT_FASTSCAN: u8 = 0x51;
const CS_INQUIRE_VENDOR: u8 = 0x5A;
const CS_INQUIRE_PRODUCT: u8 = 0x5B;
const CS_INQUIRE_REV: u8 = 0x5C;
const CS_INQUIRE_SERIAL: u8 = 0x5D;
const CS_INQUIRE_NODE_ID: u8 = 0x5E;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LssMasterStatus {
    Ok,
    Wait,
    Timeout,
    IllegalArgument,
    InvalidState,
    ScanFinished,
    ScanNoAck,
    ScanFailed,
    OkIllegalArgument,
    OkManufacturer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Awaiting {
    SwitchSelect,
    CfgNodeId,
    CfgBitTiming,
    CfgStore,
    InquireVendor,
    InquireProduct,
    InquireRev,
    InquireSerial,
    InquireNodeId,
}

struct PendingRequest {
    awaiting: Awaiting,
    timer_us: u32,
    response: Option<[u8; 7]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FastscanMode {
    Scan,
    Skip,
    Match(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FastscanPhase {
    Scanning { bit_checked: i8 },
    Verifying,
}

struct FastscanState {
    plan: [FastscanMode; 4],
    part: u8,
    phase: FastscanPhase,
    id_number: u32,
    found: [u32; 4],
    timer_us: u32,
    ack_received: bool,
}

fn next_non_skip(plan: &[FastscanMode; 4], from: u8) -> Option<u8> {
    ((from + 1)..4).find(|&i| plan[i as usize] != FastscanMode::Skip)
}

impl FastscanState {
    fn send_for_part(&self, bus: &dyn CanBus, id_number: u32, bit_check: u8, lss_next: u8) -> Result<(), CanOpenError> {
        let mut payload = [0u8; 7];
        payload[0..4].copy_from_slice(&id_number.to_le_bytes());
        payload[4] = bit_check;
        payload[5] = self.part;
        payload[6] = lss_next;
        bus.send(&LssFrame::new(true, CS_IDENT_FASTSCAN, payload).encode())
    }

    fn start_part(&mut self, bus: &dyn CanBus) -> Result<(), CanOpenError> {
        match self.plan[self.part as usize] {
            FastscanMode::Match(value) => {
                self.id_number = value;
                self.phase = FastscanPhase::Verifying;
                self.send_for_part(bus, value, 0, self.part)
            }
            FastscanMode::Scan => {
                self.id_number = 0;
                self.phase = FastscanPhase::Scanning { bit_checked: 31 };
                self.send_for_part(bus, 0, 31, self.part)
            }
            FastscanMode::Skip => unreachable!("start_part never called on a skipped part"),
        }
    }
}

pub struct LssMaster {
    timeout_us: u32,
    selected: bool,
    pending: Option<PendingRequest>,
    fastscan: Option<FastscanState>,
}

impl LssMaster {
    pub fn new(timeout_us: u32) -> Self {
        Self {
            timeout_us,
            selected: false,
            pending: None,
            fastscan: None,
        }
    }

    fn busy(&self) -> bool {
        self.pending.is_some() || self.fastscan.is_some()
    }

    pub fn switch_state_select(&mut self, bus: &dyn CanBus, address: LssAddress) -> Result<LssMasterStatus, CanOpenError> {
        if self.busy() {
            return Ok(LssMasterStatus::InvalidState);
        }
        for (cs, value) in [
            (CS_SWITCH_SEL_VENDOR, address.vendor_id),
            (CS_SWITCH_SEL_PRODUCT, address.product_code),
            (CS_SWITCH_SEL_REV, address.revision_number),
            (CS_SWITCH_SEL_SERIAL, address.serial_number),
        ] {
            let mut payload = [0u8; 7];
            payload[0..4].copy_from_slice(&value.to_le_bytes());
            bus.send(&LssFrame::new(true, cs, payload).encode())?;
        }
        self.pending = Some(PendingRequest {
            awaiting: Awaiting::SwitchSelect,
            timer_us: 0,
            response: None,
        });
        Ok(LssMasterStatus::Wait)
    }

    pub fn switch_state_deselect(&mut self, bus: &dyn CanBus) -> Result<(), CanOpenError> {
        self.selected = false;
        bus.send(&LssFrame::new(true, CS_SWITCH_GLOBAL, [0; 7]).encode())
    }

    pub fn configure_node_id(&mut self, bus: &dyn CanBus, node_id: u8) -> Result<LssMasterStatus, CanOpenError> {
        if self.busy() {
            return Ok(LssMasterStatus::InvalidState);
        }
        bus.send(&LssFrame::new(true, CS_CFG_NODE_ID, [node_id, 0, 0, 0, 0, 0, 0]).encode())?;
        self.arm(Awaiting::CfgNodeId);
        Ok(LssMasterStatus::Wait)
    }

    pub fn configure_bit_timing(&mut self, bus: &dyn CanBus, table_index: u8, table_selector: u8) -> Result<LssMasterStatus, CanOpenError> {
        if self.busy() {
            return Ok(LssMasterStatus::InvalidState);
        }
        bus.send(&LssFrame::new(true, CS_CFG_BIT_TIMING, [table_index, table_selector, 0, 0, 0, 0, 0]).encode())?;
        self.arm(Awaiting::CfgBitTiming);
        Ok(LssMasterStatus::Wait)
    }

    pub fn configure_store(&mut self, bus: &dyn CanBus) -> Result<LssMasterStatus, CanOpenError> {
        if self.busy() {
            return Ok(LssMasterStatus::InvalidState);
        }
        bus.send(&LssFrame::new(true, CS_CFG_STORE, [0; 7]).encode())?;
        self.arm(Awaiting::CfgStore);
        Ok(LssMasterStatus::Wait)
    }

    pub fn activate_bit_timing(&self, bus: &dyn CanBus, delay_ms: u16) -> Result<(), CanOpenError> {
        let bytes = delay_ms.to_le_bytes();
        bus.send(&LssFrame::new(true, CS_CFG_ACTIVATE_BIT_TIMING, [0, bytes[0], bytes[1], 0, 0, 0, 0]).encode())
    }

    fn inquire(&mut self, bus: &dyn CanBus, cs: u8, awaiting: Awaiting) -> Result<LssMasterStatus, CanOpenError> {
        if self.busy() {
            return Ok(LssMasterStatus::InvalidState);
        }
        bus.send(&LssFrame::new(true, cs, [0; 7]).encode())?;
        self.arm(awaiting);
        Ok(LssMasterStatus::Wait)
    }

    pub fn inquire_vendor(&mut self, bus: &dyn CanBus) -> Result<LssMasterStatus, CanOpenError> {
        self.inquire(bus, CS_INQUIRE_VENDOR, Awaiting::InquireVendor)
    }

    pub fn inquire_product(&mut self, bus: &dyn CanBus) -> Result<LssMasterStatus, CanOpenError> {
        self.inquire(bus, CS_INQUIRE_PRODUCT, Awaiting::InquireProduct)
    }

    pub fn inquire_revision(&mut self, bus: &dyn CanBus) -> Result<LssMasterStatus, CanOpenError> {
        self.inquire(bus, CS_INQUIRE_REV, Awaiting::InquireRev)
    }

    pub fn inquire_serial(&mut self, bus: &dyn CanBus) -> Result<LssMasterStatus, CanOpenError> {
        self.inquire(bus, CS_INQUIRE_SERIAL, Awaiting::InquireSerial)
    }

    pub fn inquire_node_id(&mut self, bus: &dyn CanBus) -> Result<LssMasterStatus, CanOpenError> {
        self.inquire(bus, CS_INQUIRE_NODE_ID, Awaiting::InquireNodeId)
    }

    fn arm(&mut self, awaiting: Awaiting) {
        self.pending = Some(PendingRequest {
            awaiting,
            timer_us: 0,
            response: None,
        });
    }

    /// Feeds an incoming frame from the bus to whichever request is pending.
    pub fn on_frame(&mut self, frame: &CanFrame) {
        let Ok(msg) = LssFrame::decode(frame) else {
            return;
        };
        if msg.from_master {
            return;
        }
        if msg.cs == CS_IDENT_SLAVE {
            if let Some(fs) = self.fastscan.as_mut() {
                fs.ack_received = true;
            }
            return;
        }
        if let Some(pending) = self.pending.as_mut() {
            let expected = match pending.awaiting {
                Awaiting::SwitchSelect => CS_SWITCH_SEL_RESPONSE,
                Awaiting::CfgNodeId => CS_CFG_NODE_ID,
                Awaiting::CfgBitTiming => CS_CFG_BIT_TIMING,
                Awaiting::CfgStore => CS_CFG_STORE,
                Awaiting::InquireVendor => CS_INQUIRE_VENDOR,
                Awaiting::InquireProduct => CS_INQUIRE_PRODUCT,
                Awaiting::InquireRev => CS_INQUIRE_REV,
                Awaiting::InquireSerial => CS_INQUIRE_SERIAL,
                Awaiting::InquireNodeId => CS_INQUIRE_NODE_ID,
            };
            if msg.cs == expected {
                pending.response = Some(msg.payload);
            }
        }
    }

    /// Poll any single-request/single-reply operation previously started.
    /// Returns the inquired 32-bit value alongside [`LssMasterStatus::Ok`]
    /// for the `inquire_*` operations.
    pub fn poll(&mut self, dt_us: u32) -> (LssMasterStatus, Option<u32>) {
        let Some(pending) = self.pending.as_mut() else {
            return (LssMasterStatus::InvalidState, None);
        };
        if let Some(payload) = pending.response {
            let awaiting = pending.awaiting;
            self.pending = None;
            return match awaiting {
                Awaiting::SwitchSelect => {
                    self.selected = true;
                    (LssMasterStatus::Ok, None)
                }
                Awaiting::CfgNodeId | Awaiting::CfgBitTiming | Awaiting::CfgStore => {
                    let status = match payload[0] {
                        0x00 => LssMasterStatus::Ok,
                        0xFF => LssMasterStatus::OkManufacturer,
                        _ => LssMasterStatus::OkIllegalArgument,
                    };
                    (status, None)
                }
                Awaiting::InquireVendor
                | Awaiting::InquireProduct
                | Awaiting::InquireRev
                | Awaiting::InquireSerial
                | Awaiting::InquireNodeId => {
                    let value = u32::from_le_bytes(payload[0..4].try_into().unwrap());
                    (LssMasterStatus::Ok, Some(value))
                }
            };
        }
        pending.timer_us = pending.timer_us.saturating_add(dt_us);
        if pending.timer_us >= self.timeout_us {
            self.pending = None;
            return (LssMasterStatus::Timeout, None);
        }
        (LssMasterStatus::Wait, None)
    }

    /// Starts an LSS fastscan identification. Requires no node currently
    /// selected, vendor part not skipped, and at least two non-skipped parts
    /// (spec.md §4.8 "Preconditions").
    pub fn identify_fastscan(&mut self, bus: &dyn CanBus, plan: [FastscanMode; 4]) -> Result<LssMasterStatus, CanOpenError> {
        if self.selected || self.busy() {
            return Ok(LssMasterStatus::InvalidState);
        }
        if plan[0] == FastscanMode::Skip {
            return Ok(LssMasterStatus::IllegalArgument);
        }
        if plan.iter().filter(|m| **m != FastscanMode::Skip).count() < 2 {
            return Ok(LssMasterStatus::IllegalArgument);
        }

        bus.send(&LssFrame::new(true, CS_IDENT_FASTSCAN, [0, 0, 0, 0, 0x80, 0, 0]).encode())?;

        let mut state = FastscanState {
            plan,
            part: 0,
            phase: FastscanPhase::Verifying,
            id_number: 0,
            found: [0; 4],
            timer_us: 0,
            ack_received: false,
        };
        state.start_part(bus)?;
        self.fastscan = Some(state);
        Ok(LssMasterStatus::Wait)
    }

    /// Drives the fastscan state machine; call every mainline tick while
    /// fastscan is in progress.
    pub fn process_fastscan(&mut self, bus: &dyn CanBus, dt_us: u32) -> Result<(LssMasterStatus, [u32; 4]), CanOpenError> {
        let Some(fs) = self.fastscan.as_mut() else {
            return Ok((LssMasterStatus::InvalidState, [0; 4]));
        };

        fs.timer_us = fs.timer_us.saturating_add(dt_us);
        let resolved = fs.ack_received || fs.timer_us >= self.timeout_us;
        if !resolved {
            return Ok((LssMasterStatus::Wait, fs.found));
        }
        let acked = fs.ack_received;
        fs.ack_received = false;
        fs.timer_us = 0;

        match fs.phase {
            FastscanPhase::Scanning { bit_checked } => {
                if !acked {
                    fs.id_number |= 1 << bit_checked;
                }
                if bit_checked == 0 {
                    fs.phase = FastscanPhase::Verifying;
                    let lss_next = next_non_skip(&fs.plan, fs.part).unwrap_or(fs.part);
                    fs.send_for_part(bus, fs.id_number, 0, lss_next)?;
                } else {
                    let next_bit = bit_checked - 1;
                    fs.phase = FastscanPhase::Scanning { bit_checked: next_bit };
                    fs.send_for_part(bus, fs.id_number, next_bit as u8, fs.part)?;
                }
                Ok((LssMasterStatus::Wait, fs.found))
            }
            FastscanPhase::Verifying => {
                if !acked {
                    let found = fs.found;
                    self.fastscan = None;
                    return Ok((LssMasterStatus::ScanFailed, found));
                }
                fs.found[fs.part as usize] = fs.id_number;
                match next_non_skip(&fs.plan, fs.part) {
                    Some(next_part) => {
                        fs.part = next_part;
                        fs.start_part(bus)?;
                        Ok((LssMasterStatus::Wait, fs.found))
                    }
                    None => {
                        let found = fs.found;
                        self.fastscan = None;
                        self.selected = true;
                        Ok((LssMasterStatus::ScanFinished, found))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LoopbackBus;
    use crate::lss_slave::{LssSlave, LssSlaveCallbacks};

    fn relay(from: &LoopbackBus, to: &LoopbackBus) {
        for frame in from.take_sent() {
            to.inject(frame);
        }
    }

    #[test]
    fn fastscan_precondition_rejects_skipped_vendor() {
        let mut master = LssMaster::new(100_000);
        let bus = LoopbackBus::new();
        let plan = [FastscanMode::Skip, FastscanMode::Scan, FastscanMode::Scan, FastscanMode::Scan];
        assert_eq!(master.identify_fastscan(&bus, plan).unwrap(), LssMasterStatus::IllegalArgument);
    }

    #[test]
    fn fastscan_precondition_rejects_fewer_than_two_active_parts() {
        let mut master = LssMaster::new(100_000);
        let bus = LoopbackBus::new();
        let plan = [FastscanMode::Scan, FastscanMode::Skip, FastscanMode::Skip, FastscanMode::Skip];
        assert_eq!(master.identify_fastscan(&bus, plan).unwrap(), LssMasterStatus::IllegalArgument);
    }

    #[test]
    fn fastscan_identifies_known_address_and_slave_enters_configuration() {
        // Concrete scenario 5 (spec.md §8).
        let address = LssAddress {
            vendor_id: 0x0000_00AB,
            product_code: 0x0000_00CD,
            revision_number: 0x0000_00EF,
            serial_number: 0x1234_5678,
        };
        let mut slave = LssSlave::new(address, crate::lss_slave::NODE_ID_UNCONFIGURED, 0);
        let mut master = LssMaster::new(100_000);
        let master_bus = LoopbackBus::new();
        let slave_bus = LoopbackBus::new();
        let mut cbs = LssSlaveCallbacks::default();

        let plan = [FastscanMode::Scan, FastscanMode::Scan, FastscanMode::Scan, FastscanMode::Scan];
        master.identify_fastscan(&master_bus, plan).unwrap();

        let mut rounds = 0;
        loop {
            rounds += 1;
            assert!(rounds < 1000, "fastscan did not converge");

            relay(&master_bus, &slave_bus);
            while let Some(frame) = slave_bus.try_recv().unwrap() {
                slave.on_frame(&frame, &slave_bus, &mut cbs).unwrap();
            }
            relay(&slave_bus, &master_bus);
            while let Some(frame) = master_bus.try_recv().unwrap() {
                master.on_frame(&frame);
            }

            let (status, found) = master.process_fastscan(&master_bus, 0).unwrap();
            match status {
                LssMasterStatus::Wait => continue,
                LssMasterStatus::ScanFinished => {
                    assert_eq!(found, [0xAB, 0xCD, 0xEF, 0x1234_5678]);
                    break;
                }
                other => panic!("fastscan failed: {other:?}"),
            }
        }
        assert_eq!(slave.state(), crate::lss_slave::LssState::Configuration);
    }

    #[test]
    fn configure_node_id_reports_ok() {
        let mut master = LssMaster::new(100_000);
        let bus = LoopbackBus::new();
        master.configure_node_id(&bus, 0x10).unwrap();
        bus.take_sent();
        master.on_frame(&LssFrame::new(false, CS_CFG_NODE_ID, [0, 0, 0, 0, 0, 0, 0]).encode());
        assert_eq!(master.poll(0).0, LssMasterStatus::Ok);
    }

    #[test]
    fn configure_node_id_times_out_without_reply() {
        let mut master = LssMaster::new(1_000);
        let bus = LoopbackBus::new();
        master.configure_node_id(&bus, 0x10).unwrap();
        assert_eq!(master.poll(500).0, LssMasterStatus::Wait);
        assert_eq!(master.poll(600).0, LssMasterStatus::Timeout);
    }
}
