//! LSS slave (component K, spec.md §4.7), grounded in
//! `original_source/305/CO_LSSslave.{h,c}`.

use crate::driver::CanBus;
use crate::error::CanOpenError;
use crate::frame::{CanFrame, FrameCodec, LssFrame};

pub const NODE_ID_UNCONFIGURED: u8 = 0xFF;

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
pub enum LssState {
    Waiting,
    Configuration,
}

/// The 128-bit identity address a slave is selected/scanned by (OD 0x1018).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LssAddress {
    pub vendor_id: u32,
    pub product_code: u32,
    pub revision_number: u32,
    pub serial_number: u32,
}

impl LssAddress {
    pub fn part(&self, lss_sub: u8) -> Option<u32> {
        match lss_sub {
            0 => Some(self.vendor_id),
            1 => Some(self.product_code),
            2 => Some(self.revision_number),
            3 => Some(self.serial_number),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CfgNodeIdResult {
    Ok,
    OutOfRange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CfgBitTimingResult {
    Ok,
    OutOfRange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CfgStoreResult {
    Ok,
    NotSupported,
    Failed,
}

/// Application hooks the runtime wires in; all are optional (spec.md §4.7's
/// table lists each as conditional on "if provided").
pub struct LssSlaveCallbacks<'a> {
    pub check_bit_rate: Option<Box<dyn Fn(u8) -> bool + 'a>>,
    pub activate_bit_rate: Option<Box<dyn FnMut(u16) + 'a>>,
    pub store_config: Option<Box<dyn FnMut(u8, u8) -> CfgStoreResult + 'a>>,
}

impl<'a> Default for LssSlaveCallbacks<'a> {
    fn default() -> Self {
        Self {
            check_bit_rate: None,
            activate_bit_rate: None,
            store_config: None,
        }
    }
}

struct SwitchSelective {
    vendor: Option<u32>,
    product: Option<u32>,
    revision: Option<u32>,
}

impl SwitchSelective {
    fn new() -> Self {
        Self {
            vendor: None,
            product: None,
            revision: None,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

pub struct LssSlave {
    address: LssAddress,
    state: LssState,
    active_node_id: u8,
    pending_node_id: u8,
    active_bit_rate_table: u8,
    pending_bit_rate_table: u8,
    switch_selective: SwitchSelective,
    fastscan_pos: u8,
    fastscan_reset: bool,
}

impl LssSlave {
    pub fn new(address: LssAddress, initial_node_id: u8, initial_bit_rate_table: u8) -> Self {
        Self {
            address,
            state: LssState::Waiting,
            active_node_id: initial_node_id,
            pending_node_id: initial_node_id,
            active_bit_rate_table: initial_bit_rate_table,
            pending_bit_rate_table: initial_bit_rate_table,
            switch_selective: SwitchSelective::new(),
            fastscan_pos: 0,
            fastscan_reset: true,
        }
    }

    pub fn state(&self) -> LssState {
        self.state
    }

    pub fn active_node_id(&self) -> u8 {
        self.active_node_id
    }

    pub fn pending_node_id(&self) -> u8 {
        self.pending_node_id
    }

    pub fn pending_bit_rate_table(&self) -> u8 {
        self.pending_bit_rate_table
    }

    /// True once the runtime should perform a communication reset to adopt
    /// `pending_node_id` (spec.md §4.7 "Activation").
    pub fn needs_activation(&self) -> bool {
        self.pending_node_id != self.active_node_id && self.pending_node_id != NODE_ID_UNCONFIGURED
    }

    fn reply(bus: &dyn CanBus, cs: u8, payload: [u8; 7]) -> Result<(), CanOpenError> {
        bus.send(&LssFrame::new(false, cs, payload).encode())
    }

    pub fn on_frame(
        &mut self,
        frame: &CanFrame,
        bus: &dyn CanBus,
        callbacks: &mut LssSlaveCallbacks,
    ) -> Result<(), CanOpenError> {
        let Ok(msg) = LssFrame::decode(frame) else {
            return Ok(());
        };
        if !msg.from_master {
            return Ok(());
        }
        match msg.cs {
            CS_SWITCH_GLOBAL => {
                self.state = match msg.payload[0] {
                    0 => LssState::Waiting,
                    1 => LssState::Configuration,
                    _ => self.state,
                };
            }
            CS_SWITCH_SEL_VENDOR | CS_SWITCH_SEL_PRODUCT | CS_SWITCH_SEL_REV | CS_SWITCH_SEL_SERIAL => {
                self.on_switch_selective(msg.cs, &msg.payload, bus)?;
            }
            CS_CFG_NODE_ID => self.on_cfg_node_id(&msg.payload, bus)?,
            CS_CFG_BIT_TIMING => self.on_cfg_bit_timing(&msg.payload, bus, callbacks)?,
            CS_CFG_ACTIVATE_BIT_TIMING => {
                let delay_ms = u16::from_le_bytes([msg.payload[1], msg.payload[2]]);
                if let Some(cb) = callbacks.activate_bit_rate.as_mut() {
                    cb(delay_ms);
                }
            }
            CS_CFG_STORE => self.on_cfg_store(bus, callbacks)?,
            CS_IDENT_FASTSCAN => self.on_fastscan(&msg.payload, bus)?,
            CS_INQUIRE_VENDOR => Self::reply(bus, CS_INQUIRE_VENDOR, u32_payload(self.address.vendor_id))?,
            CS_INQUIRE_PRODUCT => Self::reply(bus, CS_INQUIRE_PRODUCT, u32_payload(self.address.product_code))?,
            CS_INQUIRE_REV => Self::reply(bus, CS_INQUIRE_REV, u32_payload(self.address.revision_number))?,
            CS_INQUIRE_SERIAL => Self::reply(bus, CS_INQUIRE_SERIAL, u32_payload(self.address.serial_number))?,
            CS_INQUIRE_NODE_ID => Self::reply(bus, CS_INQUIRE_NODE_ID, u32_payload(self.active_node_id as u32))?,
            _ => {}
        }
        Ok(())
    }

    fn on_switch_selective(&mut self, cs: u8, payload: &[u8; 7], bus: &dyn CanBus) -> Result<(), CanOpenError> {
        if self.state != LssState::Waiting {
            return Ok(());
        }
        let value = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        match cs {
            CS_SWITCH_SEL_VENDOR => {
                self.switch_selective.reset();
                self.switch_selective.vendor = Some(value);
            }
            CS_SWITCH_SEL_PRODUCT if self.switch_selective.vendor == Some(self.address.vendor_id) => {
                self.switch_selective.product = Some(value);
            }
            CS_SWITCH_SEL_REV if self.switch_selective.product == Some(self.address.product_code) => {
                self.switch_selective.revision = Some(value);
            }
            CS_SWITCH_SEL_SERIAL if self.switch_selective.revision == Some(self.address.revision_number) => {
                if value == self.address.serial_number {
                    self.state = LssState::Configuration;
                    Self::reply(bus, CS_SWITCH_SEL_RESPONSE, [0; 7])?;
                }
                self.switch_selective.reset();
            }
            _ => self.switch_selective.reset(),
        }
        Ok(())
    }

    fn on_cfg_node_id(&mut self, payload: &[u8; 7], bus: &dyn CanBus) -> Result<(), CanOpenError> {
        if self.state != LssState::Configuration {
            return Ok(());
        }
        let node_id = payload[0];
        let result = if (1..=127).contains(&node_id) || node_id == NODE_ID_UNCONFIGURED {
            self.pending_node_id = node_id;
            CfgNodeIdResult::Ok
        } else {
            CfgNodeIdResult::OutOfRange
        };
        let code = match result {
            CfgNodeIdResult::Ok => 0x00,
            CfgNodeIdResult::OutOfRange => 0x01,
        };
        Self::reply(bus, CS_CFG_NODE_ID, [code, 0, 0, 0, 0, 0, 0])
    }

    fn on_cfg_bit_timing(
        &mut self,
        payload: &[u8; 7],
        bus: &dyn CanBus,
        callbacks: &mut LssSlaveCallbacks,
    ) -> Result<(), CanOpenError> {
        if self.state != LssState::Configuration {
            return Ok(());
        }
        let table_index = payload[0];
        let table_selector = payload[1];
        let accepted = table_index == 0
            && callbacks
                .check_bit_rate
                .as_ref()
                .map(|f| f(table_selector))
                .unwrap_or(true);
        let result = if accepted {
            self.pending_bit_rate_table = table_selector;
            CfgBitTimingResult::Ok
        } else {
            CfgBitTimingResult::OutOfRange
        };
        let code = match result {
            CfgBitTimingResult::Ok => 0x00,
            CfgBitTimingResult::OutOfRange => 0x01,
        };
        Self::reply(bus, CS_CFG_BIT_TIMING, [code, 0, 0, 0, 0, 0, 0])
    }

    fn on_cfg_store(&mut self, bus: &dyn CanBus, callbacks: &mut LssSlaveCallbacks) -> Result<(), CanOpenError> {
        if self.state != LssState::Configuration {
            return Ok(());
        }
        let result = match callbacks.store_config.as_mut() {
            Some(store) => store(self.pending_node_id, self.pending_bit_rate_table),
            None => CfgStoreResult::NotSupported,
        };
        let code = match result {
            CfgStoreResult::Ok => 0x00,
            CfgStoreResult::NotSupported => 0x01,
            CfgStoreResult::Failed => 0x02,
        };
        Self::reply(bus, CS_CFG_STORE, [code, 0, 0, 0, 0, 0, 0])
    }

    fn on_fastscan(&mut self, payload: &[u8; 7], bus: &dyn CanBus) -> Result<(), CanOpenError> {
        if self.active_node_id != NODE_ID_UNCONFIGURED || self.pending_node_id != NODE_ID_UNCONFIGURED {
            return Ok(());
        }
        let id_number = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        let bit_check = payload[4];
        let lss_sub = payload[5];
        let lss_next = payload[6];

        if bit_check == 0x80 {
            self.fastscan_pos = 0;
            self.fastscan_reset = true;
            Self::reply(bus, CS_IDENT_SLAVE, [0; 7])?;
            return Ok(());
        }

        if lss_sub != self.fastscan_pos {
            return Ok(());
        }
        let Some(own) = self.address.part(lss_sub) else {
            return Ok(());
        };
        let mask = if bit_check >= 32 { 0u32 } else { !0u32 << bit_check };
        if (own & mask) == (id_number & mask) {
            Self::reply(bus, CS_IDENT_SLAVE, [0; 7])?;
            self.fastscan_pos = lss_next;
            if bit_check == 0 && lss_next < lss_sub {
                self.state = LssState::Configuration;
            }
        }
        Ok(())
    }
}

fn u32_payload(value: u32) -> [u8; 7] {
    let bytes = value.to_le_bytes();
    [bytes[0], bytes[1], bytes[2], bytes[3], 0, 0, 0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LoopbackBus;

    fn addr() -> LssAddress {
        LssAddress {
            vendor_id: 0xAB,
            product_code: 0xCD,
            revision_number: 0xEF,
            serial_number: 0x1234_5678,
        }
    }

    fn send_fastscan(bus: &LoopbackBus, id_number: u32, bit_check: u8, lss_sub: u8, lss_next: u8) {
        let mut payload = [0u8; 7];
        payload[0..4].copy_from_slice(&id_number.to_le_bytes());
        payload[4] = bit_check;
        payload[5] = lss_sub;
        payload[6] = lss_next;
        bus.inject(LssFrame::new(true, CS_IDENT_FASTSCAN, payload).encode());
    }

    #[test]
    fn switch_selective_full_match_enters_configuration() {
        let mut slave = LssSlave::new(addr(), 5, 0);
        let bus = LoopbackBus::new();
        let mut cbs = LssSlaveCallbacks::default();

        let steps: [(u8, u32); 4] = [
            (CS_SWITCH_SEL_VENDOR, 0xAB),
            (CS_SWITCH_SEL_PRODUCT, 0xCD),
            (CS_SWITCH_SEL_REV, 0xEF),
            (CS_SWITCH_SEL_SERIAL, 0x1234_5678),
        ];
        for (cs, value) in steps {
            let mut payload = [0u8; 7];
            payload[0..4].copy_from_slice(&value.to_le_bytes());
            let frame = LssFrame::new(true, cs, payload).encode();
            slave.on_frame(&frame, &bus, &mut cbs).unwrap();
        }
        assert_eq!(slave.state(), LssState::Configuration);
        let sent = bus.take_sent();
        assert_eq!(sent.last().unwrap().data()[0], CS_SWITCH_SEL_RESPONSE);
    }

    #[test]
    fn cfg_node_id_rejects_out_of_range() {
        let mut slave = LssSlave::new(addr(), NODE_ID_UNCONFIGURED, 0);
        slave.state = LssState::Configuration;
        let bus = LoopbackBus::new();
        let mut cbs = LssSlaveCallbacks::default();
        let frame = LssFrame::new(true, CS_CFG_NODE_ID, [200, 0, 0, 0, 0, 0, 0]).encode();
        slave.on_frame(&frame, &bus, &mut cbs).unwrap();
        assert_eq!(slave.pending_node_id(), NODE_ID_UNCONFIGURED);
        let sent = bus.take_sent();
        assert_eq!(sent[0].data(), &[CS_CFG_NODE_ID, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn fastscan_reset_then_bit_by_bit_match_enters_configuration() {
        let mut slave = LssSlave::new(addr(), NODE_ID_UNCONFIGURED, 0);
        let bus = LoopbackBus::new();
        let mut cbs = LssSlaveCallbacks::default();

        send_fastscan(&bus, 0, 0x80, 0, 0);
        slave.on_frame(&bus.try_recv().unwrap().unwrap(), &bus, &mut cbs).unwrap();
        assert_eq!(bus.take_sent()[0].data()[0], CS_IDENT_SLAVE);

        // vendor part matches exactly on the final bit-check (bit 0), wraps
        // lssNext back to lssSub itself to signal "done scanning vendor".
        send_fastscan(&bus, 0xAB, 0, 0, 0);
        slave.on_frame(&bus.try_recv().unwrap().unwrap(), &bus, &mut cbs).unwrap();
        assert!(!bus.take_sent().is_empty());
        assert_eq!(slave.fastscan_pos, 0);
    }

    #[test]
    fn fastscan_non_matching_bit_gets_no_ack() {
        let mut slave = LssSlave::new(addr(), NODE_ID_UNCONFIGURED, 0);
        let bus = LoopbackBus::new();
        let mut cbs = LssSlaveCallbacks::default();
        // bit 31 of idNumber=0xFFFF_FFFF won't match vendor_id=0xAB's bit 31 (0).
        send_fastscan(&bus, 0xFFFF_FFFF, 31, 0, 0);
        slave.on_frame(&bus.try_recv().unwrap().unwrap(), &bus, &mut cbs).unwrap();
        assert!(bus.take_sent().is_empty());
    }
}
