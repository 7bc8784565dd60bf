//! PDO engine: mapping resolution, RPDO reception, TPDO transmission
//! (component H, spec.md §4.6), grounded in `original_source/301/CO_PDO.c`.

use crate::driver::CanBus;
use crate::emcy::{Emcy, ErrorBit};
use crate::enums::EmergencyErrorCode;
use crate::error::CanOpenError;
use crate::frame::CanFrame;
use crate::od::{ObjectDictionary, OdAttributes, Odr};

pub const TRANSMISSION_TYPE_SYNC_ACYCLIC: u8 = 0;
pub const TRANSMISSION_TYPE_SYNC_240: u8 = 240;
pub const TRANSMISSION_TYPE_SYNC_EVENT_LO: u8 = 254;

/// One resolved mapping entry: either a real OD sub-entry, or a fixed-size
/// dummy filler (CiA301 §7.4.7).
#[derive(Clone, Copy, Debug)]
pub struct PdoMapping {
    index: u16,
    sub_index: u8,
    mapped_len: usize,
    is_dummy: bool,
    multibyte: bool,
}

/// Decodes one raw mapping-parameter entry: `index:16 | subIndex:8 | bits:8`.
pub fn decode_mapping_entry(raw: u32) -> (u16, u8, u8) {
    (
        (raw >> 16) as u16,
        ((raw >> 8) & 0xFF) as u8,
        (raw & 0xFF) as u8,
    )
}

/// Resolves a mapping-parameter array into concrete mappings, verifying
/// direction-mappability and accumulating the total payload length.
pub fn resolve_mapping(
    od: &ObjectDictionary,
    raw_entries: &[u32],
    is_tpdo: bool,
) -> Result<Vec<PdoMapping>, Odr> {
    let mut mappings = Vec::with_capacity(raw_entries.len());
    let mut total = 0usize;
    for &raw in raw_entries {
        let (index, sub_index, bits) = decode_mapping_entry(raw);
        if bits % 8 != 0 {
            return Err(Odr::NoMap);
        }
        let len = (bits / 8) as usize;
        let mapping = if index < 0x20 && sub_index == 0 {
            PdoMapping {
                index,
                sub_index,
                mapped_len: len,
                is_dummy: true,
                multibyte: false,
            }
        } else {
            let sub = od.get_sub(index, sub_index)?;
            if !sub.attributes.is_pdo_mappable(is_tpdo) {
                return Err(Odr::NoMap);
            }
            if let Some(fixed) = sub.data_type.fixed_len() {
                if fixed < len {
                    return Err(Odr::NoMap);
                }
            }
            PdoMapping {
                index,
                sub_index,
                mapped_len: len,
                is_dummy: false,
                multibyte: sub.attributes.contains(OdAttributes::MB),
            }
        };
        total += len;
        if total > 8 {
            return Err(Odr::MapLen);
        }
        mappings.push(mapping);
    }
    Ok(mappings)
}

fn swap_if_multibyte(bytes: &mut [u8], multibyte: bool) {
    if multibyte && cfg!(target_endian = "big") {
        bytes.reverse();
    }
}

/// Receive Process Data Object: double-buffered against the SYNC toggle,
/// DLC-validated, written through the OD on the mainline pass.
pub struct Rpdo {
    cob_id: u16,
    valid: bool,
    synchronous: bool,
    mappings: Vec<PdoMapping>,
    mapped_total: usize,
    buffers: [[u8; 8]; 2],
    buf_len: [usize; 2],
    new_flag: [bool; 2],
    timeout_time_us: u32,
    timeout_timer_us: u32,
}

impl Rpdo {
    pub fn new(cob_id: u16, valid: bool, synchronous: bool, mappings: Vec<PdoMapping>, timeout_time_us: u32) -> Self {
        let mapped_total = mappings.iter().map(|m| m.mapped_len).sum();
        Self {
            cob_id,
            valid,
            synchronous,
            mappings,
            mapped_total,
            buffers: [[0u8; 8]; 2],
            buf_len: [0; 2],
            new_flag: [false; 2],
            timeout_time_us,
            timeout_timer_us: 0,
        }
    }

    /// RX callback. `sync_rx_toggle` is [`crate::sync::Sync::rx_toggle`] at
    /// the moment the frame arrived.
    pub fn on_frame(&mut self, frame: &CanFrame, sync_rx_toggle: bool) {
        if frame.id() != self.cob_id {
            return;
        }
        let buf_no = if self.synchronous && sync_rx_toggle { 1 } else { 0 };
        let data = frame.data();
        let mut buf = [0u8; 8];
        let n = data.len().min(8);
        buf[..n].copy_from_slice(&data[..n]);
        self.buffers[buf_no] = buf;
        self.buf_len[buf_no] = data.len();
        self.new_flag[buf_no] = true;
    }

    fn write_mappings(&self, od: &ObjectDictionary, payload: &[u8; 8]) {
        let mut cursor = 0;
        for m in &self.mappings {
            if !m.is_dummy {
                let mut bytes = payload[cursor..cursor + m.mapped_len].to_vec();
                swap_if_multibyte(&mut bytes, m.multibyte);
                if let Err(e) = od.write(m.index, m.sub_index, &bytes, 0) {
                    log::warn!("RPDO mapped write to {:#06x}:{} failed: {e}", m.index, m.sub_index);
                }
            }
            cursor += m.mapped_len;
        }
    }

    /// Mainline step. `sync_rx_toggle` is read live, the same variable the
    /// RX path consulted; the mainline selects the buffer the RX path did
    /// *not* write into most recently (spec.md §4.6).
    pub fn process(
        &mut self,
        od: &ObjectDictionary,
        emcy: &Emcy,
        nmt_operational: bool,
        sync_was: bool,
        sync_rx_toggle: bool,
        dt_us: u32,
    ) {
        if !(self.valid && nmt_operational && (sync_was || !self.synchronous)) {
            if !self.valid || !nmt_operational {
                self.new_flag = [false, false];
                self.timeout_timer_us = 0;
            }
            return;
        }

        let buf_no = if self.synchronous && !sync_rx_toggle { 1 } else { 0 };
        let mut received = false;
        if self.new_flag[buf_no] {
            self.new_flag[buf_no] = false;
            received = true;
            let len = self.buf_len[buf_no];
            if len < self.mapped_total {
                emcy.error_enum(
                    true,
                    ErrorBit::RpdoWrongLength,
                    EmergencyErrorCode::ProtocolErrorPdoLength,
                    self.mapped_total as u32,
                );
            } else if len > self.mapped_total {
                emcy.error_enum(
                    true,
                    ErrorBit::RpdoWrongLength,
                    EmergencyErrorCode::ProtocolErrorPdoLengthExceeded,
                    self.mapped_total as u32,
                );
            } else {
                emcy.error_enum(false, ErrorBit::RpdoWrongLength, EmergencyErrorCode::ErrorResetOrNoError, 0);
                let payload = self.buffers[buf_no];
                self.write_mappings(od, &payload);
            }
        }

        if self.timeout_time_us > 0 {
            if received {
                self.timeout_timer_us = 0;
            } else {
                self.timeout_timer_us = self.timeout_timer_us.saturating_add(dt_us);
                if self.timeout_timer_us > self.timeout_time_us {
                    emcy.error_enum(
                        true,
                        ErrorBit::RpdoTimeOut,
                        EmergencyErrorCode::ProtocolErrorRpdoTimeout,
                        self.timeout_timer_us,
                    );
                }
            }
        }
    }
}

/// Transmit Process Data Object: trigger selection by `transmissionType`,
/// inhibit/event timers, payload assembly with TPDO-flag notification.
pub struct Tpdo {
    cob_id: u16,
    valid: bool,
    tpdo_num: u8,
    transmission_type: u8,
    sync_start_value: u8,
    sync_counter: u8,
    inhibit_time_us: u32,
    event_time_us: u32,
    inhibit_timer_us: u32,
    event_timer_us: u32,
    send_request: bool,
    mappings: Vec<PdoMapping>,
}

impl Tpdo {
    pub fn new(
        cob_id: u16,
        valid: bool,
        tpdo_num: u8,
        transmission_type: u8,
        sync_start_value: u8,
        inhibit_time_us: u32,
        event_time_us: u32,
        mappings: Vec<PdoMapping>,
    ) -> Self {
        Self {
            cob_id,
            valid,
            tpdo_num,
            transmission_type,
            sync_start_value,
            sync_counter: 255,
            inhibit_time_us,
            event_time_us,
            inhibit_timer_us: 0,
            event_timer_us: 0,
            send_request: true,
            mappings,
        }
    }

    /// `TPDOsendRequest`: the application asks for an event-driven send.
    pub fn request_send(&mut self) {
        self.send_request = true;
    }

    fn is_event_driven(&self) -> bool {
        self.transmission_type == TRANSMISSION_TYPE_SYNC_ACYCLIC
            || self.transmission_type >= TRANSMISSION_TYPE_SYNC_EVENT_LO
    }

    fn send(&mut self, bus: &dyn CanBus, od: &ObjectDictionary) -> Result<(), CanOpenError> {
        let mut payload = [0u8; 8];
        let mut cursor = 0;
        for m in &self.mappings {
            if !m.is_dummy {
                let mut buf = [0u8; 8];
                if let Err(e) = od.read(m.index, m.sub_index, &mut buf[..m.mapped_len], 0) {
                    log::warn!("TPDO mapped read from {:#06x}:{} failed: {e}", m.index, m.sub_index);
                }
                let mut bytes = buf[..m.mapped_len].to_vec();
                swap_if_multibyte(&mut bytes, m.multibyte);
                payload[cursor..cursor + m.mapped_len].copy_from_slice(&bytes);
            }
            cursor += m.mapped_len;
        }
        bus.send(&CanFrame::new(self.cob_id, &payload[..cursor])?)?;
        for m in &self.mappings {
            if !m.is_dummy {
                let _ = od.mark_tpdo_sent(m.index, m.sub_index, self.tpdo_num);
            }
        }
        self.send_request = false;
        self.inhibit_timer_us = self.inhibit_time_us;
        self.event_timer_us = self.event_time_us;
        Ok(())
    }

    /// Mainline step, sequenced after SYNC in the runtime's `process` order.
    pub fn process(
        &mut self,
        bus: &dyn CanBus,
        od: &ObjectDictionary,
        nmt_operational: bool,
        sync_was: bool,
        sync_counter_value: Option<u8>,
        dt_us: u32,
    ) -> Result<(), CanOpenError> {
        if !(self.valid && nmt_operational) {
            self.send_request = true;
            self.inhibit_timer_us = 0;
            self.event_timer_us = 0;
            self.sync_counter = 255;
            return Ok(());
        }

        if self.is_event_driven() {
            if self.event_time_us != 0 {
                self.event_timer_us = self.event_timer_us.saturating_sub(dt_us);
                if self.event_timer_us == 0 {
                    self.send_request = true;
                }
            }
            if !self.send_request {
                for m in &self.mappings {
                    if !m.is_dummy && !od.tpdo_transmitted(m.index, m.sub_index, self.tpdo_num).unwrap_or(true) {
                        self.send_request = true;
                        break;
                    }
                }
            }
        }

        if self.transmission_type >= TRANSMISSION_TYPE_SYNC_EVENT_LO {
            self.inhibit_timer_us = self.inhibit_timer_us.saturating_sub(dt_us);
            if self.send_request && self.inhibit_timer_us == 0 {
                self.send(bus, od)?;
            }
        } else if sync_was {
            if self.transmission_type == TRANSMISSION_TYPE_SYNC_ACYCLIC {
                if self.send_request {
                    self.send(bus, od)?;
                }
            } else {
                if self.sync_counter == 255 {
                    self.sync_counter = if sync_counter_value.is_some() && self.sync_start_value != 0 {
                        254
                    } else {
                        self.transmission_type
                    };
                }
                if self.sync_counter == 254 {
                    if sync_counter_value == Some(self.sync_start_value) {
                        self.sync_counter = self.transmission_type;
                        self.send(bus, od)?;
                    }
                } else {
                    self.sync_counter -= 1;
                    if self.sync_counter == 0 {
                        self.sync_counter = self.transmission_type;
                        self.send(bus, od)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LoopbackBus;
    use crate::od::{entry::OdDataType, ObjectDictionary, OdEntry, OdObject, OdSubEntry};

    fn od_with_u16(index: u16, attrs: OdAttributes) -> ObjectDictionary {
        ObjectDictionary::new(vec![OdEntry::new(
            index,
            OdObject::Var(OdSubEntry::new(0, "value", OdDataType::U16, attrs, vec![0, 0])),
        )])
    }

    #[test]
    fn mapping_rejects_non_byte_aligned_bits() {
        let od = od_with_u16(0x2100, OdAttributes::SDO_RW | OdAttributes::RPDO);
        let raw = (0x2100u32 << 16) | (0u32 << 8) | 12;
        assert_eq!(resolve_mapping(&od, &[raw], false).unwrap_err(), Odr::NoMap);
    }

    #[test]
    fn mapping_rejects_total_over_8_bytes() {
        let od = ObjectDictionary::new(vec![OdEntry::new(
            0x2100,
            OdObject::Var(OdSubEntry::new(
                0,
                "value",
                OdDataType::Domain,
                OdAttributes::SDO_RW | OdAttributes::RPDO,
                vec![0; 16],
            )),
        )]);
        let raw = (0x2100u32 << 16) | 64; // 8 bytes
        assert_eq!(
            resolve_mapping(&od, &[raw, raw], false).unwrap_err(),
            Odr::MapLen
        );
    }

    #[test]
    fn synchronous_rpdo_writes_od_only_after_sync_was_true() {
        // Concrete scenario 3 (spec.md §8).
        let od = od_with_u16(0x2100, OdAttributes::SDO_RW | OdAttributes::RPDO);
        let raw = (0x2100u32 << 16) | 16;
        let mappings = resolve_mapping(&od, &[raw], false).unwrap();
        let mut rpdo = Rpdo::new(0x205, true, true, mappings, 0);
        let emcy = Emcy::new(0x01, 8, true);

        rpdo.on_frame(&CanFrame::new(0x205, &[0x34, 0x12]).unwrap(), true);
        rpdo.process(&od, &emcy, true, false, true, 0);
        assert_eq!(od.read_u16(0x2100, 0).unwrap(), 0);

        rpdo.process(&od, &emcy, true, true, false, 0);
        assert_eq!(od.read_u16(0x2100, 0).unwrap(), 0x1234);
    }

    #[test]
    fn short_dlc_reports_wrong_length_and_skips_write() {
        let od = od_with_u16(0x2100, OdAttributes::SDO_RW | OdAttributes::RPDO);
        let raw = (0x2100u32 << 16) | 16;
        let mappings = resolve_mapping(&od, &[raw], false).unwrap();
        let mut rpdo = Rpdo::new(0x205, true, false, mappings, 0);
        let emcy = Emcy::new(0x01, 8, true);
        od.write_u16(0x2100, 0, 0xAAAA).unwrap();

        rpdo.on_frame(&CanFrame::new(0x205, &[0x01]).unwrap(), false);
        rpdo.process(&od, &emcy, true, true, false, 0);
        assert!(emcy.is_error(ErrorBit::RpdoWrongLength));
        assert_eq!(od.read_u16(0x2100, 0).unwrap(), 0xAAAA);
    }

    #[test]
    fn event_driven_tpdo_respects_inhibit_window() {
        // Concrete scenario 4 (spec.md §8).
        let od = od_with_u16(0x2200, OdAttributes::SDO_RW | OdAttributes::TPDO);
        let raw = (0x2200u32 << 16) | 16;
        let mappings = resolve_mapping(&od, &[raw], true).unwrap();
        let bus = LoopbackBus::new();
        let mut tpdo = Tpdo::new(0x185, true, 0, 254, 0, 100_000, 0, mappings);

        od.write_u16(0x2200, 0, 0xBEEF).unwrap();
        tpdo.request_send();
        tpdo.process(&bus, &od, true, false, None, 0).unwrap();
        let sent = bus.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data(), &[0xEF, 0xBE]);

        tpdo.request_send();
        tpdo.process(&bus, &od, true, false, None, 50_000).unwrap();
        assert!(bus.take_sent().is_empty());

        tpdo.process(&bus, &od, true, false, None, 50_000).unwrap();
        let sent = bus.take_sent();
        assert_eq!(sent.len(), 1);
    }

    #[test]
    fn sync_cyclic_tpdo_sends_every_nth_sync() {
        let od = od_with_u16(0x2200, OdAttributes::SDO_RW | OdAttributes::TPDO);
        let raw = (0x2200u32 << 16) | 16;
        let mappings = resolve_mapping(&od, &[raw], true).unwrap();
        let bus = LoopbackBus::new();
        let mut tpdo = Tpdo::new(0x185, true, 0, 3, 0, 0, 0, mappings);

        for _ in 0..2 {
            tpdo.process(&bus, &od, true, true, None, 0).unwrap();
            assert!(bus.take_sent().is_empty());
        }
        tpdo.process(&bus, &od, true, true, None, 0).unwrap();
        assert_eq!(bus.take_sent().len(), 1);
    }
}
