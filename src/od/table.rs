//! A default DS301 Object Dictionary, the Rust counterpart of the
//! generated `OD.c`/`OD.h` pair CANopenNode ships per-device (OD-from-EDS
//! generation itself is out of scope, spec.md §1) — enough entries for every
//! in-scope subsystem (NMT/HB, EMCY, SYNC, TIME, 4 RPDOs, 4 TPDOs, GFC) to
//! find the parameters it expects, used by the demo binary and integration
//! tests.

use super::attributes::OdAttributes;
use super::dictionary::{sub_count_entry, ObjectDictionary};
use super::entry::{OdDataType, OdEntry, OdObject, OdSubEntry};
use super::index;

fn var_u8(name: &'static str, attrs: OdAttributes, value: u8) -> OdSubEntry {
    OdSubEntry::new(0, name, OdDataType::U8, attrs, vec![value])
}

fn var_u16(name: &'static str, attrs: OdAttributes, value: u16) -> OdSubEntry {
    OdSubEntry::new(0, name, OdDataType::U16, attrs, value.to_le_bytes().to_vec())
}

fn var_u32(name: &'static str, attrs: OdAttributes, value: u32) -> OdSubEntry {
    OdSubEntry::new(0, name, OdDataType::U32, attrs, value.to_le_bytes().to_vec())
}

fn with_sub_indices(mut entries: Vec<OdSubEntry>) -> Vec<OdSubEntry> {
    for (i, e) in entries.iter_mut().enumerate() {
        e.sub_index = i as u8;
    }
    entries
}

fn rpdo_comm_params(cob_id: u32) -> OdEntry {
    let entries = with_sub_indices(vec![
        sub_count_entry(2),
        var_u32("COB-ID used by RPDO", OdAttributes::SDO_RW, cob_id),
        var_u8("transmission type", OdAttributes::SDO_RW, 255),
    ]);
    OdEntry::new(0, OdObject::Record(entries))
}

fn tpdo_comm_params(cob_id: u32) -> OdEntry {
    let entries = with_sub_indices(vec![
        sub_count_entry(6),
        var_u32("COB-ID used by TPDO", OdAttributes::SDO_RW, cob_id),
        var_u8("transmission type", OdAttributes::SDO_RW, 255),
        var_u16("inhibit time", OdAttributes::SDO_RW, 0),
        var_u8("reserved", OdAttributes::SDO_RW, 0),
        var_u16("event timer", OdAttributes::SDO_RW, 0),
        var_u8("SYNC start value", OdAttributes::SDO_RW, 0),
    ]);
    OdEntry::new(0, OdObject::Record(entries))
}

fn pdo_mapping(mappings: &[(u16, u8, u8)]) -> OdEntry {
    let mut entries = vec![sub_count_entry(mappings.len() as u8)];
    for (i, &(index, sub, bit_len)) in mappings.iter().enumerate() {
        let packed = ((index as u32) << 16) | ((sub as u32) << 8) | bit_len as u32;
        entries.push(var_u32(
            "mapped object",
            OdAttributes::SDO_RW,
            packed,
        ));
        entries[i + 1].sub_index = (i + 1) as u8;
    }
    OdEntry::new(0, OdObject::Record(entries))
}

/// `node_id` seeds the default COB-IDs (CiA301's "predefined connection set",
/// base + node-ID) for SDO/PDO/Guard parameters.
pub fn default_od(node_id: u8) -> ObjectDictionary {
    let nid = node_id as u32;
    let mut entries = vec![
        OdEntry::new(
            index::DEVICE_TYPE,
            OdObject::Var(var_u32("device type", OdAttributes::SDO_R, 0)),
        ),
        OdEntry::new(
            index::ERROR_REGISTER,
            OdObject::Var(var_u8(
                "error register",
                OdAttributes::SDO_R | OdAttributes::TPDO,
                0,
            )),
        ),
        OdEntry::new(
            index::PREDEFINED_ERROR_FIELD,
            OdObject::Array(vec![
                sub_count_entry(8),
                var_u32("standard error field 1", OdAttributes::SDO_R, 0),
                var_u32("standard error field 2", OdAttributes::SDO_R, 0),
                var_u32("standard error field 3", OdAttributes::SDO_R, 0),
                var_u32("standard error field 4", OdAttributes::SDO_R, 0),
                var_u32("standard error field 5", OdAttributes::SDO_R, 0),
                var_u32("standard error field 6", OdAttributes::SDO_R, 0),
                var_u32("standard error field 7", OdAttributes::SDO_R, 0),
                var_u32("standard error field 8", OdAttributes::SDO_R, 0),
            ]),
        ),
        OdEntry::new(
            index::COB_ID_SYNC_MESSAGE,
            OdObject::Var(var_u32("COB-ID SYNC", OdAttributes::SDO_RW, 0x080)),
        ),
        OdEntry::new(
            index::COMMUNICATION_CYCLE_PERIOD,
            OdObject::Var(var_u32(
                "communication cycle period",
                OdAttributes::SDO_RW,
                0,
            )),
        ),
        OdEntry::new(
            index::SYNCHRONOUS_WINDOW_LENGTH,
            OdObject::Var(var_u32(
                "synchronous window length",
                OdAttributes::SDO_RW,
                0,
            )),
        ),
        OdEntry::new(
            index::COB_ID_TIME_STAMP,
            OdObject::Var(var_u32("COB-ID TIME", OdAttributes::SDO_RW, 0x100)),
        ),
        OdEntry::new(
            index::COB_ID_EMERGENCY,
            OdObject::Var(var_u32(
                "COB-ID EMCY",
                OdAttributes::SDO_RW,
                0x080 + nid,
            )),
        ),
        OdEntry::new(
            index::INHIBIT_TIME_EMERGENCY,
            OdObject::Var(var_u16("inhibit time EMCY", OdAttributes::SDO_RW, 0)),
        ),
        OdEntry::new(
            index::CONSUMER_HEARTBEAT_TIME,
            OdObject::Array(vec![
                sub_count_entry(4),
                var_u32("consumer heartbeat time 1", OdAttributes::SDO_RW, 0),
                var_u32("consumer heartbeat time 2", OdAttributes::SDO_RW, 0),
                var_u32("consumer heartbeat time 3", OdAttributes::SDO_RW, 0),
                var_u32("consumer heartbeat time 4", OdAttributes::SDO_RW, 0),
            ]),
        ),
        OdEntry::new(
            index::PRODUCER_HEARTBEAT_TIME,
            OdObject::Var(var_u16(
                "producer heartbeat time",
                OdAttributes::SDO_RW,
                1000,
            )),
        ),
        OdEntry::new(
            index::IDENTITY_OBJECT,
            OdObject::Record(vec![
                sub_count_entry(4),
                var_u32("vendor-ID", OdAttributes::SDO_R, 0),
                var_u32("product code", OdAttributes::SDO_R, 0),
                var_u32("revision number", OdAttributes::SDO_R, 0),
                var_u32("serial number", OdAttributes::SDO_R, 0),
            ]),
        ),
        OdEntry::new(
            index::SYNC_COUNTER_OVERFLOW_VALUE,
            OdObject::Var(var_u8("synchronous counter overflow value", OdAttributes::SDO_RW, 0)),
        ),
        OdEntry::new(
            index::ERROR_BEHAVIOR,
            OdObject::Array(with_sub_indices(vec![
                sub_count_entry(6),
                var_u8("communication error (bus-off / HB consumer)", OdAttributes::SDO_RW, 0),
                var_u8("communication error", OdAttributes::SDO_RW, 0),
                var_u8("CAN bus passive", OdAttributes::SDO_RW, 0),
                var_u8("generic error", OdAttributes::SDO_RW, 0),
                var_u8("device profile error", OdAttributes::SDO_RW, 0),
                var_u8("manufacturer error", OdAttributes::SDO_RW, 0),
            ])),
        ),
        OdEntry::new(
            index::GFC_PARAMETER,
            OdObject::Var(var_u32("COB-ID GFC", OdAttributes::SDO_RW, 0x001)),
        ),
    ];

    for n in 0..4u32 {
        entries.push(OdEntry::new(
            index::RPDO_1_COMMUNICATION_PARAMETER + n as u16,
            OdObject::Record(
                match rpdo_comm_params(0x200 + n * 0x100 + nid).object {
                    OdObject::Record(e) => e,
                    _ => unreachable!(),
                },
            ),
        ));
        entries.push(OdEntry::new(
            index::RPDO_1_MAPPING_PARAMETER + n as u16,
            OdObject::Record(match pdo_mapping(&[]).object {
                OdObject::Record(e) => e,
                _ => unreachable!(),
            }),
        ));
        entries.push(OdEntry::new(
            index::TPDO_1_COMMUNICATION_PARAMETER + n as u16,
            OdObject::Record(
                match tpdo_comm_params(0x180 + n * 0x100 + nid).object {
                    OdObject::Record(e) => e,
                    _ => unreachable!(),
                },
            ),
        ));
        entries.push(OdEntry::new(
            index::TPDO_1_MAPPING_PARAMETER + n as u16,
            OdObject::Record(match pdo_mapping(&[]).object {
                OdObject::Record(e) => e,
                _ => unreachable!(),
            }),
        ));
    }

    ObjectDictionary::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_seeds_expected_cob_ids() {
        let od = default_od(5);
        assert_eq!(od.read_u32(index::COB_ID_SYNC_MESSAGE, 0).unwrap(), 0x080);
        assert_eq!(od.read_u32(index::COB_ID_EMERGENCY, 0).unwrap(), 0x085);
        assert_eq!(
            od.read_u32(index::TPDO_1_COMMUNICATION_PARAMETER, 1).unwrap(),
            0x185
        );
    }
}
