//! Typed storage for a single Object Dictionary sub-entry.

use std::sync::Mutex;

use super::attributes::OdAttributes;
use super::extension::OdAccess;

/// CANopen basic data types this crate's OD engine understands (CiA301 Table
/// 44). `Domain`/`OctetString`/`VisibleString` are variable-length; every
/// other variant has a fixed wire width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OdDataType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Real32,
    Real64,
    VisibleString,
    OctetString,
    Domain,
}

impl OdDataType {
    /// Byte width for fixed-size types, `None` for variable-length ones.
    pub fn fixed_len(&self) -> Option<usize> {
        use OdDataType::*;
        match self {
            Bool | I8 | U8 => Some(1),
            I16 | U16 => Some(2),
            I32 | U32 | Real32 => Some(4),
            I64 | U64 | Real64 => Some(8),
            VisibleString | OctetString | Domain => None,
        }
    }
}

/// One addressable sub-entry: a VAR object, or one element of an ARRAY/RECORD.
pub struct OdSubEntry {
    pub sub_index: u8,
    pub data_type: OdDataType,
    pub attributes: OdAttributes,
    pub name: &'static str,
    access: OdAccess,
    /// Per-TPDO-number "transmitted since last request" bits. The original's
    /// `OD_extension_t.flagsPDO` is one shared bit array per OD *object* (up
    /// to 256 bits, indexed by the mapped sub-entry's own subIndex) — a
    /// single flag per sub-entry, shared by whichever one TPDO maps it. This
    /// crate tracks the flag per sub-entry instead, with one bit per TPDO
    /// number (0-7, since this crate only ever configures 4, §4.6), so a
    /// sub-entry mapped into more than one TPDO still gets each TPDO its own
    /// independent "transmitted" flag. A clear bit means "a write requested a
    /// send and the PDO engine hasn't transmitted it yet"; entries start all
    /// set (nothing pending).
    pdo_flags: Mutex<u8>,
}

impl OdSubEntry {
    pub fn new(
        sub_index: u8,
        name: &'static str,
        data_type: OdDataType,
        attributes: OdAttributes,
        initial: Vec<u8>,
    ) -> Self {
        Self {
            sub_index,
            data_type,
            attributes,
            name,
            access: OdAccess::Default(Mutex::new(initial)),
            pdo_flags: Mutex::new(0xFF),
        }
    }

    pub fn with_extension(
        sub_index: u8,
        name: &'static str,
        data_type: OdDataType,
        attributes: OdAttributes,
        extension: super::extension::OdExtension,
    ) -> Self {
        Self {
            sub_index,
            data_type,
            attributes,
            name,
            access: OdAccess::Extended(Mutex::new(extension)),
            pdo_flags: Mutex::new(0xFF),
        }
    }

    pub fn access(&self) -> &OdAccess {
        &self.access
    }

    /// Mark that TPDO number `tpdo_num` should consider an event-driven send
    /// because this sub-entry's value just changed (`OD_requestTPDO` in the
    /// original: clears the bit).
    pub fn request_tpdo(&self, tpdo_num: u8) {
        if tpdo_num < 8 {
            *self.pdo_flags.lock().expect("pdo_flags mutex poisoned") &= !(1 << tpdo_num);
        }
    }

    /// `OD_TPDOtransmitted`: true once the PDO engine has sent a TPDO
    /// containing this sub-entry since the last [`Self::request_tpdo`].
    pub fn tpdo_transmitted(&self, tpdo_num: u8) -> bool {
        if tpdo_num >= 8 {
            return true;
        }
        *self.pdo_flags.lock().expect("pdo_flags mutex poisoned") & (1 << tpdo_num) != 0
    }

    /// Called by the PDO engine once a TPDO containing this sub-entry has
    /// actually been transmitted.
    pub fn mark_tpdo_sent(&self, tpdo_num: u8) {
        if tpdo_num < 8 {
            *self.pdo_flags.lock().expect("pdo_flags mutex poisoned") |= 1 << tpdo_num;
        }
    }
}

/// The three object kinds CiA301 §7.4 defines for the Object Dictionary.
pub enum OdObject {
    Var(OdSubEntry),
    Array(Vec<OdSubEntry>),
    Record(Vec<OdSubEntry>),
}

impl OdObject {
    pub fn sub(&self, sub_index: u8) -> Option<&OdSubEntry> {
        match self {
            OdObject::Var(entry) => (sub_index == 0).then_some(entry),
            OdObject::Array(entries) | OdObject::Record(entries) => {
                entries.iter().find(|e| e.sub_index == sub_index)
            }
        }
    }

    /// Highest valid sub-index, i.e. the value read back from sub-index 0 of
    /// an ARRAY (`OD_getSub`'s special-cased "sub-index 0 is the count").
    pub fn max_sub_index(&self) -> u8 {
        match self {
            OdObject::Var(_) => 0,
            OdObject::Array(entries) | OdObject::Record(entries) => {
                entries.iter().map(|e| e.sub_index).max().unwrap_or(0)
            }
        }
    }
}

pub struct OdEntry {
    pub index: u16,
    pub object: OdObject,
}

impl OdEntry {
    pub fn new(index: u16, object: OdObject) -> Self {
        Self { index, object }
    }
}
