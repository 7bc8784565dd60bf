//! `OD_stream_t` equivalent: the handle passed to a read/write access.
//!
//! Per the Design Notes' flagged open question, `dataOffset` in the original
//! served two unrelated purposes — segmented-transfer bookkeeping in the SDO
//! path, and a stash for the PDO engine's mapped-byte-length in the PDO path.
//! Here `offset` is reserved solely for segmented-transfer bookkeeping; the
//! PDO engine keeps its own mapped length in `crate::pdo::PdoMapping`.

use super::attributes::OdAttributes;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OdStream {
    pub index: u16,
    pub sub_index: u8,
    /// Byte offset into the sub-entry for segmented SDO transfers. Zero for
    /// a single-shot (expedited) access.
    pub offset: usize,
    pub attribute: OdAttributes,
}

impl OdStream {
    pub fn new(index: u16, sub_index: u8, attribute: OdAttributes) -> Self {
        Self {
            index,
            sub_index,
            offset: 0,
            attribute,
        }
    }
}
