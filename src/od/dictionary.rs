//! The Object Dictionary itself: `OD_t` plus the `OD_find`/`OD_getSub`/
//! `OD_readOriginal`/`OD_writeOriginal` access path from
//! `original_source/301/CO_ODinterface.c`.

use super::attributes::OdAttributes;
use super::entry::{OdEntry, OdObject, OdSubEntry};
use super::extension::{OdAccess, OdExtension};
use super::result::{Odr, OdResult};
use super::stream::OdStream;

/// Outcome of a successful OD read: how many bytes landed in the caller's
/// buffer, and whether the sub-entry's value extends beyond it (the
/// segmented-transfer "PARTIAL" signal from the original).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OdReadOutcome {
    pub len: usize,
    pub complete: bool,
}

pub struct ObjectDictionary {
    /// Sorted ascending by index — `OD_find`'s binary search precondition.
    entries: Vec<OdEntry>,
}

impl ObjectDictionary {
    pub fn new(mut entries: Vec<OdEntry>) -> Self {
        entries.sort_by_key(|e| e.index);
        Self { entries }
    }

    /// `OD_find`: binary search over the sorted entry table.
    pub fn find(&self, index: u16) -> OdResult<&OdEntry> {
        self.entries
            .binary_search_by_key(&index, |e| e.index)
            .map(|i| &self.entries[i])
            .map_err(|_| Odr::DoesNotExist)
    }

    /// `OD_getSub`: locate a sub-entry, accounting for ARRAY/RECORD shape.
    pub fn get_sub(&self, index: u16, sub_index: u8) -> OdResult<&OdSubEntry> {
        self.find(index)?
            .object
            .sub(sub_index)
            .ok_or(Odr::SubNotExist)
    }

    pub fn read(
        &self,
        index: u16,
        sub_index: u8,
        buf: &mut [u8],
        offset: usize,
    ) -> OdResult<OdReadOutcome> {
        let sub = self.get_sub(index, sub_index)?;
        if !sub.attributes.readable_by_sdo() {
            return Err(Odr::WriteOnly);
        }
        let mut stream = OdStream::new(index, sub_index, sub.attributes);
        stream.offset = offset;
        match sub.access() {
            OdAccess::Extended(ext) => {
                let ext = ext.lock().expect("OD extension mutex poisoned");
                match &ext.read {
                    Some(read_fn) => {
                        let len = read_fn(&stream, buf)?;
                        Ok(OdReadOutcome {
                            len,
                            complete: true,
                        })
                    }
                    None => Err(Odr::Unsupported),
                }
            }
            OdAccess::Default(storage) => {
                let data = storage.lock().expect("OD storage mutex poisoned");
                Self::read_original(&data, &stream, buf)
            }
        }
    }

    /// `OD_readOriginal`: copy from the backing byte vector, reporting
    /// whether more data remains beyond what the caller's buffer can hold.
    fn read_original(data: &[u8], stream: &OdStream, buf: &mut [u8]) -> OdResult<OdReadOutcome> {
        if stream.offset > data.len() {
            return Err(Odr::OffsetOutOfRange);
        }
        let remaining = &data[stream.offset..];
        let len = remaining.len().min(buf.len());
        buf[..len].copy_from_slice(&remaining[..len]);
        Ok(OdReadOutcome {
            len,
            complete: len == remaining.len(),
        })
    }

    pub fn write(
        &self,
        index: u16,
        sub_index: u8,
        data: &[u8],
        offset: usize,
    ) -> OdResult<usize> {
        let sub = self.get_sub(index, sub_index)?;
        if !sub.attributes.writable_by_sdo() {
            return Err(Odr::ReadOnly);
        }
        let mut stream = OdStream::new(index, sub_index, sub.attributes);
        stream.offset = offset;
        let written = match sub.access() {
            OdAccess::Extended(ext) => {
                let mut ext = ext.lock().expect("OD extension mutex poisoned");
                match &mut ext.write {
                    Some(write_fn) => write_fn(&stream, data)?,
                    None => return Err(Odr::Unsupported),
                }
            }
            OdAccess::Default(storage) => {
                let mut cell = storage.lock().expect("OD storage mutex poisoned");
                Self::write_original(&mut cell, &stream, data, sub.data_type.fixed_len())?
            }
        };
        Ok(written)
    }

    /// `OD_writeOriginal`: splice into the backing byte vector. Fixed-size
    /// types reject writes that would extend past their declared width
    /// (`ODR_DATA_LONG`); variable-length types (string/domain) grow freely.
    fn write_original(
        data: &mut Vec<u8>,
        stream: &OdStream,
        src: &[u8],
        fixed_len: Option<usize>,
    ) -> OdResult<usize> {
        let end = stream.offset.checked_add(src.len()).ok_or(Odr::OutOfMemory)?;
        if let Some(fixed) = fixed_len {
            if end > fixed {
                return Err(Odr::DataLong);
            }
        }
        if end > data.len() {
            data.resize(end, 0);
        }
        data[stream.offset..end].copy_from_slice(src);
        Ok(src.len())
    }

    /// Direct storage access bypassing any extension (`OD_getPtr_*`
    /// equivalents in the original). Returns [`Odr::Unsupported`] for
    /// sub-entries backed by an extension rather than plain storage.
    pub fn get_direct_bytes(&self, index: u16, sub_index: u8) -> OdResult<Vec<u8>> {
        let sub = self.get_sub(index, sub_index)?;
        match sub.access() {
            OdAccess::Default(storage) => {
                Ok(storage.lock().expect("OD storage mutex poisoned").clone())
            }
            OdAccess::Extended(_) => Err(Odr::Unsupported),
        }
    }

    pub fn set_direct_bytes(&self, index: u16, sub_index: u8, data: &[u8]) -> OdResult<()> {
        let sub = self.get_sub(index, sub_index)?;
        match sub.access() {
            OdAccess::Default(storage) => {
                *storage.lock().expect("OD storage mutex poisoned") = data.to_vec();
                Ok(())
            }
            OdAccess::Extended(_) => Err(Odr::Unsupported),
        }
    }

    pub fn set_extension(
        &self,
        index: u16,
        sub_index: u8,
        extension: OdExtension,
    ) -> OdResult<()> {
        let sub = self.get_sub(index, sub_index)?;
        match sub.access() {
            OdAccess::Extended(slot) => {
                *slot.lock().expect("OD extension mutex poisoned") = extension;
                Ok(())
            }
            OdAccess::Default(_) => Err(Odr::Unsupported),
        }
    }

    pub fn attributes(&self, index: u16, sub_index: u8) -> OdResult<OdAttributes> {
        Ok(self.get_sub(index, sub_index)?.attributes)
    }

    /// `OD_requestTPDO`: mark that `tpdo_num`'s event-driven transmission
    /// should consider sending because this sub-entry's value just changed.
    pub fn request_tpdo(&self, index: u16, sub_index: u8, tpdo_num: u8) -> OdResult<()> {
        self.get_sub(index, sub_index)?.request_tpdo(tpdo_num);
        Ok(())
    }

    pub fn tpdo_transmitted(&self, index: u16, sub_index: u8, tpdo_num: u8) -> OdResult<bool> {
        Ok(self.get_sub(index, sub_index)?.tpdo_transmitted(tpdo_num))
    }

    pub fn mark_tpdo_sent(&self, index: u16, sub_index: u8, tpdo_num: u8) -> OdResult<()> {
        self.get_sub(index, sub_index)?.mark_tpdo_sent(tpdo_num);
        Ok(())
    }

    pub fn read_u8(&self, index: u16, sub_index: u8) -> OdResult<u8> {
        let mut buf = [0u8; 1];
        self.read(index, sub_index, &mut buf, 0)?;
        Ok(buf[0])
    }

    pub fn read_u16(&self, index: u16, sub_index: u8) -> OdResult<u16> {
        let mut buf = [0u8; 2];
        self.read(index, sub_index, &mut buf, 0)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&self, index: u16, sub_index: u8) -> OdResult<u32> {
        let mut buf = [0u8; 4];
        self.read(index, sub_index, &mut buf, 0)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn write_u8(&self, index: u16, sub_index: u8, value: u8) -> OdResult<()> {
        self.write(index, sub_index, &[value], 0)?;
        Ok(())
    }

    pub fn write_u16(&self, index: u16, sub_index: u8, value: u16) -> OdResult<()> {
        self.write(index, sub_index, &value.to_le_bytes(), 0)?;
        Ok(())
    }

    pub fn write_u32(&self, index: u16, sub_index: u8, value: u32) -> OdResult<()> {
        self.write(index, sub_index, &value.to_le_bytes(), 0)?;
        Ok(())
    }
}

/// ARRAY/RECORD sub-entries that are never mapped as a "count" at sub-index
/// 0 still need one; this helper builds the conventional
/// "highest sub-index supported" entry (CiA301 §7.4.4).
pub fn sub_count_entry(count: u8) -> OdSubEntry {
    OdSubEntry::new(
        0,
        "highest sub-index supported",
        super::entry::OdDataType::U8,
        OdAttributes::SDO_R,
        vec![count],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::od::entry::OdDataType;

    fn sample_od() -> ObjectDictionary {
        ObjectDictionary::new(vec![
            OdEntry::new(
                0x1000,
                OdObject::Var(OdSubEntry::new(
                    0,
                    "device type",
                    OdDataType::U32,
                    OdAttributes::SDO_R,
                    0u32.to_le_bytes().to_vec(),
                )),
            ),
            OdEntry::new(
                0x1001,
                OdObject::Var(OdSubEntry::new(
                    0,
                    "error register",
                    OdDataType::U8,
                    OdAttributes::SDO_R | OdAttributes::TPDO,
                    vec![0],
                )),
            ),
            OdEntry::new(
                0x2000,
                OdObject::Var(OdSubEntry::new(
                    0,
                    "manufacturer scratch value",
                    OdDataType::U32,
                    OdAttributes::SDO_RW,
                    0u32.to_le_bytes().to_vec(),
                )),
            ),
        ])
    }

    #[test]
    fn find_is_missing_for_unknown_index() {
        let od = sample_od();
        assert_eq!(od.find(0x2001).unwrap_err(), Odr::DoesNotExist);
    }

    #[test]
    fn read_write_round_trip_u32() {
        let od = sample_od();
        od.write_u32(0x2000, 0, 0xDEAD_BEEF).unwrap();
        assert_eq!(od.read_u32(0x2000, 0).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn write_rejects_oversized_payload() {
        let od = sample_od();
        assert_eq!(
            od.write(0x2000, 0, &[1, 2, 3, 4, 5], 0).unwrap_err(),
            Odr::DataLong
        );
    }

    #[test]
    fn read_only_entry_rejects_write() {
        let od = sample_od();
        assert_eq!(od.write_u8(0x1001, 0, 1).unwrap_err(), Odr::ReadOnly);
    }

    #[test]
    fn tpdo_flag_round_trips() {
        let od = sample_od();
        assert!(od.tpdo_transmitted(0x1001, 0, 0).unwrap());
        od.request_tpdo(0x1001, 0, 0).unwrap();
        assert!(!od.tpdo_transmitted(0x1001, 0, 0).unwrap());
        od.mark_tpdo_sent(0x1001, 0, 0).unwrap();
        assert!(od.tpdo_transmitted(0x1001, 0, 0).unwrap());
    }
}
