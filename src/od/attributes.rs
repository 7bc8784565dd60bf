//! Per-sub-entry access attributes: `OD_attributes_t` in
//! `original_source/301/CO_ODinterface.h`.

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OdAttributes: u16 {
        /// SDO server may read this sub-entry.
        const SDO_R = 0x01;
        /// SDO server may write this sub-entry.
        const SDO_W = 0x02;
        const SDO_RW = Self::SDO_R.bits() | Self::SDO_W.bits();
        /// May be mapped into a TPDO.
        const TPDO = 0x04;
        /// May be mapped into an RPDO.
        const RPDO = 0x08;
        const TRPDO = Self::TPDO.bits() | Self::RPDO.bits();
        /// May be mapped into a transmit SRDO (storage only, §3).
        const TSRDO = 0x10;
        /// May be mapped into a receive SRDO (storage only, §3).
        const RSRDO = 0x20;
        const TRSRDO = Self::TSRDO.bits() | Self::RSRDO.bits();
        /// Multi-byte value: endianness conversion applies on non-LE hosts.
        const MB = 0x40;
        /// Value is a (possibly non-NUL-terminated) string.
        const STR = 0x80;
    }
}

impl OdAttributes {
    pub fn is_pdo_mappable(&self, tpdo: bool) -> bool {
        if tpdo {
            self.contains(OdAttributes::TPDO)
        } else {
            self.contains(OdAttributes::RPDO)
        }
    }

    pub fn readable_by_sdo(&self) -> bool {
        self.contains(OdAttributes::SDO_R)
    }

    pub fn writable_by_sdo(&self) -> bool {
        self.contains(OdAttributes::SDO_W)
    }
}
