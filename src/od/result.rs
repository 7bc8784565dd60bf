//! Object Dictionary result codes and their fixed SDO abort-code mapping.
//!
//! Direct counterpart of `ODR_t` / `OD_getSDOabCode` in
//! `original_source/301/CO_ODinterface.h` and `.c`: every access to an OD
//! sub-entry returns one of these, and every SDO abort frame this crate ever
//! emits is derived from one of these via [`Odr::sdo_abort_code`].

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Odr {
    #[error("no abort")]
    Ok,
    #[error("read-only value written, but not yet updated")]
    OutOfMemory,
    #[error("unsupported access to an object")]
    Unsupported,
    #[error("attempt to read a write-only object")]
    WriteOnly,
    #[error("attempt to write a read-only object")]
    ReadOnly,
    #[error("object does not exist in the object dictionary")]
    DoesNotExist,
    #[error("object cannot be mapped to the PDO")]
    NoMap,
    #[error("number and length of mapped objects exceeds PDO length")]
    MapLen,
    #[error("general parameter incompatibility reasons")]
    ParIncompat,
    #[error("general internal incompatibility in the device")]
    IncompatDevice,
    #[error("access failed due to a hardware error")]
    HwError,
    #[error("data type does not match, length of service parameter does not match")]
    TypeMismatch,
    #[error("data type does not match, length of service parameter too high")]
    DataLong,
    #[error("data type does not match, length of service parameter too short")]
    DataShort,
    #[error("sub-index does not exist")]
    SubNotExist,
    #[error("invalid value for parameter (download only)")]
    InvalidValue,
    #[error("value of parameter written is too high")]
    ValueHigh,
    #[error("value of parameter written is too low")]
    ValueLow,
    #[error("maximum value is less than minimum value")]
    MaxLessThanMin,
    #[error("resource not available: SDO connection")]
    NoResource,
    #[error("general error")]
    GeneralError,
    #[error("data cannot be transferred or stored to the application")]
    DataTransf,
    #[error("data cannot be transferred or stored because of local control")]
    DataLocCtrl,
    #[error("data cannot be transferred because of the present device state")]
    DataDevState,
    #[error("object dictionary not present or dynamic generation failed")]
    NoOd,
    #[error("no data available")]
    NoData,
    /// Not in the original `ODR_t`: returned when a read/write targets a
    /// segmented transfer offset past the object's length. Kept distinct
    /// from [`Odr::DataShort`]/[`Odr::DataLong`], which are SDO-size
    /// mismatches, not stream-offset errors.
    #[error("requested offset is past the end of the object")]
    OffsetOutOfRange,
}

impl Odr {
    /// `OD_getSDOabCode` in `CO_ODinterface.c`, verbatim.
    pub fn sdo_abort_code(self) -> u32 {
        match self {
            Odr::Ok => 0x0000_0000,
            Odr::OutOfMemory => 0x0504_0005,
            Odr::Unsupported => 0x0601_0000,
            Odr::WriteOnly => 0x0601_0001,
            Odr::ReadOnly => 0x0601_0002,
            Odr::DoesNotExist => 0x0602_0000,
            Odr::NoMap => 0x0604_0041,
            Odr::MapLen => 0x0604_0042,
            Odr::ParIncompat => 0x0604_0043,
            Odr::IncompatDevice => 0x0604_0047,
            Odr::HwError => 0x0606_0000,
            Odr::TypeMismatch => 0x0607_0010,
            Odr::DataLong => 0x0607_0012,
            Odr::DataShort => 0x0607_0013,
            Odr::SubNotExist => 0x0609_0011,
            Odr::InvalidValue => 0x0609_0030,
            Odr::ValueHigh => 0x0609_0031,
            Odr::ValueLow => 0x0609_0032,
            Odr::MaxLessThanMin => 0x0609_0036,
            Odr::NoResource => 0x060A_0023,
            Odr::GeneralError => 0x0800_0000,
            Odr::DataTransf => 0x0800_0020,
            Odr::DataLocCtrl => 0x0800_0021,
            Odr::DataDevState => 0x0800_0022,
            Odr::NoOd => 0x0800_0023,
            Odr::NoData => 0x0800_0024,
            Odr::OffsetOutOfRange => 0x0607_0013,
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Odr::Ok)
    }
}

pub type OdResult<T> = Result<T, Odr>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_codes_match_the_published_table() {
        assert_eq!(Odr::DoesNotExist.sdo_abort_code(), 0x0602_0000);
        assert_eq!(Odr::SubNotExist.sdo_abort_code(), 0x0609_0011);
        assert_eq!(Odr::MaxLessThanMin.sdo_abort_code(), 0x0609_0036);
        assert_eq!(Odr::NoData.sdo_abort_code(), 0x0800_0024);
    }
}
