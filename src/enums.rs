//! Emergency error-code and error-register vocabularies from CiA301.
//!
//! Adapted from the teacher crate's `enums` module: same two types, same
//! encode/decode shape, but with the error-code range table de-overlapped
//! and the reserved `0x8200..0x82FF` protocol-error sub-ranges corrected.

use crate::error::CanOpenError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmergencyErrorCode {
    ErrorResetOrNoError,
    GenericError,
    Current,
    CurrentInputSide,
    CurrentInsideDevice,
    CurrentOutputSide,
    Voltage,
    MainsVoltage,
    VoltageInsideDevice,
    OutputVoltage,
    Temperature,
    AmbientTemperature,
    DeviceTemperature,
    DeviceHardware,
    DeviceSoftware,
    InternalSoftware,
    UserSoftware,
    DataSet,
    AdditionalModules,
    Monitoring,
    Communication,
    CommunicationCanOverrun,
    CommunicationErrorPassiveMode,
    CommunicationLifeGuardError,
    CommunicationRecoveredBusOff,
    CommunicationCanIdCollision,
    ProtocolError,
    ProtocolErrorPdoLength,
    ProtocolErrorPdoLengthExceeded,
    ProtocolErrorDamMpdo,
    ProtocolErrorUnexpectedSyncLength,
    ProtocolErrorRpdoTimeout,
    ExternalError,
    AdditionalFunctions,
    DeviceSpecific,
    /// Raw manufacturer/device-specific code, preserved verbatim.
    Raw(u16),
}

impl EmergencyErrorCode {
    pub fn decode(code: u16) -> Self {
        match code {
            0x0000 => Self::ErrorResetOrNoError,
            0x1000 => Self::GenericError,
            0x2000 => Self::Current,
            0x2100 => Self::CurrentInputSide,
            0x2200 => Self::CurrentInsideDevice,
            0x2300 => Self::CurrentOutputSide,
            0x3000 => Self::Voltage,
            0x3100 => Self::MainsVoltage,
            0x3200 => Self::VoltageInsideDevice,
            0x3300 => Self::OutputVoltage,
            0x4000 => Self::Temperature,
            0x4100 => Self::AmbientTemperature,
            0x4200 => Self::DeviceTemperature,
            0x5000 => Self::DeviceHardware,
            0x6000 => Self::DeviceSoftware,
            0x6100 => Self::InternalSoftware,
            0x6200 => Self::UserSoftware,
            0x6300 => Self::DataSet,
            0x7000 => Self::AdditionalModules,
            0x8000 => Self::Monitoring,
            0x8100 => Self::Communication,
            0x8110 => Self::CommunicationCanOverrun,
            0x8120 => Self::CommunicationErrorPassiveMode,
            0x8130 => Self::CommunicationLifeGuardError,
            0x8140 => Self::CommunicationRecoveredBusOff,
            0x8150 => Self::CommunicationCanIdCollision,
            0x8101..=0x81FF => Self::Communication,
            0x8200 => Self::ProtocolError,
            0x8210 => Self::ProtocolErrorPdoLength,
            0x8220 => Self::ProtocolErrorPdoLengthExceeded,
            0x8230 => Self::ProtocolErrorDamMpdo,
            0x8240 => Self::ProtocolErrorUnexpectedSyncLength,
            0x8250 => Self::ProtocolErrorRpdoTimeout,
            0x8201..=0x82FF => Self::ProtocolError,
            0x9000 => Self::ExternalError,
            0xF000 => Self::AdditionalFunctions,
            0xFF00 => Self::DeviceSpecific,
            0x0001..=0x00FF => Self::ErrorResetOrNoError,
            0x1001..=0x10FF => Self::GenericError,
            _ => Self::Raw(code),
        }
    }

    pub fn encode(&self) -> u16 {
        match self {
            Self::ErrorResetOrNoError => 0x0000,
            Self::GenericError => 0x1000,
            Self::Current => 0x2000,
            Self::CurrentInputSide => 0x2100,
            Self::CurrentInsideDevice => 0x2200,
            Self::CurrentOutputSide => 0x2300,
            Self::Voltage => 0x3000,
            Self::MainsVoltage => 0x3100,
            Self::VoltageInsideDevice => 0x3200,
            Self::OutputVoltage => 0x3300,
            Self::Temperature => 0x4000,
            Self::AmbientTemperature => 0x4100,
            Self::DeviceTemperature => 0x4200,
            Self::DeviceHardware => 0x5000,
            Self::DeviceSoftware => 0x6000,
            Self::InternalSoftware => 0x6100,
            Self::UserSoftware => 0x6200,
            Self::DataSet => 0x6300,
            Self::AdditionalModules => 0x7000,
            Self::Monitoring => 0x8000,
            Self::Communication => 0x8100,
            Self::CommunicationCanOverrun => 0x8110,
            Self::CommunicationErrorPassiveMode => 0x8120,
            Self::CommunicationLifeGuardError => 0x8130,
            Self::CommunicationRecoveredBusOff => 0x8140,
            Self::CommunicationCanIdCollision => 0x8150,
            Self::ProtocolError => 0x8200,
            Self::ProtocolErrorPdoLength => 0x8210,
            Self::ProtocolErrorPdoLengthExceeded => 0x8220,
            Self::ProtocolErrorDamMpdo => 0x8230,
            Self::ProtocolErrorUnexpectedSyncLength => 0x8240,
            Self::ProtocolErrorRpdoTimeout => 0x8250,
            Self::ExternalError => 0x9000,
            Self::AdditionalFunctions => 0xF000,
            Self::DeviceSpecific => 0xFF00,
            Self::Raw(code) => *code,
        }
    }
}

impl TryFrom<u16> for EmergencyErrorCode {
    type Error = CanOpenError;
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(Self::decode(value))
    }
}

bitflags::bitflags! {
    /// Error register bitfield (OD 0x1001), also carried in byte 2 of the
    /// EMCY frame. Each bit summarizes one group of error-status bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EmergencyErrorRegister: u8 {
        const GENERIC               = 0x01;
        const CURRENT                = 0x02;
        const VOLTAGE                = 0x04;
        const TEMPERATURE            = 0x08;
        const COMMUNICATION          = 0x10;
        const DEVICE_PROFILE_SPECIFIC = 0x20;
        const RESERVED               = 0x40;
        const MANUFACTURER_SPECIFIC  = 0x80;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_named_codes() {
        for code in [
            EmergencyErrorCode::CommunicationCanOverrun,
            EmergencyErrorCode::ProtocolErrorPdoLength,
            EmergencyErrorCode::AmbientTemperature,
        ] {
            assert_eq!(EmergencyErrorCode::decode(code.encode()), code);
        }
    }

    #[test]
    fn unmapped_manufacturer_code_round_trips_raw() {
        let code = EmergencyErrorCode::decode(0xABCD);
        assert_eq!(code, EmergencyErrorCode::Raw(0xABCD));
        assert_eq!(code.encode(), 0xABCD);
    }

    #[test]
    fn error_register_bits_compose() {
        let reg = EmergencyErrorRegister::CURRENT | EmergencyErrorRegister::COMMUNICATION;
        assert_eq!(reg.bits(), 0x12);
    }
}
