//! Well-known DS301 communication-profile indices.
//!
//! Named after `OD_ObjDicId_30x_t` in `original_source/301/CO_ODinterface.h`.
//! Not every index here is read by this crate's core (SRDO communication
//! parameters are storage-only, per spec.md Non-goals), but the full table is
//! carried so applications building an OD table have the same vocabulary
//! CANopenNode does.

pub const DEVICE_TYPE: u16 = 0x1000;
pub const ERROR_REGISTER: u16 = 0x1001;
pub const PREDEFINED_ERROR_FIELD: u16 = 0x1003;
pub const COB_ID_SYNC_MESSAGE: u16 = 0x1005;
pub const COMMUNICATION_CYCLE_PERIOD: u16 = 0x1006;
pub const SYNCHRONOUS_WINDOW_LENGTH: u16 = 0x1007;
pub const MANUFACTURER_DEVICE_NAME: u16 = 0x1008;
pub const MANUFACTURER_HARDWARE_VERSION: u16 = 0x1009;
pub const MANUFACTURER_SOFTWARE_VERSION: u16 = 0x100A;
pub const GUARD_TIME: u16 = 0x100C;
pub const LIFE_TIME_FACTOR: u16 = 0x100D;
pub const STORE_PARAMETERS: u16 = 0x1010;
pub const RESTORE_DEFAULT_PARAMETERS: u16 = 0x1011;
pub const COB_ID_TIME_STAMP: u16 = 0x1012;
pub const HIGH_RESOLUTION_TIME_STAMP: u16 = 0x1013;
pub const COB_ID_EMERGENCY: u16 = 0x1014;
pub const INHIBIT_TIME_EMERGENCY: u16 = 0x1015;
pub const CONSUMER_HEARTBEAT_TIME: u16 = 0x1016;
pub const PRODUCER_HEARTBEAT_TIME: u16 = 0x1017;
pub const IDENTITY_OBJECT: u16 = 0x1018;
pub const SYNC_COUNTER_OVERFLOW_VALUE: u16 = 0x1019;
pub const VERIFY_CONFIGURATION: u16 = 0x1020;
pub const ERROR_BEHAVIOR: u16 = 0x1029;
pub const SDO_SERVER_PARAMETER: u16 = 0x1200;
pub const SDO_CLIENT_PARAMETER: u16 = 0x1280;
pub const GFC_PARAMETER: u16 = 0x1300;
pub const SRDO_1_COMMUNICATION_PARAMETER: u16 = 0x1301;
pub const SRDO_1_MAPPING_PARAMETER: u16 = 0x1381;
pub const SRDO_VALID: u16 = 0x13FE;
pub const SRDO_CHECKSUM: u16 = 0x13FF;
pub const RPDO_1_COMMUNICATION_PARAMETER: u16 = 0x1400;
pub const RPDO_4_COMMUNICATION_PARAMETER: u16 = 0x1403;
pub const RPDO_1_MAPPING_PARAMETER: u16 = 0x1600;
pub const RPDO_4_MAPPING_PARAMETER: u16 = 0x1603;
pub const TPDO_1_COMMUNICATION_PARAMETER: u16 = 0x1800;
pub const TPDO_4_COMMUNICATION_PARAMETER: u16 = 0x1803;
pub const TPDO_1_MAPPING_PARAMETER: u16 = 0x1A00;
pub const TPDO_4_MAPPING_PARAMETER: u16 = 0x1A03;

/// Dummy-mapping filler indices usable in a PDO mapping entry instead of a
/// real OD sub-entry (CiA301 §7.4.7, `CO_PDO.c`'s dummy-mapping table).
pub const DUMMY_BOOLEAN: u16 = 0x0001;
pub const DUMMY_INTEGER8: u16 = 0x0002;
pub const DUMMY_INTEGER16: u16 = 0x0004;
pub const DUMMY_INTEGER32: u16 = 0x0005;
pub const DUMMY_UNSIGNED8: u16 = 0x0006;
pub const DUMMY_UNSIGNED16: u16 = 0x0007;
