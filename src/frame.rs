//! Wire-format CAN frames for every CANopen protocol this crate implements.
//!
//! Continues the teacher crate's `FrameRW` approach (binrw-based encode/decode
//! against an 8-byte CAN payload) but targets the transport-agnostic
//! [`CanFrame`] instead of `socketcan::CanFrame` directly, so the protocol
//! layer never depends on a kernel socket (see [`crate::driver`]).

use binrw::{binrw, BinRead, BinWrite};
use std::io::Cursor;

use crate::enums::{EmergencyErrorCode, EmergencyErrorRegister};
use crate::error::CanOpenError;

pub const COB_ID_NMT: u16 = 0x000;
pub const COB_ID_SYNC: u16 = 0x080;
pub const COB_ID_EMCY_BASE: u16 = 0x080;
pub const COB_ID_TIME: u16 = 0x100;
pub const COB_ID_TPDO1: u16 = 0x180;
pub const COB_ID_RPDO1: u16 = 0x200;
pub const COB_ID_TPDO2: u16 = 0x280;
pub const COB_ID_RPDO2: u16 = 0x300;
pub const COB_ID_TPDO3: u16 = 0x380;
pub const COB_ID_RPDO3: u16 = 0x400;
pub const COB_ID_TPDO4: u16 = 0x480;
pub const COB_ID_RPDO4: u16 = 0x500;
pub const COB_ID_GUARD_BASE: u16 = 0x700;
pub const COB_ID_LSS_MASTER: u16 = 0x7E5;
pub const COB_ID_LSS_SLAVE: u16 = 0x7E4;

/// A transport-agnostic CAN frame: standard 11-bit ID plus up to 8 payload
/// bytes, or a remote-transmission-request of a given DLC. CANopen never
/// needs the extended (29-bit) ID; Node Guarding is the one protocol here
/// that needs the RTR bit (CiA301 §7.2.8.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanFrame {
    id: u16,
    len: u8,
    data: [u8; 8],
    rtr: bool,
}

impl CanFrame {
    pub fn new(id: u16, data: &[u8]) -> Result<Self, CanOpenError> {
        if data.len() > 8 {
            return Err(CanOpenError::Overflow(format!(
                "{} data bytes, max is 8",
                data.len()
            )));
        }
        let mut buf = [0u8; 8];
        buf[..data.len()].copy_from_slice(data);
        Ok(Self {
            id,
            len: data.len() as u8,
            data: buf,
            rtr: false,
        })
    }

    pub fn new_rtr(id: u16, dlc: u8) -> Result<Self, CanOpenError> {
        if dlc > 8 {
            return Err(CanOpenError::Overflow(format!("{dlc} dlc, max is 8")));
        }
        Ok(Self {
            id,
            len: dlc,
            data: [0u8; 8],
            rtr: true,
        })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn is_rtr(&self) -> bool {
        self.rtr
    }
}

/// Frames that can round-trip to/from the wire. Mirrors the teacher's
/// `FrameRW`, generalized off `socketcan::CanFrame` onto [`CanFrame`].
pub trait FrameCodec: Sized {
    fn encode(&self) -> CanFrame;
    fn decode(frame: &CanFrame) -> Result<Self, CanOpenError>;
}

fn bad(what: &str, err: impl std::fmt::Display) -> CanOpenError {
    CanOpenError::Parse(format!("{what}: {err}"))
}

#[binrw]
#[brw(little)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nmt {
    pub command: NmtCommand,
    pub target_node: u8,
}

#[binrw]
#[br(repr(u8))]
#[bw(repr(u8))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NmtCommand {
    EnterOperational = 0x01,
    EnterStop = 0x02,
    EnterPreOperational = 0x80,
    ResetNode = 0x81,
    ResetCommunication = 0x82,
}

impl FrameCodec for Nmt {
    fn decode(frame: &CanFrame) -> Result<Self, CanOpenError> {
        if frame.id() != COB_ID_NMT {
            return Err(CanOpenError::BadMessage("NMT".into()));
        }
        Self::read(&mut Cursor::new(frame.data())).map_err(|e| bad("NMT", e))
    }

    fn encode(&self) -> CanFrame {
        let mut buf = Vec::with_capacity(2);
        self.write(&mut Cursor::new(&mut buf)).expect("fixed-size NMT write");
        CanFrame::new(COB_ID_NMT, &buf).expect("NMT payload is 2 bytes")
    }
}

/// SYNC carries no payload by default; CiA301 allows an optional 1-byte
/// counter when the producer's OD 0x1019 sub 0 is non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sync {
    pub counter: Option<u8>,
}

impl FrameCodec for Sync {
    fn decode(frame: &CanFrame) -> Result<Self, CanOpenError> {
        if frame.id() != COB_ID_SYNC {
            return Err(CanOpenError::BadMessage("SYNC".into()));
        }
        match frame.data().len() {
            0 => Ok(Sync { counter: None }),
            1 => Ok(Sync {
                counter: Some(frame.data()[0]),
            }),
            n => Err(CanOpenError::BadMessage(format!(
                "SYNC payload should be 0 or 1 bytes, got {n}"
            ))),
        }
    }

    fn encode(&self) -> CanFrame {
        let data: &[u8] = match &self.counter {
            Some(c) => std::slice::from_ref(c),
            None => &[],
        };
        CanFrame::new(COB_ID_SYNC, data).expect("SYNC payload is 0 or 1 bytes")
    }
}

/// TIME-OF-DAY stamp: CiA301 §7.2.6. Milliseconds since local midnight (28
/// bits) plus days since 1984-01-01 (16 bits), both little-endian.
#[binrw]
#[brw(little)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeOfDay {
    ms_bits: u32,
    pub days: u16,
}

impl TimeOfDay {
    pub fn new(ms_since_midnight: u32, days: u16) -> Self {
        Self {
            ms_bits: ms_since_midnight & 0x0FFF_FFFF,
            days,
        }
    }

    pub fn ms_since_midnight(&self) -> u32 {
        self.ms_bits & 0x0FFF_FFFF
    }
}

impl FrameCodec for TimeOfDay {
    fn decode(frame: &CanFrame) -> Result<Self, CanOpenError> {
        if frame.id() != COB_ID_TIME {
            return Err(CanOpenError::BadMessage("TIME".into()));
        }
        Self::read(&mut Cursor::new(frame.data())).map_err(|e| bad("TIME", e))
    }

    fn encode(&self) -> CanFrame {
        let mut buf = Vec::with_capacity(6);
        self.write(&mut Cursor::new(&mut buf)).expect("fixed-size TIME write");
        CanFrame::new(COB_ID_TIME, &buf).expect("TIME payload is 6 bytes")
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emergency {
    #[brw(ignore)]
    pub node_id: u8,

    #[br(temp)]
    #[bw(calc = error_code.encode())]
    error_code_raw: u16,

    #[br(calc = EmergencyErrorCode::decode(error_code_raw))]
    #[bw(ignore)]
    pub error_code: EmergencyErrorCode,

    #[br(temp)]
    #[bw(calc = error_register.bits())]
    error_register_raw: u8,

    #[br(calc = EmergencyErrorRegister::from_bits_truncate(error_register_raw))]
    #[bw(ignore)]
    pub error_register: EmergencyErrorRegister,

    /// Index of the error condition that triggered this message (`errorBit`
    /// in spec.md §4.2/§6 — byte 3 of the wire frame).
    pub error_bit: u8,

    /// Application-supplied informative argument to `error()` (byte 4..7,
    /// little-endian on the wire per §6's frame-format table).
    pub info_code: u32,
}

impl Emergency {
    pub fn new(
        node_id: u8,
        error_code: EmergencyErrorCode,
        error_register: EmergencyErrorRegister,
        error_bit: u8,
        info_code: u32,
    ) -> Self {
        Self {
            node_id,
            error_code,
            error_register,
            error_bit,
            info_code,
        }
    }
}

impl FrameCodec for Emergency {
    fn decode(frame: &CanFrame) -> Result<Self, CanOpenError> {
        let id = frame.id();
        if !(0x081..=0x0FF).contains(&id) {
            return Err(CanOpenError::BadMessage("EMCY".into()));
        }
        if frame.data().len() != 8 {
            return Err(CanOpenError::Parse(
                "EMCY frame must carry exactly 8 bytes".into(),
            ));
        }
        let mut msg =
            Self::read(&mut Cursor::new(frame.data())).map_err(|e| bad("EMCY", e))?;
        msg.node_id = (id - COB_ID_EMCY_BASE) as u8;
        Ok(msg)
    }

    fn encode(&self) -> CanFrame {
        let mut buf = Vec::with_capacity(8);
        self.write(&mut Cursor::new(&mut buf)).expect("fixed-size EMCY write");
        CanFrame::new(COB_ID_EMCY_BASE + self.node_id as u16, &buf)
            .expect("EMCY payload is 8 bytes")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NmtState {
    Initializing = 0x00,
    Stopped = 0x04,
    Operational = 0x05,
    PreOperational = 0x7F,
}

impl TryFrom<u8> for NmtState {
    type Error = CanOpenError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Initializing),
            0x04 => Ok(Self::Stopped),
            0x05 => Ok(Self::Operational),
            0x7F => Ok(Self::PreOperational),
            other => Err(CanOpenError::Parse(format!(
                "{other:#x} is not a valid NMT state"
            ))),
        }
    }
}

/// Node Guarding response / Heartbeat payload: state byte with the toggle bit
/// folded into bit 7 for Node Guarding responses (the toggle is unused, fixed
/// at 0, for Heartbeat producer frames — see spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    pub node_id: u8,
    pub toggle: bool,
    pub state: NmtState,
}

impl Guard {
    pub fn new(node_id: u8, toggle: bool, state: NmtState) -> Self {
        Self {
            node_id,
            toggle,
            state,
        }
    }
}

impl FrameCodec for Guard {
    fn decode(frame: &CanFrame) -> Result<Self, CanOpenError> {
        let id = frame.id();
        if !(COB_ID_GUARD_BASE..=COB_ID_GUARD_BASE + 0x7F).contains(&id) {
            return Err(CanOpenError::BadMessage("Guard/Heartbeat".into()));
        }
        let data = frame.data();
        if data.is_empty() {
            return Err(CanOpenError::Parse("Guard/Heartbeat frame is empty".into()));
        }
        let raw = data[0];
        Ok(Guard {
            node_id: (id - COB_ID_GUARD_BASE) as u8,
            toggle: raw & 0x80 != 0,
            state: NmtState::try_from(raw & 0x7F)?,
        })
    }

    fn encode(&self) -> CanFrame {
        let raw = (self.state as u8) | ((self.toggle as u8) << 7);
        CanFrame::new(COB_ID_GUARD_BASE + self.node_id as u16, &[raw])
            .expect("Guard payload is 1 byte")
    }
}

/// Global Failsafe Command: a single fixed zero-length frame at COB-ID 0x01.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gfc;

pub const COB_ID_GFC: u16 = 0x001;

impl FrameCodec for Gfc {
    fn decode(frame: &CanFrame) -> Result<Self, CanOpenError> {
        if frame.id() != COB_ID_GFC {
            return Err(CanOpenError::BadMessage("GFC".into()));
        }
        if !frame.data().is_empty() {
            return Err(CanOpenError::Parse("GFC payload must be empty".into()));
        }
        Ok(Gfc)
    }

    fn encode(&self) -> CanFrame {
        CanFrame::new(COB_ID_GFC, &[]).expect("GFC payload is empty")
    }
}

/// Raw LSS frame: command specifier byte plus 7 data bytes, interpreted
/// per-command by [`crate::lss`]. LSS messages don't share one field layout
/// (fastscan uses a 32-bit id-number plus three single-byte fields; plain
/// switch/configure commands use different shapes), so this stays untyped
/// the way the original's `CO_LSS_Address_t` union does, and the lss module
/// reads/writes the 7-byte window directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LssFrame {
    pub from_master: bool,
    pub cs: u8,
    pub payload: [u8; 7],
}

impl LssFrame {
    pub fn new(from_master: bool, cs: u8, payload: [u8; 7]) -> Self {
        Self {
            from_master,
            cs,
            payload,
        }
    }
}

impl FrameCodec for LssFrame {
    fn decode(frame: &CanFrame) -> Result<Self, CanOpenError> {
        let from_master = match frame.id() {
            COB_ID_LSS_MASTER => true,
            COB_ID_LSS_SLAVE => false,
            _ => return Err(CanOpenError::BadMessage("LSS".into())),
        };
        let data = frame.data();
        if data.len() != 8 {
            return Err(CanOpenError::Parse("LSS frame must carry 8 bytes".into()));
        }
        let mut payload = [0u8; 7];
        payload.copy_from_slice(&data[1..8]);
        Ok(LssFrame {
            from_master,
            cs: data[0],
            payload,
        })
    }

    fn encode(&self) -> CanFrame {
        let mut data = [0u8; 8];
        data[0] = self.cs;
        data[1..8].copy_from_slice(&self.payload);
        let id = if self.from_master {
            COB_ID_LSS_MASTER
        } else {
            COB_ID_LSS_SLAVE
        };
        CanFrame::new(id, &data).expect("LSS payload is 8 bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nmt_round_trips() {
        let nmt = Nmt {
            command: NmtCommand::ResetCommunication,
            target_node: 5,
        };
        let frame = nmt.encode();
        assert_eq!(frame.id(), COB_ID_NMT);
        let back = Nmt::decode(&frame).unwrap();
        assert_eq!(back.command, NmtCommand::ResetCommunication);
        assert_eq!(back.target_node, 5);
    }

    #[test]
    fn sync_with_and_without_counter() {
        let plain = Sync { counter: None }.encode();
        assert!(plain.data().is_empty());
        let counted = Sync { counter: Some(7) }.encode();
        assert_eq!(counted.data(), &[7]);
        assert_eq!(Sync::decode(&counted).unwrap().counter, Some(7));
    }

    #[test]
    fn emergency_round_trips_node_id_via_cob_id() {
        let emcy = Emergency::new(
            12,
            EmergencyErrorCode::CommunicationCanOverrun,
            EmergencyErrorRegister::COMMUNICATION,
            0x03,
            0xDEAD_BEEF,
        );
        let frame = emcy.encode();
        assert_eq!(frame.id(), 0x080 + 12);
        let back = Emergency::decode(&frame).unwrap();
        assert_eq!(back.node_id, 12);
        assert_eq!(back.error_code, EmergencyErrorCode::CommunicationCanOverrun);
        assert_eq!(back.error_bit, 0x03);
        assert_eq!(back.info_code, 0xDEAD_BEEF);
    }

    #[test]
    fn guard_toggle_bit_is_independent_of_state() {
        let g = Guard::new(3, true, NmtState::Operational);
        let frame = g.encode();
        assert_eq!(frame.data(), &[0x85]);
        let back = Guard::decode(&frame).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn lss_frame_splits_cs_and_payload() {
        let frame = LssFrame::new(true, 0x51, [1, 2, 3, 4, 5, 6, 7]).encode();
        assert_eq!(frame.id(), COB_ID_LSS_MASTER);
        let back = LssFrame::decode(&frame).unwrap();
        assert_eq!(back.cs, 0x51);
        assert_eq!(back.payload, [1, 2, 3, 4, 5, 6, 7]);
    }
}
