//! Emergency protocol (component C, spec.md §4.2), grounded in
//! `original_source/301/CO_Emergency.{h,c}`.

use std::sync::Mutex;

use crate::driver::{CanBus, CanErrorStatus};
use crate::enums::{EmergencyErrorCode, EmergencyErrorRegister};
use crate::error::CanOpenError;
use crate::frame::{Emergency, FrameCodec};

/// `CO_CONFIG_EM_ERR_STATUS_BITS_COUNT`. spec.md §9's Design Notes open
/// question flags this as build-configurable (48..256 bits) across the
/// original's variants; this crate fixes it at the spec's mandated minimum.
pub const ERR_STATUS_BITS_COUNT: usize = 80;
const ERR_STATUS_BYTES: usize = ERR_STATUS_BITS_COUNT / 8;

/// `CO_EM_errorStatusBits_t` — only the bits this crate's core itself raises
/// are named; manufacturer-specific bits start at 0x30 and run to the end of
/// [`ERR_STATUS_BITS_COUNT`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorBit {
    CanBusWarning = 0x01,
    RxMsgWrongLength = 0x02,
    RxMsgOverflow = 0x03,
    RpdoWrongLength = 0x04,
    RpdoOverflow = 0x05,
    CanRxBusPassive = 0x06,
    CanTxBusPassive = 0x07,
    NmtWrongCommand = 0x08,
    TimeTimeout = 0x09,
    CanTxBusOff = 0x12,
    CanRxbOverflow = 0x13,
    CanTxOverflow = 0x14,
    TpdoOutsideWindow = 0x15,
    RpdoTimeOut = 0x17,
    SyncTimeOut = 0x18,
    SyncLength = 0x19,
    PdoWrongMapping = 0x1A,
    HeartbeatConsumer = 0x1B,
    HbConsumerRemoteReset = 0x1C,
    EmergencyBufferFull = 0x20,
    WrongErrorReport = 0x28,
}

/// `CO_EM_fifo_t`: one pending/history emergency record, held in host-native
/// fields (the original's `CO_SWAP_16`/`CO_SWAP_32` dance is a C
/// byte-order-portability trick for a raw `memcpy` into the CAN buffer;
/// [`crate::frame::Emergency`] already encodes little-endian explicitly via
/// `binrw`, so no extra swap is needed here).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct FifoEntry {
    error_code: u16,
    error_bit: u8,
    info_code: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Overflow {
    Ok,
    Pending,
    Latched,
}

struct FifoState {
    entries: Vec<FifoEntry>,
    write: usize,
    postprocess: usize,
    count: usize,
    overflow: Overflow,
}

impl FifoState {
    fn new(capacity: usize) -> Self {
        Self {
            entries: vec![FifoEntry::default(); capacity.max(2)],
            write: 0,
            postprocess: 0,
            count: 0,
            overflow: Overflow::Ok,
        }
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn push(&mut self, entry: FifoEntry) {
        let next = (self.write + 1) % self.capacity();
        if next == self.postprocess {
            self.overflow = Overflow::Pending;
            return;
        }
        self.entries[self.write] = entry;
        self.write = next;
        self.count += 1;
    }

    fn pop_for_tx(&mut self) -> Option<FifoEntry> {
        if self.postprocess == self.write {
            return None;
        }
        let entry = self.entries[self.postprocess];
        self.postprocess = (self.postprocess + 1) % self.capacity();
        Some(entry)
    }

    /// Most-recent-first iteration for OD 0x1003 readout.
    fn history(&self) -> Vec<FifoEntry> {
        let cap = self.capacity();
        let mut out = Vec::with_capacity(self.count);
        let mut i = (self.write + cap - 1) % cap;
        for _ in 0..self.count {
            out.push(self.entries[i]);
            i = (i + cap - 1) % cap;
        }
        out
    }

    fn clear_history(&mut self) {
        self.write = 0;
        self.postprocess = 0;
        self.count = 0;
    }
}

type RxCallback = Box<dyn Fn(u8, EmergencyErrorCode, EmergencyErrorRegister, u8, u32) + Send + Sync>;

/// Emergency (EMCY) protocol state: error-status bitfield, FIFO, producer
/// inhibit timer, and consumer callback.
pub struct Emcy {
    node_id: u8,
    inhibit_time_us: Mutex<u32>,
    inhibit_timer_us: Mutex<u32>,
    producer_enabled: bool,
    error_status_bits: Mutex<[u8; ERR_STATUS_BYTES]>,
    error_register: Mutex<EmergencyErrorRegister>,
    fifo: Mutex<FifoState>,
    rx_callback: Mutex<Option<RxCallback>>,
    prev_can_error_status: Mutex<CanErrorStatus>,
}

impl Emcy {
    pub fn new(node_id: u8, fifo_capacity: usize, producer_enabled: bool) -> Self {
        Self {
            node_id,
            inhibit_time_us: Mutex::new(0),
            inhibit_timer_us: Mutex::new(0),
            producer_enabled,
            error_status_bits: Mutex::new([0u8; ERR_STATUS_BYTES]),
            error_register: Mutex::new(EmergencyErrorRegister::empty()),
            fifo: Mutex::new(FifoState::new(fifo_capacity)),
            rx_callback: Mutex::new(None),
            prev_can_error_status: Mutex::new(CanErrorStatus::empty()),
        }
    }

    /// `OD 0x1015` write: stores the inhibit time (×100µs) and resets the
    /// timer, per spec.md §4.2.
    pub fn set_inhibit_time(&self, time_100us: u16) {
        *self.inhibit_time_us.lock().expect("emcy mutex poisoned") = time_100us as u32 * 100;
        *self.inhibit_timer_us.lock().expect("emcy mutex poisoned") = 0;
    }

    pub fn set_rx_callback(&self, callback: RxCallback) {
        *self.rx_callback.lock().expect("emcy mutex poisoned") = Some(callback);
    }

    pub fn error_register(&self) -> EmergencyErrorRegister {
        *self.error_register.lock().expect("emcy mutex poisoned")
    }

    pub fn is_error(&self, bit: ErrorBit) -> bool {
        let (index, mask) = Self::bit_location(bit as u8);
        self.error_status_bits.lock().expect("emcy mutex poisoned")[index] & mask != 0
    }

    fn bit_location(error_bit: u8) -> (usize, u8) {
        let index = (error_bit >> 3) as usize;
        let mask = 1u8 << (error_bit & 0x7);
        (index, mask)
    }

    /// `CO_error`: the sole mutation entry point, callable from any thread.
    pub fn error(&self, set_error: bool, error_bit: u8, mut error_code: EmergencyErrorCode, mut info_code: u32) {
        let (mut index, mut mask) = Self::bit_location(error_bit);
        let mut reported_bit = error_bit;
        if index >= ERR_STATUS_BYTES {
            reported_bit = ErrorBit::WrongErrorReport as u8;
            (index, mask) = Self::bit_location(reported_bit);
            error_code = EmergencyErrorCode::InternalSoftware;
            info_code = error_bit as u32;
        }

        let mut bits = self.error_status_bits.lock().expect("emcy mutex poisoned");
        let was_set = bits[index] & mask != 0;
        if set_error == was_set {
            return;
        }
        if !set_error {
            error_code = EmergencyErrorCode::ErrorResetOrNoError;
        }
        if set_error {
            bits[index] |= mask;
        } else {
            bits[index] &= !mask;
        }
        drop(bits);

        let mut fifo = self.fifo.lock().expect("emcy mutex poisoned");
        fifo.push(FifoEntry {
            error_code: error_code.encode(),
            error_bit: reported_bit,
            info_code,
        });
    }

    pub fn error_enum(&self, set_error: bool, bit: ErrorBit, code: EmergencyErrorCode, info: u32) {
        self.error(set_error, bit as u8, code, info)
    }

    /// Recompute the 8-bit Error Register from the current status bits.
    /// Mirrors `CO_CONFIG_ERR_CONDITION_{GENERIC,COMMUNICATION,MANUFACTURER}`
    /// in `CO_Emergency.h`: generic uses byte 5 (bits 0x28..0x2F, the
    /// "software/internal" bucket), communication uses bytes 2-3 (bits
    /// 0x10..0x1F), manufacturer uses bytes 8-9 (bits 0x40..0x4F).
    fn recompute_register(&self) -> EmergencyErrorRegister {
        let bits = self.error_status_bits.lock().expect("emcy mutex poisoned");
        let mut reg = EmergencyErrorRegister::empty();
        if bits[5] != 0 {
            reg |= EmergencyErrorRegister::GENERIC;
        }
        if bits[2] != 0 || bits[3] != 0 {
            reg |= EmergencyErrorRegister::COMMUNICATION;
        }
        if ERR_STATUS_BYTES > 9 && (bits[8] != 0 || bits[9] != 0) {
            reg |= EmergencyErrorRegister::MANUFACTURER_SPECIFIC;
        }
        reg
    }

    /// Mainline `process`: CAN-error-status observation, error register
    /// recompute, FIFO drain/transmit, overflow state machine.
    pub fn process(&self, bus: &dyn CanBus, is_pre_or_operational: bool, dt_us: u32) -> Result<(), CanOpenError> {
        self.observe_can_error_status(bus);

        let reg = self.recompute_register();
        *self.error_register.lock().expect("emcy mutex poisoned") = reg;

        if !is_pre_or_operational || !self.producer_enabled {
            return Ok(());
        }

        {
            let mut inhibit_timer = self.inhibit_timer_us.lock().expect("emcy mutex poisoned");
            let inhibit_time = *self.inhibit_time_us.lock().expect("emcy mutex poisoned");
            if *inhibit_timer < inhibit_time {
                *inhibit_timer = inhibit_timer.saturating_add(dt_us);
            }
            if *inhibit_timer < inhibit_time {
                return Ok(());
            }
        }

        let mut fifo = self.fifo.lock().expect("emcy mutex poisoned");
        let Some(entry) = fifo.pop_for_tx() else {
            return Ok(());
        };
        *self.inhibit_timer_us.lock().expect("emcy mutex poisoned") = 0;

        let error_code = EmergencyErrorCode::decode(entry.error_code);
        let frame = Emergency::new(self.node_id, error_code, reg, entry.error_bit, entry.info_code);
        bus.send(&frame.encode())?;

        if let Some(cb) = self.rx_callback.lock().expect("emcy mutex poisoned").as_ref() {
            cb(0, error_code, reg, entry.error_bit, entry.info_code);
        }

        match fifo.overflow {
            Overflow::Pending => {
                fifo.overflow = Overflow::Latched;
                drop(fifo);
                self.error(true, ErrorBit::EmergencyBufferFull as u8, EmergencyErrorCode::GenericError, 0);
            }
            Overflow::Latched if fifo.postprocess == fifo.write => {
                fifo.overflow = Overflow::Ok;
                drop(fifo);
                self.error(false, ErrorBit::EmergencyBufferFull as u8, EmergencyErrorCode::ErrorResetOrNoError, 0);
            }
            _ => {}
        }
        Ok(())
    }

    /// Observes `bus.error_status()` transitions and raises/clears the
    /// matching error bit, per spec.md §4.2's bullet list.
    fn observe_can_error_status(&self, bus: &dyn CanBus) {
        let current = bus.error_status();
        let mut prev = self.prev_can_error_status.lock().expect("emcy mutex poisoned");
        let changed = current ^ *prev;
        if changed.contains(CanErrorStatus::TX_WARNING) || changed.contains(CanErrorStatus::RX_WARNING) {
            let warn = current.intersects(CanErrorStatus::TX_WARNING | CanErrorStatus::RX_WARNING);
            self.error_enum(warn, ErrorBit::CanBusWarning, EmergencyErrorCode::CommunicationCanOverrun, 0);
        }
        if changed.contains(CanErrorStatus::TX_PASSIVE) {
            self.error_enum(
                current.contains(CanErrorStatus::TX_PASSIVE),
                ErrorBit::CanTxBusPassive,
                EmergencyErrorCode::CommunicationErrorPassiveMode,
                0,
            );
        }
        if changed.contains(CanErrorStatus::RX_PASSIVE) {
            self.error_enum(
                current.contains(CanErrorStatus::RX_PASSIVE),
                ErrorBit::CanRxBusPassive,
                EmergencyErrorCode::CommunicationErrorPassiveMode,
                0,
            );
        }
        if changed.contains(CanErrorStatus::TX_BUS_OFF) {
            self.error_enum(
                current.contains(CanErrorStatus::TX_BUS_OFF),
                ErrorBit::CanTxBusOff,
                EmergencyErrorCode::CommunicationRecoveredBusOff,
                0,
            );
        }
        if changed.contains(CanErrorStatus::TX_OVERFLOW) {
            self.error_enum(
                current.contains(CanErrorStatus::TX_OVERFLOW),
                ErrorBit::CanTxOverflow,
                EmergencyErrorCode::CommunicationCanOverrun,
                0,
            );
        }
        if changed.contains(CanErrorStatus::RX_OVERFLOW) {
            self.error_enum(
                current.contains(CanErrorStatus::RX_OVERFLOW),
                ErrorBit::CanRxbOverflow,
                EmergencyErrorCode::CommunicationCanOverrun,
                0,
            );
        }
        *prev = current;
    }

    /// OD 0x1003 readout support: most-recent-first `(errorCode, errorBit,
    /// infoCode)` history for extension wiring.
    pub fn history(&self) -> Vec<(u16, u8, u32)> {
        self.fifo
            .lock()
            .expect("emcy mutex poisoned")
            .history()
            .into_iter()
            .map(|e| (e.error_code, e.error_bit, e.info_code))
            .collect()
    }

    pub fn clear_history(&self) {
        self.fifo.lock().expect("emcy mutex poisoned").clear_history();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LoopbackBus;

    #[test]
    fn duplicate_error_report_appends_once() {
        let emcy = Emcy::new(0x05, 8, true);
        emcy.error(true, 0x01, EmergencyErrorCode::Communication, 1);
        emcy.error(true, 0x01, EmergencyErrorCode::Communication, 1);
        assert_eq!(emcy.history().len(), 1);
    }

    #[test]
    fn set_then_clear_then_set_appends_three_times() {
        let emcy = Emcy::new(0x05, 8, true);
        emcy.error(true, 0x01, EmergencyErrorCode::Communication, 0);
        emcy.error(false, 0x01, EmergencyErrorCode::Communication, 0);
        emcy.error(true, 0x01, EmergencyErrorCode::Communication, 0);
        assert_eq!(emcy.history().len(), 3);
    }

    #[test]
    fn producer_sends_frame_with_correct_wire_layout() {
        // Concrete scenario 2 (spec.md §8): node-ID 0x05, inhibit 0.
        let emcy = Emcy::new(0x05, 8, true);
        let bus = LoopbackBus::new();
        emcy.error(true, 0x01, EmergencyErrorCode::Communication, 1);
        emcy.process(&bus, true, 0).unwrap();
        let sent = bus.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id(), 0x085);
        let data = sent[0].data();
        assert_eq!(&data[0..2], &[0x00, 0x81]);
        assert_eq!(data[3], 0x01);
        assert_eq!(&data[4..8], &[1, 0, 0, 0]);
    }

    #[test]
    fn wrong_error_bit_is_redirected() {
        let emcy = Emcy::new(0x01, 8, true);
        emcy.error(true, 200, EmergencyErrorCode::GenericError, 7);
        assert!(emcy.is_error(ErrorBit::WrongErrorReport));
    }

    #[test]
    fn fifo_overflow_self_heals() {
        // Capacity 3 (usable 2): two real errors fill the FIFO, a third
        // triggers PENDING on push; draining it surfaces
        // EMERGENCY_BUFFER_FULL until the FIFO is fully drained.
        let emcy = Emcy::new(0x01, 3, true);
        let bus = LoopbackBus::new();
        emcy.error(true, 0x01, EmergencyErrorCode::Communication, 0);
        emcy.error(true, 0x02, EmergencyErrorCode::Communication, 0);
        emcy.error(true, 0x03, EmergencyErrorCode::Communication, 0);
        emcy.process(&bus, true, 0).unwrap();
        emcy.process(&bus, true, 0).unwrap();
        assert!(emcy.is_error(ErrorBit::EmergencyBufferFull));
        emcy.process(&bus, true, 0).unwrap();
        assert!(!emcy.is_error(ErrorBit::EmergencyBufferFull));
    }
}
