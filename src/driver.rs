//! CAN driver interface (component A, external per spec.md §1/§6).
//!
//! The core never talks to a kernel socket directly; every subsystem sends
//! and receives through the [`CanBus`] trait, grounded in the original
//! `CO_CANmodule_t`/`CO_CANrxBufferInit`/`CO_CANtxBufferInit`/`CO_CANsend`
//! triad (`original_source/socketCAN/CO_driver.c`) but collapsed onto a
//! single trait object instead of per-buffer indirect calls, since this
//! crate's subsystems poll their own COB-IDs directly rather than relying on
//! a hardware filter bank.

use bitflags::bitflags;

use crate::error::CanOpenError;
use crate::frame::CanFrame;

bitflags! {
    /// `CO_CAN_ERR_status_t` equivalent (`original_source/socketCAN/CO_error.h`):
    /// aggregate CAN controller error-status bits that [`crate::emcy`] polls
    /// once per `process` tick.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct CanErrorStatus: u16 {
        const TX_WARNING  = 0x0001;
        const TX_PASSIVE  = 0x0002;
        const TX_BUS_OFF  = 0x0004;
        const TX_OVERFLOW = 0x0008;
        const TX_PDO_LATE = 0x0010;
        const RX_WARNING  = 0x0020;
        const RX_PASSIVE  = 0x0040;
        const RX_OVERFLOW = 0x0080;
    }
}

/// Transport-agnostic CAN bus handle every subsystem sends/receives through.
///
/// `send` must be non-blocking: a full transmit queue is reported back as
/// [`CanOpenError::Connection`] (mirroring `CO_ERROR_TX_BUSY`/"queue full,
/// retry" from spec.md §6) and the caller retries on the next `process` tick
/// rather than waiting. `try_recv` drains at most one frame per call; the
/// runtime calls it in a loop until it returns `None`.
pub trait CanBus {
    fn send(&self, frame: &CanFrame) -> Result<(), CanOpenError>;
    fn try_recv(&self) -> Result<Option<CanFrame>, CanOpenError>;
    fn error_status(&self) -> CanErrorStatus;
}

#[cfg(feature = "socketcan")]
mod socketcan_impl {
    use super::*;
    use socketcan::{CanFrame as SckFrame, EmbeddedFrame, Frame, Id, Socket, StandardId};
    use std::sync::Mutex;

    /// Linux SocketCAN binding, continuing the teacher crate's only runtime
    /// dependency. A real interface (or `vcan0`) is required; this type is
    /// not used by the crate's own test suite (spec.md §2 "ambient stack" —
    /// tests synthesize frames directly instead).
    pub struct SocketCanBus {
        socket: Mutex<socketcan::CanSocket>,
    }

    impl SocketCanBus {
        pub fn open(interface: &str) -> Result<Self, CanOpenError> {
            let socket = socketcan::CanSocket::open(interface)
                .map_err(|e| CanOpenError::Connection(e.to_string()))?;
            socket
                .set_nonblocking(true)
                .map_err(|e| CanOpenError::Connection(e.to_string()))?;
            Ok(Self {
                socket: Mutex::new(socket),
            })
        }
    }

    impl CanBus for SocketCanBus {
        fn send(&self, frame: &CanFrame) -> Result<(), CanOpenError> {
            let id = StandardId::new(frame.id())
                .ok_or_else(|| CanOpenError::Overflow(format!("{:#x}", frame.id())))?;
            let sck = if frame.is_rtr() {
                SckFrame::new_remote(Id::Standard(id), frame.data().len())
                    .ok_or_else(|| CanOpenError::BadMessage("dlc too long".into()))?
            } else {
                SckFrame::new(Id::Standard(id), frame.data())
                    .ok_or_else(|| CanOpenError::BadMessage("payload too long".into()))?
            };
            self.socket
                .lock()
                .expect("socket mutex poisoned")
                .write_frame(&sck)
                .map_err(|e| CanOpenError::Connection(e.to_string()))
        }

        fn try_recv(&self) -> Result<Option<CanFrame>, CanOpenError> {
            let socket = self.socket.lock().expect("socket mutex poisoned");
            match socket.read_frame() {
                Ok(frame) => {
                    let Id::Standard(sid) = frame.id() else {
                        return Err(CanOpenError::CanVersion(
                            "got extended (29-bit) id, CANopen only uses standard".into(),
                        ));
                    };
                    if frame.is_remote_frame() {
                        Ok(Some(CanFrame::new_rtr(sid.as_raw(), frame.dlc() as u8)?))
                    } else {
                        Ok(Some(CanFrame::new(sid.as_raw(), frame.data())?))
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
                Err(e) => Err(CanOpenError::Io(e)),
            }
        }

        fn error_status(&self) -> CanErrorStatus {
            // Real bus-state observation requires reading the controller's
            // error counters via a netlink query; out of scope for this
            // crate's core (spec.md §1, "bus-error counters" is external).
            CanErrorStatus::empty()
        }
    }
}

#[cfg(feature = "socketcan")]
pub use socketcan_impl::SocketCanBus;

/// In-memory [`CanBus`] used by this crate's own tests and by applications
/// that want to drive the stack without a kernel socket.
#[derive(Default)]
pub struct LoopbackBus {
    inner: std::sync::Mutex<LoopbackInner>,
}

#[derive(Default)]
struct LoopbackInner {
    rx: std::collections::VecDeque<CanFrame>,
    tx: Vec<CanFrame>,
    error_status: CanErrorStatus,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame as if it had just arrived on the bus.
    pub fn inject(&self, frame: CanFrame) {
        self.inner
            .lock()
            .expect("loopback mutex poisoned")
            .rx
            .push_back(frame);
    }

    /// Drain every frame the node has sent so far.
    pub fn take_sent(&self) -> Vec<CanFrame> {
        std::mem::take(&mut self.inner.lock().expect("loopback mutex poisoned").tx)
    }

    pub fn set_error_status(&self, status: CanErrorStatus) {
        self.inner.lock().expect("loopback mutex poisoned").error_status = status;
    }
}

impl CanBus for LoopbackBus {
    fn send(&self, frame: &CanFrame) -> Result<(), CanOpenError> {
        self.inner
            .lock()
            .expect("loopback mutex poisoned")
            .tx
            .push(*frame);
        Ok(())
    }

    fn try_recv(&self) -> Result<Option<CanFrame>, CanOpenError> {
        Ok(self.inner.lock().expect("loopback mutex poisoned").rx.pop_front())
    }

    fn error_status(&self) -> CanErrorStatus {
        self.inner.lock().expect("loopback mutex poisoned").error_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_round_trips_sent_frames() {
        let bus = LoopbackBus::new();
        bus.send(&CanFrame::new(0x123, &[1, 2, 3]).unwrap()).unwrap();
        let sent = bus.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id(), 0x123);
    }

    #[test]
    fn loopback_delivers_injected_frames_in_order() {
        let bus = LoopbackBus::new();
        bus.inject(CanFrame::new(0x1, &[]).unwrap());
        bus.inject(CanFrame::new(0x2, &[]).unwrap());
        assert_eq!(bus.try_recv().unwrap().unwrap().id(), 0x1);
        assert_eq!(bus.try_recv().unwrap().unwrap().id(), 0x2);
        assert!(bus.try_recv().unwrap().is_none());
    }
}
