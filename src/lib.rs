//! # canopen-node
//!
//! A CANopen (CiA 301/304/305) protocol stack for a single node: Object
//! Dictionary, NMT state machine and Heartbeat producer/consumer, Emergency
//! protocol, SYNC, TIME, PDO mapping and transmission, Node Guarding, the
//! Global Failsafe Command, and LSS slave/master identification.
//!
//! The crate never opens a CAN socket on its own; applications hand it a
//! [`driver::CanBus`] implementation (a real one backed by `socketcan`, or
//! [`driver::LoopbackBus`] for tests) and drive [`node::Node::process`] from
//! their own event loop. SDO transfer itself is out of scope: the Object
//! Dictionary's segmented read/write and abort-code mapping are implemented
//! so that an application-supplied SDO server can sit on top of them, but no
//! SDO server is shipped here.

pub mod driver;
pub mod emcy;
pub mod enums;
pub mod error;
pub mod frame;
pub mod hb_consumer;
pub mod nmt;
pub mod node;
pub mod od;
pub mod sync;
pub mod time;

#[cfg(any(feature = "rpdo", feature = "tpdo"))]
pub mod pdo;

#[cfg(feature = "node-guarding")]
pub mod node_guard;

#[cfg(feature = "gfc")]
pub mod gfc;

#[cfg(feature = "lss-slave")]
pub mod lss_slave;

#[cfg(feature = "lss-master")]
pub mod lss_master;

pub use driver::{CanBus, CanErrorStatus, LoopbackBus};
#[cfg(feature = "socketcan")]
pub use driver::SocketCanBus;
pub use error::{CanOpenError, InitError};
pub use frame::CanFrame;
pub use node::{Node, NodeConfig, NextWakeup, RuntimeSignal};
pub use od::ObjectDictionary;
