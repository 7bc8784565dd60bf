//! Cross-module integration tests driven entirely through `Node`'s public
//! API. Unlike the `#[cfg(test)]` suites beside each subsystem module (which
//! exercise that subsystem's mechanics directly), these drive a whole `Node`
//! through `LoopbackBus` the way an application's own event loop would, and
//! observe only what a real application could observe: the frames sent on
//! the bus, the node's reported NMT state, and its Object Dictionary.

use std::time::Duration;

use canopen_node::driver::LoopbackBus;
use canopen_node::enums::EmergencyErrorCode;
use canopen_node::frame::NmtState;
use canopen_node::lss_master::FastscanMode;
use canopen_node::od::{index, table::default_od};
use canopen_node::{Node, NodeConfig, RuntimeSignal};

fn config(node_id: u8) -> NodeConfig {
    NodeConfig {
        node_id,
        ..NodeConfig::default()
    }
}

/// Concrete scenario 1 (spec.md §8): node-ID 0x10, OD 0x1017 = 500 ms,
/// auto-start. Bootup fires immediately, the node reaches OPERATIONAL on the
/// very first tick, no further frame is sent until the heartbeat period
/// elapses, and the heartbeat byte then carries the OPERATIONAL state code.
#[test]
fn boot_and_heartbeat_follow_configured_period() {
    let od = default_od(0x10);
    od.write_u16(index::PRODUCER_HEARTBEAT_TIME, 0, 500).unwrap();
    let bus = Box::new(LoopbackBus::new());
    let bus_ptr = &*bus as *const LoopbackBus;
    let mut node = Node::new(config(0x10), od, bus).unwrap();
    let bus = unsafe { &*bus_ptr };

    let (signal, _) = node.process(Duration::from_micros(0)).unwrap();
    assert_eq!(signal, RuntimeSignal::Continue);
    assert_eq!(node.state(), NmtState::Operational);
    let sent = bus.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id(), 0x710);
    assert_eq!(sent[0].data(), &[0x00]);

    for _ in 0..499 {
        node.process(Duration::from_micros(1000)).unwrap();
        assert!(bus.take_sent().is_empty());
    }
    node.process(Duration::from_micros(1000)).unwrap();
    let sent = bus.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id(), 0x710);
    assert_eq!(sent[0].data(), &[0x05]);
}

/// Concrete scenario 2 (spec.md §8): an application-level `report_error`
/// call drains onto the bus as a wire-accurate EMCY frame on the next tick,
/// and reporting the same condition again before it clears is a no-op.
#[test]
fn report_error_produces_wire_accurate_emcy_frame_and_suppresses_duplicates() {
    let od = default_od(0x05);
    let bus = Box::new(LoopbackBus::new());
    let bus_ptr = &*bus as *const LoopbackBus;
    let mut node = Node::new(config(0x05), od, bus).unwrap();
    let bus = unsafe { &*bus_ptr };

    node.process(Duration::from_micros(0)).unwrap();
    bus.take_sent();

    node.report_error(true, 0x01, EmergencyErrorCode::Communication, 1);
    node.process(Duration::from_micros(0)).unwrap();
    let sent = bus.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id(), 0x080 + 0x05);
    let data = sent[0].data();
    assert_eq!(data.len(), 8);
    assert_eq!(&data[0..2], &[0x00, 0x81]);
    assert_eq!(data[3], 0x01);
    assert_eq!(&data[4..8], &[1, 0, 0, 0]);

    // Reporting the identical condition again before it clears raises no
    // second frame.
    node.report_error(true, 0x01, EmergencyErrorCode::Communication, 1);
    node.process(Duration::from_micros(0)).unwrap();
    assert!(bus.take_sent().is_empty());
}

/// Concrete scenario 6 (spec.md §8): a monitored remote node's heartbeat
/// going to INITIALIZING is treated as a remote reset (raising the
/// COMMUNICATION bit of OD 0x1001), and a subsequent OPERATIONAL heartbeat
/// clears it again.
#[test]
fn heartbeat_consumer_remote_reset_then_recovery_clears_error_register() {
    let od = default_od(0x01);
    od.write_u8(index::CONSUMER_HEARTBEAT_TIME, 0, 1).unwrap();
    let raw = (0x20u32 << 16) | 1000;
    od.write_u32(index::CONSUMER_HEARTBEAT_TIME, 1, raw).unwrap();
    let bus = Box::new(LoopbackBus::new());
    let bus_ptr = &*bus as *const LoopbackBus;
    let mut node = Node::new(config(0x01), od, bus).unwrap();
    let bus = unsafe { &*bus_ptr };

    // Each phase needs two ticks: the first applies the received heartbeat
    // and (if applicable) raises/clears the consumer's error-status bits;
    // the Error Register itself is only recomputed and republished to OD
    // 0x1001 by the following tick's EMCY step.
    let settle = |node: &mut Node| {
        node.process(Duration::from_micros(0)).unwrap();
        node.process(Duration::from_micros(0)).unwrap();
    };

    bus.inject(canopen_node::frame::Guard::new(0x20, false, NmtState::PreOperational).encode());
    settle(&mut node);
    assert_eq!(node.od().read_u8(index::ERROR_REGISTER, 0).unwrap() & 0x10, 0);

    bus.inject(canopen_node::frame::Guard::new(0x20, false, NmtState::Initializing).encode());
    settle(&mut node);
    assert_ne!(node.od().read_u8(index::ERROR_REGISTER, 0).unwrap() & 0x10, 0);

    bus.inject(canopen_node::frame::Guard::new(0x20, false, NmtState::Operational).encode());
    settle(&mut node);
    assert_eq!(node.od().read_u8(index::ERROR_REGISTER, 0).unwrap() & 0x10, 0);
}

/// Concrete scenario 5 (spec.md §8), driven through two full `Node`s (one
/// LSS master, one unconfigured LSS slave) relaying frames between a pair of
/// `LoopbackBus`es the way two real nodes on the same bus would.
#[test]
fn lss_fastscan_identification_through_node_api() {
    let master_od = default_od(0x01);
    let master_bus = Box::new(LoopbackBus::new());
    let master_bus_ptr = &*master_bus as *const LoopbackBus;
    let mut master = Node::new(
        NodeConfig {
            lss_master_enabled: true,
            ..config(0x01)
        },
        master_od,
        master_bus,
    )
    .unwrap();

    let slave_od = default_od(canopen_node::lss_slave::NODE_ID_UNCONFIGURED);
    slave_od.write_u32(index::IDENTITY_OBJECT, 1, 0x0000_00AB).unwrap();
    slave_od.write_u32(index::IDENTITY_OBJECT, 2, 0x0000_00CD).unwrap();
    slave_od.write_u32(index::IDENTITY_OBJECT, 3, 0x0000_00EF).unwrap();
    slave_od.write_u32(index::IDENTITY_OBJECT, 4, 0x1234_5678).unwrap();
    let slave_bus = Box::new(LoopbackBus::new());
    let slave_bus_ptr = &*slave_bus as *const LoopbackBus;
    let mut slave = Node::new(
        NodeConfig {
            lss_slave_enabled: true,
            ..config(canopen_node::lss_slave::NODE_ID_UNCONFIGURED)
        },
        slave_od,
        slave_bus,
    )
    .unwrap();

    let master_bus = unsafe { &*master_bus_ptr };
    let slave_bus = unsafe { &*slave_bus_ptr };

    let plan = [FastscanMode::Scan, FastscanMode::Scan, FastscanMode::Scan, FastscanMode::Scan];
    master.lss_master_identify_fastscan(plan).unwrap();

    let mut rounds = 0;
    let found = loop {
        rounds += 1;
        assert!(rounds < 1000, "fastscan did not converge");

        for frame in master_bus.take_sent() {
            slave_bus.inject(frame);
        }
        slave.process(Duration::from_micros(0)).unwrap();

        for frame in slave_bus.take_sent() {
            master_bus.inject(frame);
        }
        master.process(Duration::from_micros(0)).unwrap();

        let (status, found) = master.lss_master_process_fastscan(Duration::from_micros(0)).unwrap();
        match status {
            canopen_node::lss_master::LssMasterStatus::Wait => continue,
            canopen_node::lss_master::LssMasterStatus::ScanFinished => break found,
            other => panic!("fastscan failed: {other:?}"),
        }
    };
    assert_eq!(found, [0xAB, 0xCD, 0xEF, 0x1234_5678]);
    assert_eq!(
        slave.lss_slave().unwrap().state(),
        canopen_node::lss_slave::LssState::Configuration
    );
}
