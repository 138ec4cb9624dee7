mod common;

use std::collections::HashMap;
use std::time::Duration;

use abx_replay::output::{self, PacketRecord};
use abx_replay::{
    ClientConfig, Error, Packet, RecoveryCoordinator, RecoveryReport, Transport,
};
use common::{closed_addr, frames, packet, resume_replies, MockServer, Reply};
use tempfile::tempdir;

fn sequences(packets: &[Packet]) -> Vec<i32> {
    packets.iter().map(Packet::sequence).collect()
}

fn unresolved(report: &RecoveryReport) -> Vec<(i32, i32)> {
    report.unresolved.iter().map(|u| (u.first, u.last)).collect()
}

#[test]
fn recovers_missing_middle_sequence() {
    let server = MockServer::start(Reply::Bytes(frames(&[1, 2, 4, 5])), resume_replies(&[3]));
    let transport = Transport::new(server.config()).expect("transport");

    let report = RecoveryCoordinator::new(transport).run().expect("run");

    assert_eq!(sequences(&report.packets), vec![1, 2, 3, 4, 5]);
    assert_eq!(report.packets[2], packet(3));
    assert_eq!(report.recovered, vec![3]);
    assert!(report.is_complete());
    assert_eq!(server.requests(), vec![[1, 0], [2, 3]]);
}

#[test]
fn complete_stream_is_returned_unchanged() {
    let server = MockServer::start(Reply::Bytes(frames(&[1, 2, 3])), HashMap::new());
    let transport = Transport::new(server.config()).expect("transport");

    let report = RecoveryCoordinator::new(transport).run().expect("run");

    assert_eq!(report.packets, vec![packet(1), packet(2), packet(3)]);
    assert_eq!(server.requests(), vec![[1, 0]]);
}

#[test]
fn unreachable_server_fails_streaming() {
    let addr = closed_addr();
    let config = ClientConfig::new(addr.ip().to_string(), addr.port());
    let transport = Transport::new(config).expect("transport");

    let err = RecoveryCoordinator::new(transport).run().unwrap_err();

    match err {
        Error::StreamingFailed(inner) => assert!(inner.is_connection(), "{inner}"),
        other => panic!("expected StreamingFailed, got {other}"),
    }
}

#[test]
fn truncated_recovery_response_is_skipped() {
    let mut replies = resume_replies(&[3]);
    replies.insert(7, Reply::Bytes(packet(7).to_bytes()[..10].to_vec()));
    let server = MockServer::start(Reply::Bytes(frames(&[1, 2, 4, 5, 6, 8])), replies);
    let transport = Transport::new(server.config()).expect("transport");

    let report = RecoveryCoordinator::new(transport).run().expect("run");

    assert_eq!(sequences(&report.packets), vec![1, 2, 3, 4, 5, 6, 8]);
    assert_eq!(unresolved(&report), vec![(7, 7)]);
    assert!(report.unresolved[0].reason.contains("malformed frame"));
}

#[test]
fn unanswered_recovery_does_not_stop_later_gaps() {
    let mut replies = resume_replies(&[4]);
    replies.insert(2, Reply::Hang(Duration::from_secs(1)));
    let server = MockServer::start(Reply::Bytes(frames(&[1, 3, 5])), replies);
    let transport = Transport::new(server.config()).expect("transport");

    let report = RecoveryCoordinator::new(transport).run().expect("run");

    assert_eq!(sequences(&report.packets), vec![1, 3, 4, 5]);
    assert_eq!(unresolved(&report), vec![(2, 2)]);
    assert_eq!(report.recovered, vec![4]);
}

#[test]
fn partial_trailing_frame_ends_stream() {
    let mut bytes = frames(&[1, 2]);
    bytes.extend_from_slice(&packet(3).to_bytes()[..5]);
    let server = MockServer::start(Reply::Bytes(bytes), HashMap::new());
    let transport = Transport::new(server.config()).expect("transport");

    let report = RecoveryCoordinator::new(transport).run().expect("run");

    assert_eq!(sequences(&report.packets), vec![1, 2]);
    assert_eq!(report.streamed, 2);
}

#[test]
fn stalled_stream_fails_with_timeout() {
    let server = MockServer::start(Reply::Hang(Duration::from_secs(1)), HashMap::new());
    let transport = Transport::new(server.config()).expect("transport");

    let err = RecoveryCoordinator::new(transport).run().unwrap_err();

    assert!(matches!(err, Error::StreamingFailed(inner) if inner.is_connection()));
}

#[test]
fn recovered_set_writes_ordered_json() {
    let server = MockServer::start(Reply::Bytes(frames(&[2, 1, 4])), resume_replies(&[3]));
    let transport = Transport::new(server.config()).expect("transport");
    let report = RecoveryCoordinator::new(transport).run().expect("run");

    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("output.json");
    output::write_json(&path, &report.packets).expect("write");

    let raw = std::fs::read_to_string(&path).expect("read");
    let records: Vec<PacketRecord> = serde_json::from_str(&raw).expect("parse");
    let seqs: Vec<i32> = records.iter().map(|r| r.sequence).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);
    assert_eq!(records[2].symbol, "ABXC");
    assert_eq!(records[2].side, "S");
}

#[test]
fn corrupt_final_streamed_frame_fails_run() {
    let mut bytes = frames(&[1, 2]);
    let mut last = packet(3).to_bytes();
    last[1] = 0xff;
    bytes.extend_from_slice(&last);
    let server = MockServer::start(Reply::Bytes(bytes), resume_replies(&[1, 2, 3]));
    let transport = Transport::new(server.config()).expect("transport");

    let err = RecoveryCoordinator::new(transport).run().unwrap_err();

    match err {
        Error::StreamingFailed(inner) => {
            assert!(matches!(*inner, Error::CorruptFrame { sequence: 3, .. }), "{inner}")
        }
        other => panic!("expected StreamingFailed, got {other}"),
    }
    assert_eq!(server.requests(), vec![[1, 0]]);
}

#[test]
fn corrupt_streamed_frame_below_max_is_recovered() {
    let mut bytes = frames(&[1]);
    let mut bad = packet(2).to_bytes();
    bad[4] = 0x80;
    bytes.extend_from_slice(&bad);
    bytes.extend_from_slice(&frames(&[3]));
    let server = MockServer::start(Reply::Bytes(bytes), resume_replies(&[2]));
    let transport = Transport::new(server.config()).expect("transport");

    let report = RecoveryCoordinator::new(transport).run().expect("run");

    assert_eq!(sequences(&report.packets), vec![1, 2, 3]);
    assert!(report.is_complete());
    assert_eq!(server.requests(), vec![[1, 0], [2, 2]]);
}
