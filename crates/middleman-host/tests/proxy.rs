//! Integration tests for the middleman-host crate.
//!
//! These tests run a real proxy on loopback sockets with the rule engine plugged in
//! as its mutator.

use std::{net::UdpSocket, time::Duration};

use middleman_core::config::{load_config_str, OffsetMode};
use middleman_host::{ChannelObserver, Proxy};
use middleman_protocol::RuleBasedMutator;
use serde_json::json;

fn free_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn mutator() -> RuleBasedMutator {
    let schema = json!({"packets": [{
        "name": "status", "opcode_field": "header.kind", "opcode": 7,
        "data": [
            {"struct": "header", "data": [
                {"value": "kind", "type": "uint8"},
                {"value": "length", "type": "uint16"}
            ]},
            {"value": "level", "type": "uint32"}
        ]
    }]});
    let rules = json!({"rules": [{
        "conditions": [
            {"field": "header.kind", "operator": "==", "value": 7},
            {"field": "level", "operator": ">", "value": 100}
        ],
        "mutations": [{"field": "level", "new_value": 100}]
    }]});
    RuleBasedMutator::from_json_str(
        &schema.to_string(),
        &rules.to_string(),
        true,
        OffsetMode::PerPacket,
    )
}

fn status(level: u32) -> Vec<u8> {
    let mut datagram = vec![7, 0, 7];
    datagram.extend_from_slice(&level.to_be_bytes());
    datagram
}

#[test]
fn test_rule_engine_behind_proxy() {
    let sink = UdpSocket::bind("127.0.0.1:0").unwrap();
    sink.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let config = load_config_str(
        &json!({
            "local_host": "127.0.0.1",
            "local_port": free_port(),
            "remote_host": "127.0.0.1",
            "remote_port": sink.local_addr().unwrap().port(),
            "log_to_stdout": true
        })
        .to_string(),
    )
    .unwrap();

    let (observer, events) = ChannelObserver::channel();
    let proxy =
        Proxy::bind_with_mutator_and_observer(&config, Box::new(mutator()), Box::new(observer))
            .unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(&status(250), proxy.local_addr()).unwrap();
    client.send_to(&status(50), proxy.local_addr()).unwrap();
    client.send_to(&[7, 0], proxy.local_addr()).unwrap();

    let mut buffer = [0u8; 64];
    let mut forwarded = Vec::new();
    for _ in 0..3 {
        let (len, _) = sink.recv_from(&mut buffer).unwrap();
        forwarded.push(buffer[..len].to_vec());
    }
    assert_eq!(forwarded, vec![status(100), status(50), vec![7, 0]]);

    let notifications: Vec<_> =
        (0..3).map(|_| events.recv_timeout(Duration::from_secs(2)).unwrap()).collect();
    let mutated: Vec<bool> = notifications.iter().map(|packet| packet.mutated).collect();
    assert_eq!(mutated, vec![true, false, false]);
    assert_eq!(notifications[0].payload(), status(100).as_slice());

    let stats = proxy.statistics();
    assert_eq!(stats.received, 3);
    assert_eq!(stats.forwarded, 3);
    assert_eq!(stats.mutated, 1);
    assert_eq!(stats.bytes_received, 7 + 7 + 2);
}

#[test]
fn test_proxy_joins_configured_multicast_group() {
    let sink = UdpSocket::bind("127.0.0.1:0").unwrap();
    sink.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let config = load_config_str(
        &json!({
            "local_host": "0.0.0.0",
            "local_port": free_port(),
            "remote_host": "127.0.0.1",
            "remote_port": sink.local_addr().unwrap().port(),
            "multicast_group": "239.255.0.77"
        })
        .to_string(),
    )
    .unwrap();

    // Joining may be refused on hosts without a multicast route; forwarding must work either way.
    let proxy = Proxy::bind(&config).unwrap();
    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(b"hello", ("127.0.0.1", proxy.local_addr().port())).unwrap();

    let mut buffer = [0u8; 16];
    let (len, _) = sink.recv_from(&mut buffer).unwrap();
    assert_eq!(&buffer[..len], b"hello");
}
