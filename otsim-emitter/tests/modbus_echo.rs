//! Production Modbus client against the echo responder.

use std::time::Duration;

use otsim_emitter::{Dispatcher, EmitterConfig, PacingPolicy, SessionState, Transports};
use otsim_modbus_echo::EchoServer;
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[tokio::test]
async fn test_modbus_lifecycle_against_echo_server() {
    let (server, mut exchanges) = EchoServer::bind("127.0.0.1:0")
        .await
        .unwrap()
        .with_exchanges();
    let port = server.local_addr().unwrap().port();
    tokio::spawn(server.run());

    let config = EmitterConfig::parse(&format!(
        r#"{{
            mqtt: {{ address: "127.0.0.1", port: 1883 }},
            modbus: {{ address: "127.0.0.1", port: {}, unit_id: 1, timeout_ms: 1000 }},
            coap: {{ address: "127.0.0.1", port: 5683 }},
            web: {{ address: "127.0.0.1", port: 8080 }},
        }}"#,
        port
    ))
    .unwrap();

    let mut dispatcher = Dispatcher::new(
        Transports::production(),
        PacingPolicy::none(),
        SmallRng::seed_from_u64(11),
    );
    let report = dispatcher.run_pass(&config, &["modbus"]).await;

    // The echoed request is not a valid reply, so only the lifecycle is checked
    let outcome = &report.outcomes()[0];
    assert_eq!(outcome.state(), SessionState::Closed);
    assert!(!outcome.detail().starts_with("Failed to connect"));

    let exchange = tokio::time::timeout(Duration::from_secs(1), exchanges.recv())
        .await
        .unwrap()
        .unwrap();

    // MBAP header (7 bytes) then function code 0x10, start address 0
    let frame = exchange.bytes;
    assert!(frame.len() > 12);
    assert_eq!(frame[6], 1);
    assert_eq!(frame[7], 0x10);
    assert_eq!(&frame[8..10], &[0x00, 0x00]);

    let count = u16::from_be_bytes([frame[10], frame[11]]) as usize;
    assert!(count >= 3);
    assert_eq!(frame[12] as usize, count * 2);
}
