//! MQTT session on top of the blocking `rumqttc` client
//!
//! `rumqttc` only moves bytes while its `Connection` is polled. The session
//! owns both halves and polls the connection itself after every request, so
//! the whole forwarder stays on one thread.

use super::{BrokerError, Publisher};
use crate::config::BrokerConfig;
use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, MqttOptions, Outgoing, Packet, QoS,
};
use rumqttc::RecvTimeoutError;
use std::time::{Duration, Instant};

/// Request queue depth; one publish is in flight at a time
const REQUEST_CAPACITY: usize = 10;

/// Time allowed for DISCONNECT to be written
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll budget while servicing an idle connection
///
/// The connection must be polled with a real wait, otherwise the client's
/// runtime never advances its timers and keep-alive pings are never sent.
const SERVICE_POLL: Duration = Duration::from_millis(10);

/// What a poll loop is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Awaiting {
    ConnAck,
    PublishSent,
    DisconnectSent,
}

impl Awaiting {
    fn operation(&self) -> &'static str {
        match self {
            Awaiting::ConnAck => "CONNACK",
            Awaiting::PublishSent => "PUBLISH",
            Awaiting::DisconnectSent => "DISCONNECT",
        }
    }
}

/// Check whether `event` completes the awaited operation
fn completes(event: &Event, awaiting: Awaiting) -> Result<bool, BrokerError> {
    match (awaiting, event) {
        (Awaiting::ConnAck, Event::Incoming(Packet::ConnAck(ack))) => {
            if ack.code == ConnectReturnCode::Success {
                Ok(true)
            } else {
                Err(BrokerError::Refused(ack.code))
            }
        }
        (Awaiting::PublishSent, Event::Outgoing(Outgoing::Publish(_))) => Ok(true),
        (Awaiting::DisconnectSent, Event::Outgoing(Outgoing::Disconnect)) => Ok(true),
        (Awaiting::DisconnectSent, _) => Ok(false),
        (_, Event::Incoming(Packet::Disconnect)) => Err(BrokerError::Closed),
        _ => Ok(false),
    }
}

/// Explicitly constructed broker session
pub struct MqttSession {
    client: Client,
    connection: Connection,
    host: String,
    port: u16,
    publish_timeout: Duration,
}

impl MqttSession {
    /// Connect to the broker and wait for CONNACK
    pub fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(true);

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);

        let mut session = Self {
            client,
            connection,
            host: config.host.clone(),
            port: config.port,
            publish_timeout: Duration::from_secs(config.publish_timeout_secs),
        };

        log::info!("Connecting to MQTT broker {}:{}", config.host, config.port);
        session.drive(
            Awaiting::ConnAck,
            Duration::from_secs(config.connect_timeout_secs),
        )?;
        log::info!("Connected to MQTT broker as {}", config.client_id);

        Ok(session)
    }

    /// Poll the connection until the awaited event shows up
    fn drive(&mut self, awaiting: Awaiting, timeout: Duration) -> Result<(), BrokerError> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BrokerError::Timeout {
                    operation: awaiting.operation(),
                    timeout,
                });
            }

            match self.connection.recv_timeout(remaining) {
                Ok(Ok(event)) => {
                    log::trace!("MQTT event: {:?}", event);
                    if completes(&event, awaiting)? {
                        return Ok(());
                    }
                }
                // The event loop reports a refused CONNACK as an error
                Ok(Err(ConnectionError::ConnectionRefused(code))) => {
                    return Err(BrokerError::Refused(code))
                }
                Ok(Err(e)) => return Err(BrokerError::Connection(e)),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(BrokerError::Timeout {
                        operation: awaiting.operation(),
                        timeout,
                    })
                }
                Err(RecvTimeoutError::Disconnected) => return Err(BrokerError::Closed),
            }
        }
    }
}

impl Publisher for MqttSession {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())?;
        self.drive(Awaiting::PublishSent, self.publish_timeout)
    }

    fn service(&mut self) -> Result<(), BrokerError> {
        loop {
            match self.connection.recv_timeout(SERVICE_POLL) {
                Ok(Ok(event)) => {
                    log::trace!("MQTT event: {:?}", event);
                    if let Event::Incoming(Packet::Disconnect) = event {
                        return Err(BrokerError::Closed);
                    }
                }
                Ok(Err(e)) => return Err(BrokerError::Connection(e)),
                Err(RecvTimeoutError::Timeout) => return Ok(()),
                Err(RecvTimeoutError::Disconnected) => return Err(BrokerError::Closed),
            }
        }
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.client.disconnect()?;
        match self.drive(Awaiting::DisconnectSent, DISCONNECT_TIMEOUT) {
            // Event loop ends once DISCONNECT is written
            Ok(()) | Err(BrokerError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn describe(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::ConnAck;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    const CONNECT: u8 = 0x10;
    const PUBLISH: u8 = 0x30;
    const PINGREQ: u8 = 0xC0;
    const DISCONNECT: u8 = 0xE0;

    const TOPIC: &str = "lab/3pm25b/microbit/luz";

    /// Read one MQTT packet, returning its type nibble and body
    fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
        let mut header = [0u8; 1];
        stream.read_exact(&mut header).ok()?;

        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let mut byte = [0u8; 1];
            stream.read_exact(&mut byte).ok()?;
            len |= ((byte[0] & 0x7f) as usize) << shift;
            if byte[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).ok()?;
        Some((header[0] & 0xf0, body))
    }

    /// Single-client broker on localhost that answers CONNECT and PINGREQ
    struct FakeBroker {
        port: u16,
        packets: mpsc::Receiver<(u8, Vec<u8>)>,
    }

    impl FakeBroker {
        fn start(connack_code: u8) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let (tx, rx) = mpsc::channel();

            thread::spawn(move || {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                while let Some((kind, body)) = read_packet(&mut stream) {
                    let reply: &[u8] = match kind {
                        CONNECT => &[0x20, 0x02, 0x00, connack_code],
                        PINGREQ => &[0xD0, 0x00],
                        _ => &[],
                    };
                    let _ = tx.send((kind, body));
                    if stream.write_all(reply).is_err() {
                        break;
                    }
                }
            });

            Self { port, packets: rx }
        }

        fn config(&self) -> BrokerConfig {
            BrokerConfig {
                host: "127.0.0.1".to_string(),
                port: self.port,
                topic: TOPIC.to_string(),
                keep_alive_secs: 1,
                connect_timeout_secs: 5,
                publish_timeout_secs: 5,
                ..Default::default()
            }
        }

        /// Wait for the next packet of one type, skipping others
        fn expect(&self, kind: u8) -> Vec<u8> {
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.packets.recv_timeout(remaining) {
                    Ok((k, body)) if k == kind => return body,
                    Ok(_) => continue,
                    Err(e) => panic!("broker never saw packet 0x{:02x}: {:?}", kind, e),
                }
            }
        }

        fn count(&self, kind: u8) -> usize {
            self.packets.try_iter().filter(|(k, _)| *k == kind).count()
        }
    }

    #[test]
    fn test_connect_waits_for_connack() {
        let broker = FakeBroker::start(0x00);
        let session = MqttSession::connect(&broker.config()).unwrap();

        broker.expect(CONNECT);
        assert_eq!(session.describe(), format!("mqtt://127.0.0.1:{}", broker.port));
    }

    #[test]
    fn test_connect_refused_by_broker() {
        let broker = FakeBroker::start(0x05);

        match MqttSession::connect(&broker.config()).err() {
            Some(BrokerError::Refused(code)) => assert_eq!(code, ConnectReturnCode::NotAuthorized),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_connect_to_closed_port_fails() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = BrokerConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_secs: 5,
            ..Default::default()
        };

        assert!(matches!(
            MqttSession::connect(&config).err(),
            Some(BrokerError::Connection(_))
        ));
    }

    #[test]
    fn test_publish_writes_payload_to_topic() {
        let broker = FakeBroker::start(0x00);
        let mut session = MqttSession::connect(&broker.config()).unwrap();

        session.publish(TOPIC, "42").unwrap();

        let body = broker.expect(PUBLISH);
        let mut expected = vec![0x00, TOPIC.len() as u8];
        expected.extend_from_slice(TOPIC.as_bytes());
        expected.extend_from_slice(b"42");
        assert_eq!(body, expected);
    }

    #[test]
    fn test_idle_service_sends_keep_alive_pings() {
        let broker = FakeBroker::start(0x00);
        let mut session = MqttSession::connect(&broker.config()).unwrap();
        broker.expect(CONNECT);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut pings = 0;
        while pings < 2 && Instant::now() < deadline {
            session.service().unwrap();
            // Stand-in for a serial read that timed out
            thread::sleep(Duration::from_millis(50));
            pings += broker.count(PINGREQ);
        }

        assert!(pings >= 2, "only {} pings sent while idle", pings);
    }

    #[test]
    fn test_disconnect_sends_disconnect() {
        let broker = FakeBroker::start(0x00);
        let mut session = MqttSession::connect(&broker.config()).unwrap();

        session.disconnect().unwrap();

        broker.expect(DISCONNECT);
    }

    #[test]
    fn test_connack_success_completes_connect() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert!(completes(&event, Awaiting::ConnAck).unwrap());
    }

    #[test]
    fn test_connack_refused_is_error() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::NotAuthorized,
            false,
        )));
        match completes(&event, Awaiting::ConnAck) {
            Err(BrokerError::Refused(code)) => assert_eq!(code, ConnectReturnCode::NotAuthorized),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_publish_waits_for_outgoing_publish() {
        let ping = Event::Incoming(Packet::PingResp);
        let sent = Event::Outgoing(Outgoing::Publish(0));

        assert!(!completes(&ping, Awaiting::PublishSent).unwrap());
        assert!(completes(&sent, Awaiting::PublishSent).unwrap());
    }

    #[test]
    fn test_broker_disconnect_closes_session() {
        let event = Event::Incoming(Packet::Disconnect);
        assert!(matches!(
            completes(&event, Awaiting::PublishSent),
            Err(BrokerError::Closed)
        ));
    }
}
