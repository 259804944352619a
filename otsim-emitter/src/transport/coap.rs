//! CoAP observe client over UDP, using `coap-lite` for message encoding.

use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coap_lite::{CoapOption, MessageClass, MessageType, Packet, RequestType, ResponseType};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{
    Notification, NotificationHandler, Observation, ObserveConnection, ObserveConnector, resolve,
};
use crate::config::CoapConfig;
use crate::error::TransportError;

/// Observe option value that registers an observation.
pub const OBSERVE_REGISTER: u32 = 0;
/// Observe option value that cancels an observation.
pub const OBSERVE_DEREGISTER: u32 = 1;

const MAX_DATAGRAM: usize = 1500;

/// Dials a CoAP server over UDP.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpCoapConnector;

#[async_trait]
impl ObserveConnector for UdpCoapConnector {
    async fn dial(&self, config: &CoapConfig) -> Result<Box<dyn ObserveConnection>, TransportError> {
        let remote = resolve(&config.address, config.port).await?;
        let local: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        socket
            .connect(remote)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!(%remote, "CoAP socket ready");

        Ok(Box::new(CoapConnection {
            socket: Arc::new(socket),
            next_message_id: rand::random(),
            response_timeout: config.observe_timeout(),
            listener: None,
        }))
    }
}

struct CoapConnection {
    socket: Arc<UdpSocket>,
    next_message_id: u16,
    /// Upper bound on the wait for the registration response.
    response_timeout: Duration,
    listener: Option<JoinHandle<()>>,
}

impl CoapConnection {
    fn message_id(&mut self) -> u16 {
        let id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);
        id
    }

    fn stop_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl Drop for CoapConnection {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

#[async_trait]
impl ObserveConnection for CoapConnection {
    async fn observe(
        &mut self,
        path: &str,
        mut handler: NotificationHandler,
    ) -> Result<Observation, TransportError> {
        let token = rand::random::<u32>().to_be_bytes().to_vec();
        let message_id = self.message_id();
        let request = build_get(
            path,
            &token,
            message_id,
            OBSERVE_REGISTER,
            MessageType::Confirmable,
        )?;

        self.stop_listener();
        self.socket.send(&request).await?;

        let first = tokio::time::timeout(
            self.response_timeout,
            await_registration(&self.socket, &token, message_id),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.response_timeout))??;

        debug!(path, sequence = ?first.sequence, "CoAP observation registered");
        handler(first);

        self.listener = Some(tokio::spawn(listen(
            self.socket.clone(),
            token.clone(),
            handler,
        )));

        Ok(Observation {
            path: path.to_string(),
            token,
        })
    }

    async fn cancel(&mut self, observation: Observation) -> Result<(), TransportError> {
        self.stop_listener();

        let message_id = self.message_id();
        let request = build_get(
            &observation.path,
            &observation.token,
            message_id,
            OBSERVE_DEREGISTER,
            MessageType::NonConfirmable,
        )?;
        self.socket.send(&request).await?;
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), TransportError> {
        // Dropping the connection stops the listener and closes the socket
        drop(self);
        Ok(())
    }
}

/// Build a GET request carrying an Observe option.
pub fn build_get(
    path: &str,
    token: &[u8],
    message_id: u16,
    observe: u32,
    message_type: MessageType,
) -> Result<Vec<u8>, TransportError> {
    let mut packet = Packet::new();
    packet.header.set_type(message_type);
    packet.header.code = MessageClass::Request(RequestType::Get);
    packet.header.message_id = message_id;
    packet.set_token(token.to_vec());
    packet.add_option(CoapOption::Observe, encode_uint(observe));
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        packet.add_option(CoapOption::UriPath, segment.as_bytes().to_vec());
    }

    packet
        .to_bytes()
        .map_err(|e| TransportError::Protocol(format!("{:?}", e)))
}

/// Minimal-length big-endian encoding of a CoAP uint option.
pub fn encode_uint(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

/// Decode a CoAP uint option.
pub fn decode_uint(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

fn observe_sequence(packet: &Packet) -> Option<u32> {
    packet
        .get_option(CoapOption::Observe)
        .and_then(|values| values.front())
        .map(|bytes| decode_uint(bytes))
}

fn empty_reply(message_type: MessageType, message_id: u16) -> Packet {
    let mut reply = Packet::new();
    reply.header.set_type(message_type);
    reply.header.code = MessageClass::Empty;
    reply.header.message_id = message_id;
    reply
}

/// Reply owed for a received message: ACK for confirmable messages of our
/// observation, RST for confirmable messages we know nothing about.
fn reply_for(packet: &Packet, token: &[u8]) -> Option<Packet> {
    if packet.header.get_type() != MessageType::Confirmable {
        return None;
    }
    let ours = packet.get_token() == token
        && matches!(packet.header.code, MessageClass::Response(_));
    let message_type = if ours {
        MessageType::Acknowledgement
    } else {
        MessageType::Reset
    };
    Some(empty_reply(message_type, packet.header.message_id))
}

fn is_success(code: &MessageClass) -> bool {
    matches!(
        code,
        MessageClass::Response(
            ResponseType::Created
                | ResponseType::Deleted
                | ResponseType::Valid
                | ResponseType::Changed
                | ResponseType::Content
                | ResponseType::Continue
        )
    )
}

/// Check the server's answer to a registration request.
///
/// The observation only exists if the answer is a 2.xx response that carries
/// an Observe option.
fn registration_result(packet: &Packet) -> Result<Notification, TransportError> {
    if !is_success(&packet.header.code) {
        return Err(TransportError::Protocol(format!(
            "registration rejected with {:?}",
            packet.header.code
        )));
    }
    match observe_sequence(packet) {
        Some(sequence) => Ok(Notification {
            sequence: Some(sequence),
            payload: packet.payload.clone(),
        }),
        None => Err(TransportError::Protocol(
            "server answered without an Observe option".to_string(),
        )),
    }
}

async fn receive_packet(socket: &UdpSocket, buf: &mut [u8]) -> io::Result<Option<Packet>> {
    let len = socket.recv(buf).await?;
    match Packet::from_bytes(&buf[..len]) {
        Ok(packet) => Ok(Some(packet)),
        Err(e) => {
            debug!(error = ?e, "Ignoring malformed CoAP datagram");
            Ok(None)
        }
    }
}

async fn send_reply(socket: &UdpSocket, packet: &Packet, token: &[u8]) {
    let Some(reply) = reply_for(packet, token) else {
        return;
    };
    match reply.to_bytes() {
        Ok(bytes) => {
            if let Err(e) = socket.send(&bytes).await {
                debug!(error = %e, "Failed to answer CoAP message");
            }
        }
        Err(e) => debug!(error = ?e, "Failed to encode CoAP reply"),
    }
}

/// Wait for the response to the registration sent with `message_id`.
async fn await_registration(
    socket: &UdpSocket,
    token: &[u8],
    message_id: u16,
) -> Result<Notification, TransportError> {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let Some(packet) = receive_packet(socket, &mut buf).await? else {
            continue;
        };
        send_reply(socket, &packet, token).await;

        match packet.header.code {
            MessageClass::Empty
                if packet.header.get_type() == MessageType::Reset
                    && packet.header.message_id == message_id =>
            {
                return Err(TransportError::Protocol(
                    "registration reset by server".to_string(),
                ));
            }
            MessageClass::Response(_) if packet.get_token() == token => {
                return registration_result(&packet);
            }
            // An empty ACK means the response follows separately
            _ => trace!(message_id = packet.header.message_id, "Ignoring CoAP message"),
        }
    }
}

/// Receive notifications for `token` until the task is aborted or the socket fails.
async fn listen(socket: Arc<UdpSocket>, token: Vec<u8>, mut handler: NotificationHandler) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let packet = match receive_packet(&socket, &mut buf).await {
            Ok(Some(packet)) => packet,
            Ok(None) => continue,
            // ICMP port unreachable surfaces here on a connected socket
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => continue,
            Err(e) => {
                debug!(error = %e, "CoAP receive failed");
                break;
            }
        };
        send_reply(&socket, &packet, &token).await;

        if packet.get_token() != token.as_slice() {
            trace!(message_id = packet.header.message_id, "Ignoring unrelated CoAP message");
            continue;
        }
        if !is_success(&packet.header.code) {
            debug!(code = ?packet.header.code, "CoAP observation ended by server");
            continue;
        }

        handler(Notification {
            sequence: observe_sequence(&packet),
            payload: packet.payload.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint_encoding() {
        assert_eq!(encode_uint(0), Vec::<u8>::new());
        assert_eq!(encode_uint(1), vec![1]);
        assert_eq!(encode_uint(0x0102), vec![1, 2]);
        assert_eq!(decode_uint(&[]), 0);
        assert_eq!(decode_uint(&[1, 2]), 0x0102);
    }

    #[test]
    fn test_build_register_request() {
        let bytes = build_get(
            "/some/path",
            &[0xAA, 0xBB],
            7,
            OBSERVE_REGISTER,
            MessageType::Confirmable,
        )
        .unwrap();
        let packet = Packet::from_bytes(&bytes).unwrap();

        assert_eq!(packet.header.get_type(), MessageType::Confirmable);
        assert_eq!(packet.header.code, MessageClass::Request(RequestType::Get));
        assert_eq!(packet.header.message_id, 7);
        assert_eq!(packet.get_token(), &[0xAA, 0xBB][..]);
        assert_eq!(observe_sequence(&packet), Some(OBSERVE_REGISTER));

        let segments: Vec<Vec<u8>> = packet
            .get_option(CoapOption::UriPath)
            .unwrap()
            .iter()
            .cloned()
            .collect();
        assert_eq!(segments, vec![b"some".to_vec(), b"path".to_vec()]);
    }

    #[test]
    fn test_build_deregister_request() {
        let bytes = build_get(
            "/some/path",
            &[1],
            8,
            OBSERVE_DEREGISTER,
            MessageType::NonConfirmable,
        )
        .unwrap();
        let packet = Packet::from_bytes(&bytes).unwrap();

        assert_eq!(packet.header.get_type(), MessageType::NonConfirmable);
        assert_eq!(observe_sequence(&packet), Some(OBSERVE_DEREGISTER));
    }

    fn response(token: &[u8], message_type: MessageType, code: ResponseType) -> Packet {
        let mut packet = Packet::new();
        packet.header.set_type(message_type);
        packet.header.code = MessageClass::Response(code);
        packet.header.message_id = 42;
        packet.set_token(token.to_vec());
        packet
    }

    #[test]
    fn test_confirmable_notification_is_acked() {
        let packet = response(&[1, 2], MessageType::Confirmable, ResponseType::Content);
        let reply = reply_for(&packet, &[1, 2]).unwrap();

        assert_eq!(reply.header.get_type(), MessageType::Acknowledgement);
        assert_eq!(reply.header.code, MessageClass::Empty);
        assert_eq!(reply.header.message_id, 42);
    }

    #[test]
    fn test_unknown_token_is_reset() {
        let packet = response(&[9, 9], MessageType::Confirmable, ResponseType::Content);
        let reply = reply_for(&packet, &[1, 2]).unwrap();

        assert_eq!(reply.header.get_type(), MessageType::Reset);
        assert_eq!(reply.header.message_id, 42);
    }

    #[test]
    fn test_non_confirmable_needs_no_reply() {
        let packet = response(&[1, 2], MessageType::NonConfirmable, ResponseType::Content);
        assert!(reply_for(&packet, &[1, 2]).is_none());
    }

    #[test]
    fn test_registration_accepted() {
        let mut packet = response(&[1], MessageType::Acknowledgement, ResponseType::Content);
        packet.add_option(CoapOption::Observe, encode_uint(5));
        packet.payload = b"21.5".to_vec();

        let first = registration_result(&packet).unwrap();
        assert_eq!(first.sequence, Some(5));
        assert_eq!(first.payload, b"21.5".to_vec());
    }

    #[test]
    fn test_registration_rejected() {
        let packet = response(&[1], MessageType::Acknowledgement, ResponseType::NotFound);
        let err = registration_result(&packet).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
        assert!(err.to_string().contains("NotFound"));

        let mut packet = response(
            &[1],
            MessageType::Acknowledgement,
            ResponseType::InternalServerError,
        );
        packet.add_option(CoapOption::Observe, encode_uint(1));
        assert!(registration_result(&packet).is_err());
    }

    #[test]
    fn test_registration_without_observe_option() {
        let packet = response(&[1], MessageType::Acknowledgement, ResponseType::Content);
        let err = registration_result(&packet).unwrap_err();
        assert!(err.to_string().contains("Observe option"));
    }
}
