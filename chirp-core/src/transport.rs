//! Transport layer: stop-and-wait reliable delivery over link packets.
//!
//! Sender and receiver share an 8-bit sequence counter. Every transport
//! packet leads with its sequence byte; the first packet of a message also
//! carries the total message length as 4 little-endian bytes ahead of the
//! payload. The sender keeps exactly one packet in flight and retransmits
//! it on any transient receive failure; the receiver re-acks duplicates
//! (a duplicate means its previous ACK was lost) and treats a sequence
//! running ahead as an unrecoverable break.

use crate::errors::{ModemError, Result};
use crate::link::LinkSocket;
use crate::physical::FrameTransport;

/// Bytes of the message length prefix in the first packet.
const LEN_PREFIX: usize = 4;

/// Stop-and-wait packet socket over a link socket.
pub struct TransportSocket<T: FrameTransport> {
    link: LinkSocket<T>,
    seq: u8,
    /// Payload capacity of one transport packet: what the link accepts,
    /// minus our sequence byte.
    packet_payload: usize,
}

impl<T: FrameTransport> TransportSocket<T> {
    pub fn new(link: LinkSocket<T>) -> Self {
        let packet_payload = link.max_payload() - 1;
        Self {
            link,
            seq: 0,
            packet_payload,
        }
    }

    /// Send a complete message, blocking until every packet is acked.
    /// Retries forever on timeouts and sequence gaps; fails fast on
    /// backend errors.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        // The length prefix travels inside the first packet's payload.
        let mut remaining = data.len() + LEN_PREFIX;
        let mut offset = 0usize;
        let mut prefix_len = LEN_PREFIX;

        let mut sending = remaining.min(self.packet_payload);
        let mut packet = Vec::with_capacity(1 + self.packet_payload);
        packet.push(self.seq);
        packet.extend_from_slice(&(data.len() as u32).to_le_bytes());
        packet.extend_from_slice(&data[..sending - LEN_PREFIX]);

        let mut ack = vec![0u8; self.packet_payload + 1];
        while remaining > 0 {
            self.link.send(&packet)?;

            let acked = match self.link.recv(&mut ack) {
                Ok(got) => got >= 1 && ack[0] == packet[0],
                Err(err) if err.is_transient() => {
                    log::info!("no ack ({err}), retransmitting seq {}", packet[0]);
                    false
                }
                Err(err) => {
                    log::error!("ack receive failed: {err}");
                    return Err(err);
                }
            };
            if !acked {
                continue;
            }

            self.seq = self.seq.wrapping_add(1);
            remaining -= sending;
            offset += sending - prefix_len;
            prefix_len = 0;

            sending = remaining.min(self.packet_payload);
            packet.clear();
            packet.push(self.seq);
            packet.extend_from_slice(&data[offset..offset + sending]);
        }

        Ok(())
    }

    /// Receive one complete message into `out`, returning its length.
    pub fn recv(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut packet = vec![0u8; self.packet_payload + 1];
        let mut index = 0usize;
        let mut total = 0usize;
        let mut got_length = false;

        while index < out.len() {
            let got = match self.link.recv(&mut packet) {
                Ok(got) => got,
                Err(err) if err.is_transient() => {
                    log::info!("transport receive retry: {err}");
                    continue;
                }
                Err(err) => {
                    log::error!("transport receive failed: {err}");
                    return Err(err);
                }
            };
            if got == 0 {
                continue;
            }

            let seq = packet[0];
            if seq < self.seq {
                // Our ACK for this packet was lost; step back so the
                // common path below re-acks without re-consuming.
                log::debug!("duplicate seq {seq}, re-acking");
                self.seq = self.seq.wrapping_sub(1);
            } else if seq > self.seq {
                log::warn!("sequence {seq} ahead of expected {}", self.seq);
                return Err(ModemError::Desync {
                    expected: self.seq,
                    got: seq,
                });
            } else {
                let mut payload = &packet[1..got];
                if !got_length {
                    if payload.len() < LEN_PREFIX {
                        log::warn!("first packet of {got} bytes lacks a length prefix");
                        continue;
                    }
                    let mut prefix = [0u8; LEN_PREFIX];
                    prefix.copy_from_slice(&payload[..LEN_PREFIX]);
                    total = u32::from_le_bytes(prefix) as usize;
                    got_length = true;
                    payload = &payload[LEN_PREFIX..];
                    log::debug!("incoming message of {total} bytes");
                }
                let take = payload.len().min(out.len() - index);
                out[index..index + take].copy_from_slice(&payload[..take]);
                index += take;
            }

            // Ack the packet we just saw (duplicate or fresh alike).
            let ack = [seq];
            self.seq = self.seq.wrapping_add(1);
            self.link.send(&ack)?;

            if got_length && index >= total {
                break;
            }
        }

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModemConfig;
    use std::collections::VecDeque;

    /// Frame transport scripted at the physical level, with recording.
    struct ScriptTransport {
        incoming: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
    }

    impl ScriptTransport {
        fn new() -> Self {
            Self {
                incoming: VecDeque::new(),
                sent: Vec::new(),
            }
        }
    }

    impl FrameTransport for ScriptTransport {
        fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
            self.sent.push(frame.to_vec());
            Ok(())
        }

        fn peek_frame(&mut self, _blocking: bool) -> Result<Option<Vec<u8>>> {
            Ok(self.incoming.front().cloned())
        }

        fn pop_frame(&mut self) -> bool {
            self.incoming.pop_front().is_some()
        }

        fn recv_frame(&mut self) -> Result<Vec<u8>> {
            self.incoming
                .pop_front()
                .ok_or(ModemError::Timeout { seconds: 6 })
        }
    }

    fn transport() -> TransportSocket<ScriptTransport> {
        let config = ModemConfig::default();
        TransportSocket::new(LinkSocket::new(ScriptTransport::new(), &config))
    }

    /// Physical frames of one link packet carrying `data`.
    fn link_frames(data: &[u8]) -> Vec<Vec<u8>> {
        let config = ModemConfig::default();
        let mut side = LinkSocket::new(ScriptTransport::new(), &config);
        side.send(data).unwrap();
        side.into_inner().sent
    }

    fn queue_packet(socket: &mut TransportSocket<ScriptTransport>, data: &[u8]) {
        for frame in link_frames(data) {
            socket.link.physical_mut().incoming.push_back(frame);
        }
    }

    fn data_packet(seq: u8, message: &[u8]) -> Vec<u8> {
        let mut packet = vec![seq];
        packet.extend_from_slice(&(message.len() as u32).to_le_bytes());
        packet.extend_from_slice(message);
        packet
    }

    #[test]
    fn single_packet_message_roundtrip() {
        let mut rx = transport();
        queue_packet(&mut rx, &data_packet(0, b"hello"));

        let mut out = vec![0u8; 64];
        let got = rx.recv(&mut out).unwrap();
        assert_eq!(&out[..got], b"hello");
        assert_eq!(rx.seq, 1);

        // Exactly one ack packet went out, carrying seq 0.
        let sent = &rx.link.physical_mut().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], vec![0u8, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn duplicate_packet_is_reacked_not_redelivered() {
        let mut rx = transport();
        // The same packet arrives twice: the first ack was lost upstream.
        queue_packet(&mut rx, &data_packet(0, b"hello"));
        queue_packet(&mut rx, &data_packet(0, b"hello"));

        let mut out = vec![0u8; 64];
        let got = rx.recv(&mut out).unwrap();
        assert_eq!(&out[..got], b"hello");

        // The next message is consumed cleanly past the duplicate.
        queue_packet(&mut rx, &data_packet(1, b"ok"));
        let mut second = vec![0u8; 64];
        let got = rx.recv(&mut second).unwrap();
        assert_eq!(&second[..got], b"ok");
        assert_eq!(rx.seq, 2);

        // Acks observed: seq 0 fresh, seq 0 re-ack, seq 1.
        let acked: Vec<u8> = rx
            .link
            .physical_mut()
            .sent
            .iter()
            .map(|frame| frame[5])
            .collect();
        assert_eq!(acked, vec![0, 0, 1]);
    }

    #[test]
    fn sequence_ahead_is_fatal() {
        let mut rx = transport();
        queue_packet(&mut rx, &data_packet(3, b"x"));

        let mut out = vec![0u8; 16];
        assert!(matches!(
            rx.recv(&mut out),
            Err(ModemError::Desync {
                expected: 0,
                got: 3
            })
        ));
    }

    #[test]
    fn sender_splits_and_prefixes_length() {
        let mut tx = transport();
        assert_eq!(tx.packet_payload, 2_043);

        // Stage acks for both packets of a two-packet message.
        let payload = vec![7u8; 2_100];
        for seq in [0u8, 1] {
            queue_packet(&mut tx, &[seq]);
        }
        tx.send(&payload).unwrap();
        assert_eq!(tx.seq, 2);

        // First fragment of the first link packet: fragment seq 0, the
        // link length header (1 + 2043 bytes), then our seq byte and the
        // head of the 4-byte message length.
        let sent = tx.link.physical_mut().sent.clone();
        assert_eq!(&sent[0][1..5], &2_044u32.to_le_bytes());
        assert_eq!(sent[0][5], 0);
        assert_eq!(&sent[0][6..9], &2_100u32.to_le_bytes()[..3]);
    }

    #[test]
    fn sender_retransmits_until_acked() {
        let mut tx = transport();
        // A wrong-sequence ack first, then the real one: the packet must
        // go out twice.
        queue_packet(&mut tx, &[9u8]);
        queue_packet(&mut tx, &[0u8]);

        tx.send(b"hi").unwrap();
        assert_eq!(tx.seq, 1);

        let data_frames: Vec<&Vec<u8>> = tx
            .link
            .physical_mut()
            .sent
            .iter()
            .filter(|frame| frame.len() > 6)
            .collect();
        assert_eq!(data_frames.len(), 2);
        assert_eq!(data_frames[0], data_frames[1]);
    }

    #[test]
    fn empty_message_roundtrip() {
        let mut rx = transport();
        queue_packet(&mut rx, &data_packet(0, b""));
        let mut out = vec![0u8; 16];
        assert_eq!(rx.recv(&mut out).unwrap(), 0);
        assert_eq!(rx.seq, 1);
    }
}
