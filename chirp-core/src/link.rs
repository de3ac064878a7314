//! Link layer: variable-size packets over fixed-MTU physical frames.
//!
//! A packet is a 4-byte little-endian length header followed by payload,
//! cut into physical frames that each spend their first byte on a
//! sequence number (0, 1, 2, .. per packet). There is no acknowledgement
//! here; a lost frame surfaces as a sequence gap at the receiver, which
//! flushes the physical queue up to the next packet start and reports
//! out-of-sync for the caller to handle.

use crate::config::ModemConfig;
use crate::errors::{ModemError, Result};
use crate::physical::FrameTransport;

/// Bytes of the packet length header.
const HEADER_LEN: usize = 4;

/// Link packet socket over any frame transport.
pub struct LinkSocket<T: FrameTransport> {
    physical: T,
    /// Payload bytes per fragment (physical MTU minus the sequence byte).
    fragment_payload: usize,
    /// Maximum packet size, header included: 256 fragments worth.
    max_packet: usize,
}

impl<T: FrameTransport> LinkSocket<T> {
    pub fn new(physical: T, config: &ModemConfig) -> Self {
        let fragment_payload = config.phy_mtu - 1;
        Self {
            physical,
            fragment_payload,
            max_packet: 256 * fragment_payload,
        }
    }

    pub fn into_inner(self) -> T {
        self.physical
    }

    pub(crate) fn physical_mut(&mut self) -> &mut T {
        &mut self.physical
    }

    /// Largest payload accepted by [`send`](Self::send).
    pub fn max_payload(&self) -> usize {
        self.max_packet - HEADER_LEN
    }

    /// Fragment and send one packet.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.max_packet - HEADER_LEN {
            return Err(ModemError::invalid(format!(
                "packet of {} bytes exceeds link maximum {}",
                data.len(),
                self.max_packet - HEADER_LEN
            )));
        }

        let header = (data.len() as u32).to_le_bytes();
        let mut seq: u8 = 0;
        let mut header_sent = 0usize;
        let mut data_sent = 0usize;
        while data_sent < data.len() || header_sent < HEADER_LEN {
            let mut frame = Vec::with_capacity(self.fragment_payload + 1);
            frame.push(seq);
            if header_sent < HEADER_LEN {
                let take = (HEADER_LEN - header_sent).min(self.fragment_payload);
                frame.extend_from_slice(&header[header_sent..header_sent + take]);
                header_sent += take;
            }
            let room = self.fragment_payload - (frame.len() - 1);
            let take = room.min(data.len() - data_sent);
            frame.extend_from_slice(&data[data_sent..data_sent + take]);
            data_sent += take;

            self.physical.send_frame(&frame)?;
            seq = seq.wrapping_add(1);
        }

        Ok(())
    }

    /// Receive one packet into `out`.
    ///
    /// Returns the number of payload bytes written, at most
    /// `min(out.len(), packet length)`. Bytes beyond `out` are consumed
    /// from the physical layer without being delivered, and a packet that
    /// cannot fit never completes (the receive times out); size buffers to
    /// [`max_payload`](Self::max_payload).
    pub fn recv(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut header = [0u8; HEADER_LEN];
        let mut header_written = 0usize;
        let mut data_written = 0usize;
        let mut expected_seq: u8 = 0;

        loop {
            let frame = self.physical.recv_frame()?;
            let Some((&seq, mut payload)) = frame.split_first() else {
                continue;
            };

            if seq != expected_seq {
                log::warn!("fragment seq {seq}, expected {expected_seq}; flushing physical queue");
                return self.flush_to_packet_start();
            }
            expected_seq = expected_seq.wrapping_add(1);

            if header_written < HEADER_LEN {
                let take = payload.len().min(HEADER_LEN - header_written);
                header[header_written..header_written + take].copy_from_slice(&payload[..take]);
                header_written += take;
                payload = &payload[take..];
            }
            if !payload.is_empty() {
                let take = payload.len().min(out.len() - data_written);
                out[data_written..data_written + take].copy_from_slice(&payload[..take]);
                data_written += take;
            }

            if header_written == HEADER_LEN {
                let length = u32::from_le_bytes(header) as usize;
                if length <= data_written {
                    return Ok(data_written.min(length));
                }
            }
        }
    }

    /// Drop queued frames until the queue is empty or the head is a fresh
    /// packet start (sequence 0), then report the gap.
    fn flush_to_packet_start(&mut self) -> Result<usize> {
        loop {
            match self.physical.peek_frame(false)? {
                None => return Err(ModemError::OutOfSync),
                Some(frame) if frame.first() == Some(&0) => return Err(ModemError::OutOfSync),
                Some(_) => {
                    self.physical.pop_frame();
                }
            }
        }
    }
}
