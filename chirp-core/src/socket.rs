//! Socket façade: one send/recv surface over a chosen protocol layer.
//!
//! Applications talk to the transport layer; the lower layers stay
//! reachable for debugging and for exercising the stack one level at a
//! time. A socket is built once for a single layer, and each layer
//! exclusively owns the layer beneath it, so dropping the socket tears
//! the whole stack (and the audio device) down.

use serde::{Deserialize, Serialize};

use crate::audio::AudioBackend;
use crate::config::ModemConfig;
use crate::errors::Result;
use crate::link::LinkSocket;
use crate::physical::PhysicalSocket;
use crate::transport::TransportSocket;

/// Protocol layer exposed by a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Physical,
    Link,
    #[default]
    Transport,
}

/// An acoustic socket bound to one layer of the stack.
pub enum AudioSocket<B: AudioBackend> {
    Physical(PhysicalSocket<B>),
    Link(LinkSocket<PhysicalSocket<B>>),
    Transport(TransportSocket<PhysicalSocket<B>>),
}

impl<B: AudioBackend> AudioSocket<B> {
    pub fn new(layer: Layer, config: ModemConfig, backend: B) -> Result<Self> {
        let physical = PhysicalSocket::new(config.clone(), backend)?;
        Ok(match layer {
            Layer::Physical => AudioSocket::Physical(physical),
            Layer::Link => AudioSocket::Link(LinkSocket::new(physical, &config)),
            Layer::Transport => {
                AudioSocket::Transport(TransportSocket::new(LinkSocket::new(physical, &config)))
            }
        })
    }

    pub fn layer(&self) -> Layer {
        match self {
            AudioSocket::Physical(_) => Layer::Physical,
            AudioSocket::Link(_) => Layer::Link,
            AudioSocket::Transport(_) => Layer::Transport,
        }
    }

    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            AudioSocket::Physical(socket) => socket.send(data),
            AudioSocket::Link(socket) => socket.send(data),
            AudioSocket::Transport(socket) => socket.send(data),
        }
    }

    /// Receive into `out`, returning the number of bytes written.
    pub fn recv(&mut self, out: &mut [u8]) -> Result<usize> {
        match self {
            AudioSocket::Physical(socket) => {
                let frame = socket.recv()?;
                let take = frame.len().min(out.len());
                out[..take].copy_from_slice(&frame[..take]);
                Ok(take)
            }
            AudioSocket::Link(socket) => socket.recv(out),
            AudioSocket::Transport(socket) => socket.recv(out),
        }
    }
}
