//! Chirp core library
//!
//! An acoustic modem: arbitrary byte buffers travel between two machines
//! over nothing but a speaker and a microphone. Bytes become chords of
//! audible sine tones; a receiver FFTs its capture stream, ranks the
//! loudest frequency channels back into symbols, and a three-layer
//! protocol stack (physical framing, link fragmentation, stop-and-wait
//! transport) turns that lossy symbol channel into reliable delivery.
//!
//! The stack is audio-agnostic: everything above [`audio::AudioBackend`]
//! is pure and testable in memory via [`audio::LoopbackBackend`].

pub mod audio;
pub mod config;
pub mod encoding;
pub mod errors;
pub mod link;
pub mod physical;
pub mod socket;
pub mod spectrum;
pub mod symbols;
pub mod transport;

pub use config::ModemConfig;
pub use errors::{ModemError, Result};
pub use socket::{AudioSocket, Layer};
