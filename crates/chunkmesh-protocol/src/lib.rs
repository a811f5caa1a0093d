//! ChunkMesh Protocol Module
//!
//! This module defines the peer-to-peer message envelope, the message type
//! table and the length-prefixed framing used on every overlay connection.

pub mod error;
pub mod frame;
pub mod message;

pub use error::{FrameError, ProtocolError, Result};
pub use frame::{encode_frame, read_frame, write_frame, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE};
pub use message::{Message, MessageType};
