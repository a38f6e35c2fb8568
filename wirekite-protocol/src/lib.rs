//! # Wirekite Protocol Library
//!
//! This crate implements the binary message protocol spoken between a host and a
//! Wirekite board, a USB microcontroller exposing digital and analog I/O, PWM, I2C and
//! SPI peripherals over a single bulk IN/OUT pipe pair.
//!
//! ## Overview
//!
//! The crate provides:
//!
//! - The four message kinds ([ConfigRequest], [ConfigResponse], [PortRequest], [PortEvent])
//!   and the wire constants used in them
//! - Serialization and deserialization of messages
//! - A [reassembler::Reassembler] turning arbitrarily chunked transport data into complete messages
//! - With the `tokio` feature, a [`tokio_util::codec`] implementation for async streams
//!
//! ## Message Format
//!
//! All fields are little-endian. Every message starts with an 8 byte header:
//!
//! ```text
//! size:u16 | type:u8 | reserved:u8 | port_id:u16 | request_id:u16
//! ```
//!
//! followed by a type-specific body:
//!
//! - **ConfigRequest** (20 bytes): `action:u8 port_type:u8 pin_config:u16 value:u32 attr1:u16 attr2:u16`
//! - **ConfigResponse** (16 bytes): `result:u8 padding:u8 optional:u16 value:u32`
//! - **PortRequest** (16 + n bytes): `action:u8 attr1:u8 attr2:u16 value:u32 data[n]`
//! - **PortEvent** (16 + n bytes): `event:u8 attr1:u8 attr2:u16 value:u32 data[n]`
//!
//! ## Basic Usage
//!
//! ```
//! use wirekite_protocol::{Message, PortAction, PortRequest};
//!
//! let mut request = PortRequest::new(3, PortAction::SetValue);
//! request.request_id = 1;
//! request.value = 1;
//! let bytes = Message::from(request.clone()).to_bytes().expect("Request fits");
//! assert_eq!(&bytes[..4], &[16, 0, 3, 0]);
//! assert_eq!(Message::from_bytes(&bytes).unwrap(), Message::PortRequest(request));
//! ```
//!
//! ### Reassembling a chunked stream
//!
//! ```
//! use wirekite_protocol::{Message, PortEvent, PortEventCode, reassembler::reassemble};
//!
//! let bytes = Message::from(PortEvent::new(1, PortEventCode::SingleSample))
//!     .to_bytes()
//!     .unwrap();
//! let chunks = vec![bytes[..1].to_vec(), bytes[1..5].to_vec(), bytes[5..].to_vec()];
//! let messages: Vec<_> = reassemble(chunks).collect::<Result<_, _>>().unwrap();
//! assert_eq!(messages, vec![bytes]);
//! ```
//!
//! ## Error Handling
//!
//! Decoding and reassembly report [error::ReadError]. Any error other than an I/O error
//! means the byte stream is malformed and cannot be resynchronized.

pub mod protocol;
pub use protocol::*;
pub mod codec;
pub mod error;
pub mod reassembler;
#[cfg(feature = "tokio")]
pub mod tokio_codec;
