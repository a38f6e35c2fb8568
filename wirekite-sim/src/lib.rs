//! # Wirekite Simulator
//!
//! A simulated Wirekite board for testing host software without hardware.
//!
//! ## Overview
//!
//! The [simulator::Simulator] speaks the device side of the protocol over an in-memory
//! [PipeTransport]. Like the USB pipes of a real board, the pipe delivers the board's
//! data in chunks of configurable size that ignore message boundaries.
//!
//! The crate is built around two components:
//!
//! - **[Board] Trait**: decides what the peripherals do, e.g. which level an input has
//!   or what an I2C slave answers. [VirtualBoard] is a ready-made implementation.
//! - **[simulator::Simulator]**: handles the protocol, assigns port ids and lets tests
//!   inject input changes, delay completions or unplug the board.
//!
//! ## Basic Usage
//!
//! ```
//! use wirekite_device::{Builder, DigitalOutputAttributes};
//! use wirekite_sim::simulator::Simulator;
//!
//! let (simulator, transport) = Simulator::spawn().unwrap();
//! let device = Builder::new().open(transport).unwrap();
//! let led = device
//!     .configure_digital_output(13, DigitalOutputAttributes::DEFAULT)
//!     .unwrap();
//! device.release_digital_pin(led).unwrap();
//! assert!(simulator.ports().is_empty());
//! ```

mod board;
mod pipe;
pub mod simulator;

pub use board::{
    Board, PortConfig, STATUS_ADDRESS_NAK, Transfer, TransferResult, VirtualBoard,
};
pub use pipe::PipeTransport;
