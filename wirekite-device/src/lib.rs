//! # Wirekite Device
//!
//! Host-side driver for Wirekite boards: USB microcontrollers that expose digital
//! and analog I/O, PWM, I2C and SPI to the host computer.
//!
//! ## Overview
//!
//! A [Device] is opened on a [Transport], a byte pipe to the board. It starts a
//! receive thread that reassembles the incoming chunks into messages and routes them:
//!
//! - Configuration responses and transaction completions wake the thread waiting for them
//! - Samples of on-demand inputs are queued for the next read
//! - Changes of precached inputs update the cached value
//! - Changes of triggering inputs and analog samples invoke the registered callbacks
//!
//! Every peripheral is addressed by the port id the board assigns when it is configured.
//! All operations take `&self`, so a device can be shared between threads with an `Arc`.
//! I2C and SPI requests are throttled so the board's buffer memory is never overrun.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use wirekite_device::{Builder, DigitalOutputAttributes};
//!
//! let device = Builder::new().open(transport)?;
//! let led = device.configure_digital_output(13, DigitalOutputAttributes::DEFAULT)?;
//! device.write_digital_pin(led, true)?;
//! device.release_digital_pin(led)?;
//! ```
//!
//! ### Talking to an I2C slave
//!
//! ```ignore
//! use wirekite_device::{I2cPins, I2cResult};
//!
//! let i2c = device.configure_i2c_master(I2cPins::Scl19Sda18, 100_000)?;
//! let sent = device.send_on_i2c_port(i2c, &[0x40, 0x00], 0x52)?;
//! if sent < 2 {
//!     println!("Transaction failed: {}", device.last_i2c_result(i2c));
//! }
//! let data = device.request_data_on_i2c_port(i2c, 0x52, 6)?;
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [Result]. Once the transport fails or the board
//! sends a malformed message the device closes itself and every call, including the
//! ones blocked at the time, returns [Error::Closed].
//!
//! ## Related Crates
//!
//! - [`wirekite_protocol`] - Message encoding and stream reassembly

mod analog;
mod attributes;
mod config;
mod device;
mod digital;
mod error;
mod i2c;
mod pending;
mod port;
mod pwm;
mod registry;
pub mod service;
mod spi;
mod sync;
mod throttler;
mod transport;

pub use analog::AnalogPin;
pub use config::{Builder, Config, DEFAULT_MAX_OUTSTANDING_REQUESTS, DEFAULT_MEMORY_SIZE};
pub use device::{Device, DeviceState};
pub use digital::{DigitalInputAttributes, DigitalOutputAttributes, InputCommunication};
pub use error::{Error, Result};
pub use i2c::{I2cPins, I2cResult};
pub use port::{AnalogInputCallback, DigitalInputCallback, PortKind};
pub use pwm::{PwmChannelAttributes, PwmTimerAttributes};
pub use spi::{SpiAttributes, SpiResult};
pub use throttler::FRAME_OVERHEAD;
pub use transport::Transport;
pub use wirekite_protocol::BoardInfo;
