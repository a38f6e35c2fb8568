//! # USB Backend
//!
//! [Transport] over the bulk endpoints of a Wirekite board, based on `nusb`.
//!
//! ## Example Usage
//!
//! ```ignore
//! use wirekite_device::Builder;
//!
//! let transport = UsbTransport::open(0x16c0, 0x0486, 0)?;
//! let device = Builder::new().open(transport)?;
//! ```
use std::{
    io::{self, Read, Write},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use nusb::{
    MaybeFuture,
    io::{EndpointRead, EndpointWrite},
    transfer::{Bulk, In, Out},
};
use wirekite_device::Transport;

/// Endpoint 1 IN, board to host.
const RX_ENDPOINT: u8 = 0x81;
/// Endpoint 2 OUT, host to board.
const TX_ENDPOINT: u8 = 0x02;
/// Size of a full speed bulk packet.
const PACKET_SIZE: usize = 64;
/// Bounds how long [Transport::close] waits for a blocked read.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct UsbTransport {
    reader: Mutex<Option<EndpointRead<Bulk>>>,
    writer: Mutex<Option<EndpointWrite<Bulk>>>,
    closed: AtomicBool,
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "USB device closed")
}

impl UsbTransport {
    /// Opens the first board with the given vendor and product id and claims `interface`.
    pub fn open(vendor_id: u16, product_id: u16, interface: u8) -> io::Result<UsbTransport> {
        log::debug!(
            "Looking for USB device {:04x}:{:04x}",
            vendor_id,
            product_id
        );
        let info = nusb::list_devices()
            .wait()
            .map_err(io::Error::other)?
            .find(|dev| dev.vendor_id() == vendor_id && dev.product_id() == product_id)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no USB device {:04x}:{:04x}", vendor_id, product_id),
                )
            })?;
        log::info!(
            "Found {} ({:04x}:{:04x})",
            info.product_string().unwrap_or("Wirekite"),
            vendor_id,
            product_id
        );

        let device = info.open().wait().map_err(io::Error::other)?;
        let interface = device
            .claim_interface(interface)
            .wait()
            .map_err(io::Error::other)?;
        let reader = interface
            .endpoint::<Bulk, In>(RX_ENDPOINT)
            .map_err(io::Error::other)?
            .reader(PACKET_SIZE)
            .with_num_transfers(4)
            .with_read_timeout(READ_TIMEOUT);
        let writer = interface
            .endpoint::<Bulk, Out>(TX_ENDPOINT)
            .map_err(io::Error::other)?
            .writer(PACKET_SIZE)
            .with_num_transfers(4);
        log::debug!("Claimed bulk endpoints");

        Ok(UsbTransport {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
        })
    }
}

impl Transport for UsbTransport {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        match reader.as_mut() {
            Some(reader) if !self.closed.load(Ordering::Acquire) => reader.read(buf),
            _ => Err(not_connected()),
        }
    }

    fn write(&self, data: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let writer = writer.as_mut().ok_or_else(not_connected)?;
        writer.write_all(data)?;
        writer.flush()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("Releasing USB endpoints");
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
