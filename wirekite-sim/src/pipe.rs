//! In-memory [Transport] connecting a [Device](wirekite_device::Device) to the simulator.
use std::{
    io,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
    },
};

use wirekite_device::Transport;

pub(crate) enum Packet {
    Data(Vec<u8>),
    /// The board has been unplugged, or the host closed the pipe.
    Closed,
}

struct Incoming {
    packets: Receiver<Packet>,
    /// Tail of a chunk that did not fit into the caller's buffer.
    leftover: Vec<u8>,
}

/// Host end of the pipe.
pub struct PipeTransport {
    outgoing: Mutex<Option<Sender<Vec<u8>>>>,
    incoming: Mutex<Incoming>,
    wake: Sender<Packet>,
    closed: AtomicBool,
}

/// Board end of the pipe.
pub(crate) struct BoardEnd {
    pub(crate) requests: Receiver<Vec<u8>>,
    pub(crate) events: Sender<Packet>,
}

pub(crate) fn pipe() -> (PipeTransport, BoardEnd) {
    let (request_tx, request_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();
    let transport = PipeTransport {
        outgoing: Mutex::new(Some(request_tx)),
        incoming: Mutex::new(Incoming {
            packets: event_rx,
            leftover: Vec::new(),
        }),
        wake: event_tx.clone(),
        closed: AtomicBool::new(false),
    };
    let board = BoardEnd {
        requests: request_rx,
        events: event_tx,
    };
    (transport, board)
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "board disconnected")
}

impl PipeTransport {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Transport for PipeTransport {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut incoming = self.incoming.lock().unwrap_or_else(PoisonError::into_inner);
        if !incoming.leftover.is_empty() {
            let len = buf.len().min(incoming.leftover.len());
            buf[..len].copy_from_slice(&incoming.leftover[..len]);
            incoming.leftover.drain(..len);
            return Ok(len);
        }
        if self.is_closed() {
            return Err(disconnected());
        }
        match incoming.packets.recv() {
            Ok(Packet::Data(chunk)) => {
                let len = buf.len().min(chunk.len());
                buf[..len].copy_from_slice(&chunk[..len]);
                incoming.leftover.extend_from_slice(&chunk[len..]);
                Ok(len)
            }
            Ok(Packet::Closed) | Err(_) => Err(disconnected()),
        }
    }

    fn write(&self, data: &[u8]) -> io::Result<()> {
        let outgoing = self.outgoing.lock().unwrap_or_else(PoisonError::into_inner);
        match &*outgoing {
            Some(requests) => requests.send(data.to_vec()).map_err(|_| disconnected()),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "pipe closed")),
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let _ = self.wake.send(Packet::Closed);
    }
}
