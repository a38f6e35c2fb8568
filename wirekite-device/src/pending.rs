use std::{
    collections::{HashMap, HashSet},
    sync::{Condvar, Mutex},
};

use wirekite_protocol::Message;

use crate::{
    Error, Result,
    sync::{lock, wait},
};

#[derive(Default)]
struct Inner {
    /// Announced requests that have not been collected yet.
    waiting: HashSet<u16>,
    /// Responses delivered for announced requests.
    completed: HashMap<u16, Message>,
    closed: bool,
}

/// Correlates request ids with the responses arriving on the receive thread.
///
/// A request must be announced before it is sent. Otherwise the response could
/// arrive before anyone waits for it and would be discarded as unsolicited.
#[derive(Default)]
pub(crate) struct PendingRequests {
    inner: Mutex<Inner>,
    delivered: Condvar,
}

impl PendingRequests {
    pub(crate) fn new() -> PendingRequests {
        PendingRequests::default()
    }

    /// Registers interest in the response to `request_id`.
    pub(crate) fn announce_request(&self, request_id: u16) -> Result<()> {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return Err(Error::Closed);
        }
        inner.waiting.insert(request_id);
        Ok(())
    }

    /// Blocks until the response to an announced request arrives.
    ///
    /// Returns [Error::Cancelled] if the table is cleared first, or [Error::Closed] if it is closed.
    pub(crate) fn wait_for_response(&self, request_id: u16) -> Result<Message> {
        let mut inner = lock(&self.inner);
        loop {
            if let Some(response) = inner.completed.remove(&request_id) {
                inner.waiting.remove(&request_id);
                return Ok(response);
            }
            if inner.closed {
                return Err(Error::Closed);
            }
            if !inner.waiting.contains(&request_id) {
                return Err(Error::Cancelled);
            }
            inner = wait(&self.delivered, inner);
        }
    }

    /// Delivers a response. Responses nobody announced are dropped.
    pub(crate) fn put_response(&self, request_id: u16, response: Message) {
        let mut inner = lock(&self.inner);
        if inner.waiting.contains(&request_id) {
            inner.completed.insert(request_id, response);
            self.delivered.notify_all();
        } else {
            log::trace!("Dropping response to unannounced request {}", request_id);
        }
    }

    /// Withdraws an announcement whose request could not be sent.
    pub(crate) fn withdraw(&self, request_id: u16) {
        let mut inner = lock(&self.inner);
        inner.waiting.remove(&request_id);
        inner.completed.remove(&request_id);
    }

    /// Releases every waiter with [Error::Cancelled].
    pub(crate) fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.waiting.clear();
        inner.completed.clear();
        self.delivered.notify_all();
    }

    /// Releases every waiter with [Error::Closed] and rejects further announcements.
    pub(crate) fn close(&self) {
        let mut inner = lock(&self.inner);
        inner.closed = true;
        inner.waiting.clear();
        inner.completed.clear();
        self.delivered.notify_all();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };
    use wirekite_protocol::{PortEvent, PortEventCode};

    fn response(request_id: u16) -> Message {
        let mut event = PortEvent::new(1, PortEventCode::TxComplete);
        event.request_id = request_id;
        event.value = request_id as u32 * 10;
        event.into()
    }

    #[test]
    fn response_before_wait_is_kept() {
        let pending = PendingRequests::new();
        pending.announce_request(5).unwrap();
        pending.put_response(5, response(5));
        assert_eq!(pending.wait_for_response(5).unwrap(), response(5));
    }

    #[test]
    fn unannounced_response_is_dropped() {
        let pending = Arc::new(PendingRequests::new());
        pending.put_response(5, response(5));
        pending.announce_request(5).unwrap();
        let waiter = {
            let pending = pending.clone();
            thread::spawn(move || pending.wait_for_response(5))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        pending.put_response(5, response(5));
        assert_eq!(waiter.join().unwrap().unwrap(), response(5));
    }

    #[test]
    fn concurrent_waiters_get_their_own_response() {
        const N: u16 = 32;
        let pending = Arc::new(PendingRequests::new());
        for id in 1..=N {
            pending.announce_request(id).unwrap();
        }
        let barrier = Arc::new(Barrier::new(N as usize + 1));
        let waiters: Vec<_> = (1..=N)
            .map(|id| {
                let pending = pending.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    (id, pending.wait_for_response(id))
                })
            })
            .collect();
        barrier.wait();
        for id in (1..=N).rev() {
            pending.put_response(id, response(id));
        }
        for waiter in waiters {
            let (id, result) = waiter.join().unwrap();
            assert_eq!(result.unwrap(), response(id));
        }
    }

    #[test]
    fn clear_releases_all_waiters() {
        let pending = Arc::new(PendingRequests::new());
        let waiters: Vec<_> = (1..=4)
            .map(|id| {
                pending.announce_request(id).unwrap();
                let pending = pending.clone();
                thread::spawn(move || pending.wait_for_response(id))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        for waiter in &waiters {
            assert!(!waiter.is_finished());
        }
        pending.clear();
        for waiter in waiters {
            assert!(matches!(waiter.join().unwrap(), Err(Error::Cancelled)));
        }
    }

    #[test]
    fn close_rejects_new_requests() {
        let pending = Arc::new(PendingRequests::new());
        pending.announce_request(1).unwrap();
        let waiter = {
            let pending = pending.clone();
            thread::spawn(move || pending.wait_for_response(1))
        };
        thread::sleep(Duration::from_millis(20));
        pending.close();
        assert!(matches!(waiter.join().unwrap(), Err(Error::Closed)));
        assert!(matches!(pending.announce_request(2), Err(Error::Closed)));
    }
}
