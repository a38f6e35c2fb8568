use std::{
    collections::HashMap,
    sync::{Condvar, Mutex},
};

use crate::{
    Error, Result,
    config::{DEFAULT_MAX_OUTSTANDING_REQUESTS, DEFAULT_MEMORY_SIZE},
    sync::{lock, wait},
};

/// Bytes the firmware needs per buffered request on top of the request itself.
pub const FRAME_OVERHEAD: usize = 16;

struct State {
    memory_size: usize,
    max_outstanding: usize,
    reserved: usize,
    reservations: HashMap<u16, usize>,
    /// Incremented by every clear, so waiters from before the clear give up.
    generation: u64,
    closed: bool,
}

/// Flow control for requests that occupy device memory.
///
/// The firmware buffers I2C and SPI payloads in a small fixed memory area. A request is
/// admitted only if its reservation fits into the remaining budget and the number of
/// requests in flight is below the limit; otherwise the caller blocks until enough
/// earlier requests have completed.
pub(crate) struct Throttler {
    state: Mutex<State>,
    available: Condvar,
}

/// A limit of zero outstanding requests would block every request forever.
pub(crate) fn check_limit(max_outstanding: usize) -> Result<()> {
    if max_outstanding == 0 {
        Err(Error::InvalidArgument(
            "at least one outstanding request must be allowed".to_string(),
        ))
    } else {
        Ok(())
    }
}

impl Throttler {
    pub(crate) fn new(memory_size: usize, max_outstanding: usize) -> Throttler {
        Throttler {
            state: Mutex::new(State {
                memory_size,
                max_outstanding,
                reserved: 0,
                reservations: HashMap::new(),
                generation: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Changes the budget. Blocked requests are re-evaluated against the new limits.
    ///
    /// Fails without changing anything if `max_outstanding` is zero or if `memory_size`
    /// is below the memory reserved by the requests in flight.
    pub(crate) fn configure(&self, memory_size: usize, max_outstanding: usize) -> Result<()> {
        check_limit(max_outstanding)?;
        let mut state = lock(&self.state);
        if memory_size < state.reserved {
            return Err(Error::ResourceExhausted {
                required: state.reserved,
                budget: memory_size,
            });
        }
        state.memory_size = memory_size;
        state.max_outstanding = max_outstanding;
        self.available.notify_all();
        Ok(())
    }

    /// Blocks until `required_bytes` (plus [FRAME_OVERHEAD]) can be reserved for `request_id`, then reserves them.
    pub(crate) fn wait_until_available(&self, request_id: u16, required_bytes: usize) -> Result<()> {
        let needed = required_bytes + FRAME_OVERHEAD;
        let mut state = lock(&self.state);
        let generation = state.generation;
        loop {
            if state.closed {
                return Err(Error::Closed);
            }
            if state.generation != generation {
                return Err(Error::Cancelled);
            }
            if needed > state.memory_size {
                return Err(Error::ResourceExhausted {
                    required: needed,
                    budget: state.memory_size,
                });
            }
            if state.memory_size.saturating_sub(state.reserved) >= needed
                && state.reservations.len() < state.max_outstanding
            {
                state.reserved += needed;
                if let Some(previous) = state.reservations.insert(request_id, needed) {
                    state.reserved -= previous;
                }
                return Ok(());
            }
            log::trace!(
                "Request {} waiting for {} bytes ({} of {} reserved, {} outstanding)",
                request_id,
                needed,
                state.reserved,
                state.memory_size,
                state.reservations.len()
            );
            state = wait(&self.available, state);
        }
    }

    /// Releases the reservation of a completed request. Unknown ids are ignored.
    pub(crate) fn request_completed(&self, request_id: u16) {
        let mut state = lock(&self.state);
        if let Some(size) = state.reservations.remove(&request_id) {
            state.reserved -= size;
            self.available.notify_all();
        }
    }

    /// Forgets all reservations and cancels blocked requests.
    pub(crate) fn clear(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.reserved = 0;
        state.reservations.clear();
        self.available.notify_all();
    }

    /// Like [Throttler::clear], but blocked and future requests fail with [Error::Closed].
    pub(crate) fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.generation += 1;
        state.reserved = 0;
        state.reservations.clear();
        self.available.notify_all();
    }

    pub(crate) fn reserved_bytes(&self) -> usize {
        lock(&self.state).reserved
    }

    pub(crate) fn outstanding_requests(&self) -> usize {
        lock(&self.state).reservations.len()
    }
}

impl Default for Throttler {
    fn default() -> Self {
        Throttler::new(DEFAULT_MEMORY_SIZE, DEFAULT_MAX_OUTSTANDING_REQUESTS)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
        time::Duration,
    };

    #[test]
    fn reserves_with_frame_overhead() {
        let throttler = Throttler::default();
        throttler.wait_until_available(1, 18).unwrap();
        assert_eq!(throttler.reserved_bytes(), 34);
        assert_eq!(throttler.outstanding_requests(), 1);
        throttler.request_completed(1);
        throttler.request_completed(1);
        assert_eq!(throttler.reserved_bytes(), 0);
        assert_eq!(throttler.outstanding_requests(), 0);
    }

    #[test]
    fn oversized_request_is_rejected() {
        let throttler = Throttler::new(100, 4);
        match throttler.wait_until_available(1, 90) {
            Err(Error::ResourceExhausted { required, budget }) => {
                assert_eq!(required, 106);
                assert_eq!(budget, 100);
            }
            other => panic!("expected ResourceExhausted, got {:?}", other),
        }
    }

    #[test]
    fn outstanding_limit_blocks_until_completion() {
        let throttler = Arc::new(Throttler::new(10_000, 2));
        throttler.wait_until_available(1, 0).unwrap();
        throttler.wait_until_available(2, 0).unwrap();
        let admitted = Arc::new(AtomicUsize::new(0));
        let waiters: Vec<_> = (3..=4)
            .map(|id| {
                let throttler = throttler.clone();
                let admitted = admitted.clone();
                thread::spawn(move || {
                    throttler.wait_until_available(id, 0).unwrap();
                    admitted.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(admitted.load(Ordering::SeqCst), 0);

        throttler.request_completed(1);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert_eq!(throttler.outstanding_requests(), 2);

        throttler.request_completed(2);
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn memory_budget_is_never_exceeded() {
        const BUDGET: usize = 200;
        let throttler = Arc::new(Throttler::new(BUDGET, 100));
        let workers: Vec<_> = (1..=16u16)
            .map(|id| {
                let throttler = throttler.clone();
                thread::spawn(move || {
                    throttler.wait_until_available(id, 50).unwrap();
                    assert!(throttler.reserved_bytes() <= BUDGET);
                    thread::sleep(Duration::from_millis(2));
                    throttler.request_completed(id);
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(throttler.reserved_bytes(), 0);
    }

    #[test]
    fn clear_cancels_waiters() {
        let throttler = Arc::new(Throttler::new(10_000, 1));
        throttler.wait_until_available(1, 0).unwrap();
        let waiters: Vec<_> = (2..=5)
            .map(|id| {
                let throttler = throttler.clone();
                thread::spawn(move || throttler.wait_until_available(id, 0))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        throttler.clear();
        for waiter in waiters {
            assert!(matches!(waiter.join().unwrap(), Err(Error::Cancelled)));
        }
        assert_eq!(throttler.outstanding_requests(), 0);
        throttler.wait_until_available(6, 0).unwrap();
    }

    #[test]
    fn raising_the_limit_wakes_waiters() {
        let throttler = Arc::new(Throttler::new(10_000, 1));
        throttler.wait_until_available(1, 0).unwrap();
        let waiter = {
            let throttler = throttler.clone();
            thread::spawn(move || throttler.wait_until_available(2, 0))
        };
        thread::sleep(Duration::from_millis(20));
        throttler.configure(10_000, 2).unwrap();
        waiter.join().unwrap().unwrap();
    }

    #[test]
    fn budget_cannot_shrink_below_reservations() {
        let throttler = Throttler::new(1000, 4);
        throttler.wait_until_available(1, 84).unwrap();
        match throttler.configure(99, 4) {
            Err(Error::ResourceExhausted { required, budget }) => {
                assert_eq!(required, 100);
                assert_eq!(budget, 99);
            }
            other => panic!("expected ResourceExhausted, got {:?}", other),
        }
        throttler.configure(100, 4).unwrap();
        assert!(throttler.reserved_bytes() <= 100);
        throttler.request_completed(1);
        throttler.configure(20, 4).unwrap();
    }

    #[test]
    fn zero_outstanding_limit_is_rejected() {
        let throttler = Throttler::new(1000, 4);
        assert!(matches!(
            throttler.configure(1000, 0),
            Err(Error::InvalidArgument(_))
        ));
        throttler.wait_until_available(1, 0).unwrap();
        assert_eq!(throttler.outstanding_requests(), 1);
    }

    #[test]
    fn close_fails_waiters_and_new_requests() {
        let throttler = Arc::new(Throttler::new(10_000, 1));
        throttler.wait_until_available(1, 0).unwrap();
        let waiter = {
            let throttler = throttler.clone();
            thread::spawn(move || throttler.wait_until_available(2, 0))
        };
        thread::sleep(Duration::from_millis(20));
        throttler.close();
        assert!(matches!(waiter.join().unwrap(), Err(Error::Closed)));
        assert!(matches!(
            throttler.wait_until_available(3, 0),
            Err(Error::Closed)
        ));
    }
}
