use std::{
    collections::VecDeque,
    fmt::Display,
    sync::{
        Condvar, Mutex,
        atomic::{AtomicU32, Ordering},
    },
};

use wirekite_protocol::PortEvent;

use crate::{
    Error, Result,
    sync::{lock, wait},
};

/// Called on the receive thread when a triggering digital input changes.
pub type DigitalInputCallback = Box<dyn Fn(u16, bool) + Send + Sync>;
/// Called on the receive thread with every new analog sample.
pub type AnalogInputCallback = Box<dyn Fn(u16, f64) + Send + Sync>;

/// The peripheral mode a port has been configured for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PortKind {
    DigitalOutput,
    DigitalInputOnDemand,
    DigitalInputPrecached,
    DigitalInputTriggering,
    AnalogInputOnDemand,
    AnalogInputSampling,
    PwmOutput,
    I2cMaster,
    SpiMaster,
}

impl Display for PortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Per-kind state of a port. Event routing is a match over this enum.
pub(crate) enum Channel {
    DigitalOutput,
    DigitalInputOnDemand(EventQueue),
    DigitalInputPrecached,
    DigitalInputTriggering(DigitalInputCallback),
    AnalogInputOnDemand(EventQueue),
    AnalogInputSampling(AnalogInputCallback),
    PwmOutput,
    I2cMaster,
    SpiMaster,
}

/// A configured port.
pub(crate) struct Port {
    id: u16,
    channel: Channel,
    /// Latest input sample, or the status code of the last bus transaction.
    last_sample: AtomicU32,
}

impl Port {
    pub(crate) fn new(id: u16, channel: Channel, initial_sample: u32) -> Port {
        Port {
            id,
            channel,
            last_sample: AtomicU32::new(initial_sample),
        }
    }

    pub(crate) fn id(&self) -> u16 {
        self.id
    }

    pub(crate) fn channel(&self) -> &Channel {
        &self.channel
    }

    pub(crate) fn kind(&self) -> PortKind {
        match self.channel {
            Channel::DigitalOutput => PortKind::DigitalOutput,
            Channel::DigitalInputOnDemand(_) => PortKind::DigitalInputOnDemand,
            Channel::DigitalInputPrecached => PortKind::DigitalInputPrecached,
            Channel::DigitalInputTriggering(_) => PortKind::DigitalInputTriggering,
            Channel::AnalogInputOnDemand(_) => PortKind::AnalogInputOnDemand,
            Channel::AnalogInputSampling(_) => PortKind::AnalogInputSampling,
            Channel::PwmOutput => PortKind::PwmOutput,
            Channel::I2cMaster => PortKind::I2cMaster,
            Channel::SpiMaster => PortKind::SpiMaster,
        }
    }

    pub(crate) fn last_sample(&self) -> u32 {
        self.last_sample.load(Ordering::Acquire)
    }

    pub(crate) fn set_last_sample(&self, value: u32) {
        self.last_sample.store(value, Ordering::Release);
    }

    pub(crate) fn queue(&self) -> Option<&EventQueue> {
        match &self.channel {
            Channel::DigitalInputOnDemand(queue) | Channel::AnalogInputOnDemand(queue) => {
                Some(queue)
            }
            _ => None,
        }
    }

    /// Wakes any reader blocked on the port's queue. Called when the port is removed.
    pub(crate) fn release(&self) {
        if let Some(queue) = self.queue() {
            queue.close();
        }
    }
}

struct QueueState {
    events: VecDeque<PortEvent>,
    closed: bool,
}

/// Bounded FIFO of samples for on-demand inputs.
pub(crate) struct EventQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
}

impl EventQueue {
    pub(crate) fn new(capacity: usize) -> EventQueue {
        EventQueue {
            state: Mutex::new(QueueState {
                events: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends an event. Returns `false` if the queue is full or closed and the event was dropped.
    pub(crate) fn push(&self, event: PortEvent) -> bool {
        let mut state = lock(&self.state);
        if state.closed || state.events.len() >= self.capacity {
            return false;
        }
        state.events.push_back(event);
        self.available.notify_one();
        true
    }

    /// Blocks until an event is available. Fails with [Error::Cancelled] once the queue is closed.
    pub(crate) fn take(&self) -> Result<PortEvent> {
        let mut state = lock(&self.state);
        loop {
            if state.closed {
                return Err(Error::Cancelled);
            }
            if let Some(event) = state.events.pop_front() {
                return Ok(event);
            }
            state = wait(&self.available, state);
        }
    }

    pub(crate) fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.events.clear();
        self.available.notify_all();
    }
}
