use crate::{Device, Result, Transport};

/// Device memory the firmware sets aside for buffering requests, in bytes.
pub const DEFAULT_MEMORY_SIZE: usize = 4200;
/// Maximum number of throttled requests in flight.
pub const DEFAULT_MAX_OUTSTANDING_REQUESTS: usize = 20;

#[derive(Debug, Clone)]
pub struct Config {
    /// Budget of device memory for throttled (I2C and SPI) requests.
    pub memory_size: usize,
    /// Maximum number of throttled requests in flight.
    pub max_outstanding_requests: usize,
    /// Capacity of the sample queue of each on-demand input.
    pub event_queue_len: usize,
    /// Size of the buffer handed to [Transport::read].
    pub read_chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            max_outstanding_requests: DEFAULT_MAX_OUTSTANDING_REQUESTS,
            event_queue_len: 10,
            read_chunk_size: 64,
        }
    }
}

/// Builder to open a [Device] with modified configuration options
///
/// # Example
///
/// ```ignore
/// use wirekite_device::Builder;
///
/// let device = Builder::new()
///     .memory_size(20000)
///     .max_outstanding_requests(100)
///     .open(transport)?;
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the amount of device memory available for buffering I2C and SPI requests.
    pub fn memory_size(mut self, size: usize) -> Self {
        self.config.memory_size = size;
        self
    }

    /// Set the maximum number of outstanding I2C and SPI requests.
    pub fn max_outstanding_requests(mut self, count: usize) -> Self {
        self.config.max_outstanding_requests = count;
        self
    }

    /// Set how many unread samples an on-demand input port keeps.
    pub fn event_queue_len(mut self, len: usize) -> Self {
        self.config.event_queue_len = len;
        self
    }

    /// Set the size of the receive buffer.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size;
        self
    }

    /// Returns the configuration assembled so far.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the device on the given transport and reset it.
    pub fn open<T: Transport>(self, transport: T) -> Result<Device> {
        Device::open(transport, self.config)
    }
}
