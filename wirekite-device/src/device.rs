use std::{
    sync::{Arc, Mutex, RwLock},
    thread::{self, JoinHandle},
};

use wirekite_protocol::{
    BoardInfo, ConfigAction, ConfigRequest, ConfigResponse, INVALID_PORT_ID, Message,
    PortEvent, PortEventCode, PortRequest, RESET_REQUEST_ID, reassembler::Reassembler,
};

use crate::{
    Config, Error, Result, Transport,
    analog::analog_value,
    pending::PendingRequests,
    port::{Channel, EventQueue, Port, PortKind},
    registry::PortRegistry,
    sync::{lock, read, write},
    throttler::{Throttler, check_limit},
    transport::is_transient,
};

/// Connection state of a [Device]. `Closed` is terminal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceState {
    Initializing,
    Ready,
    Closed,
}

/// State shared between the application threads and the receive thread.
struct Shared {
    transport: Box<dyn Transport>,
    config: Config,
    state: Mutex<DeviceState>,
    ports: PortRegistry,
    pending: PendingRequests,
    throttler: Throttler,
    /// Held for writing by resets, which all use [RESET_REQUEST_ID], and for reading
    /// while a port is configured or released. Keeps the board's port ids and the
    /// registry in step.
    reset: RwLock<()>,
}

/// A connected Wirekite board.
///
/// All operations take `&self` and may be called from any number of threads.
/// Responses are matched to requests by request id, so concurrent callers never
/// receive each other's results. Dropping the device closes it.
pub struct Device {
    shared: Arc<Shared>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl Device {
    /// Opens the device on `transport`: starts the receive thread and resets the board.
    ///
    /// Returns once the board has acknowledged the reset.
    pub fn open<T: Transport>(transport: T, config: Config) -> Result<Device> {
        log::debug!(
            "Opening device: memory_size={}, max_outstanding_requests={}",
            config.memory_size,
            config.max_outstanding_requests
        );
        check_limit(config.max_outstanding_requests)?;
        let shared = Arc::new(Shared {
            transport: Box::new(transport),
            throttler: Throttler::new(config.memory_size, config.max_outstanding_requests),
            config,
            state: Mutex::new(DeviceState::Initializing),
            ports: PortRegistry::new(),
            pending: PendingRequests::new(),
            reset: RwLock::new(()),
        });

        let receiver = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("wirekite-rx".to_string())
                .spawn(move || shared.receive_loop())?
        };
        let device = Device {
            shared,
            receiver: Mutex::new(Some(receiver)),
        };

        device.reset_configuration()?;
        {
            let mut state = lock(&device.shared.state);
            if *state == DeviceState::Closed {
                return Err(Error::Closed);
            }
            *state = DeviceState::Ready;
        }
        log::info!("Wirekite device ready");
        Ok(device)
    }

    /// Closes the device.
    ///
    /// All ports become invalid and every blocked call returns [Error::Closed].
    /// A closed device cannot be reopened; open a new one on a fresh transport.
    pub fn close(&self) {
        self.shared.shutdown();
        let receiver = lock(&self.receiver).take();
        if let Some(receiver) = receiver {
            // Close may be called from a callback running on the receive thread.
            if receiver.thread().id() != thread::current().id() && receiver.join().is_err() {
                log::error!("Receive thread panicked");
            }
        }
    }

    /// Indicates if the device has been closed or unplugged.
    pub fn is_closed(&self) -> bool {
        self.state() == DeviceState::Closed
    }

    pub fn state(&self) -> DeviceState {
        *lock(&self.shared.state)
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Resets the board to its initial configuration.
    ///
    /// All configured ports become invalid; calls blocked on them return [Error::Cancelled]
    /// or [Error::InvalidPort].
    pub fn reset_configuration(&self) -> Result<()> {
        let _guard = write(&self.shared.reset);
        let mut request = ConfigRequest::new(ConfigAction::Reset);
        request.request_id = RESET_REQUEST_ID;
        self.send_config_request(request)?;

        self.shared.ports.clear();
        self.shared.pending.clear();
        self.shared.throttler.clear();
        log::info!("Device configuration reset");
        Ok(())
    }

    /// Configures the flow control of data intensive ports (I2C and SPI).
    ///
    /// The board has limited memory to buffer requests and the payloads sent or
    /// received on I2C and SPI. Requests on these ports block until enough of the
    /// earlier ones have completed for the new one to fit into `memory_size` and
    /// to keep the number of requests in flight below `max_outstanding_requests`.
    ///
    /// Fails with [Error::InvalidArgument] if `max_outstanding_requests` is zero and with
    /// [Error::ResourceExhausted] if `memory_size` is below the memory currently reserved.
    pub fn configure_flow_control(
        &self,
        memory_size: usize,
        max_outstanding_requests: usize,
    ) -> Result<()> {
        log::debug!(
            "Flow control: memory_size={}, max_outstanding_requests={}",
            memory_size,
            max_outstanding_requests
        );
        self.shared
            .throttler
            .configure(memory_size, max_outstanding_requests)
    }

    /// Device memory currently reserved by throttled requests in flight.
    pub fn reserved_memory(&self) -> usize {
        self.shared.throttler.reserved_bytes()
    }

    /// Number of throttled requests in flight.
    pub fn outstanding_requests(&self) -> usize {
        self.shared.throttler.outstanding_requests()
    }

    /// Queries information about the connected board.
    pub fn board_info(&self, item: BoardInfo) -> Result<u32> {
        let mut request = ConfigRequest::new(ConfigAction::Query);
        request.port_type = item.into();
        Ok(self.send_config_request(request)?.value)
    }

    /// The kind of a configured port, or `None` if the id is unknown.
    pub fn port_kind(&self, port_id: u16) -> Option<PortKind> {
        self.shared.ports.get(port_id).map(|port| port.kind())
    }

    /// Number of currently configured ports.
    pub fn port_count(&self) -> usize {
        self.shared.ports.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    /// Looks up a configured port whose kind satisfies `accepts`.
    pub(crate) fn port_of(&self, port_id: u16, accepts: fn(PortKind) -> bool) -> Result<Arc<Port>> {
        self.ensure_open()?;
        match self.shared.ports.get(port_id) {
            Some(port) if accepts(port.kind()) => Ok(port),
            _ => Err(Error::InvalidPort(port_id)),
        }
    }

    /// Sends a `ConfigurePort` request and registers the port assigned by the board.
    pub(crate) fn configure_port(
        &self,
        request: ConfigRequest,
        channel: Channel,
        initial_sample: impl FnOnce(&ConfigResponse) -> u32,
    ) -> Result<u16> {
        let _guard = read(&self.shared.reset);
        let response = self.send_config_request(request)?;
        let port_id = response.port_id;
        if port_id == 0 || port_id == INVALID_PORT_ID {
            return Err(Error::UnexpectedResponse);
        }
        let port = Port::new(port_id, channel, initial_sample(&response));
        log::info!("Configured port {} as {}", port_id, port.kind());
        self.shared.ports.add(port);
        Ok(port_id)
    }

    /// Releases a port on the board and forgets it locally.
    pub(crate) fn release_port(&self, port_id: u16, accepts: fn(PortKind) -> bool) -> Result<()> {
        let _guard = read(&self.shared.reset);
        let port = self.port_of(port_id, accepts)?;
        let mut request = ConfigRequest::new(ConfigAction::Release);
        request.port_id = port_id;
        self.send_config_request(request)?;
        self.shared.ports.remove_port(&port);
        log::info!("Released port {}", port_id);
        Ok(())
    }

    pub(crate) fn new_event_queue(&self) -> EventQueue {
        EventQueue::new(self.shared.config.event_queue_len)
    }

    /// Blocks until the next sample of an on-demand input arrives.
    pub(crate) fn take_sample(&self, port: &Port, queue: &EventQueue) -> Result<PortEvent> {
        queue.take().map_err(|_| {
            if self.is_closed() {
                Error::Closed
            } else {
                Error::InvalidPort(port.id())
            }
        })
    }

    fn encode(message: &Message) -> Result<Vec<u8>> {
        message
            .to_bytes()
            .map_err(|e| Error::InvalidArgument(e.to_string()))
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        log::trace!("Sending {:02x?}", bytes);
        self.shared.transport.write(bytes).map_err(|e| {
            if self.is_closed() {
                return Error::Closed;
            }
            log::error!("Writing to device failed: {}", e);
            self.shared.shutdown();
            Error::Transport(e)
        })
    }

    /// Sends a configuration request and waits for the response.
    /// A response with a non-zero result code fails with [Error::Configuration].
    pub(crate) fn send_config_request(&self, mut request: ConfigRequest) -> Result<ConfigResponse> {
        self.ensure_open()?;
        if request.request_id == 0 {
            request.request_id = self.shared.ports.next_request_id();
        }
        let request_id = request.request_id;
        log::debug!(
            "ConfigRequest {}: action={:?}, port_type={}, pin_config={}, port={}",
            request_id,
            request.action,
            request.port_type,
            request.pin_config,
            request.port_id
        );
        let bytes = Self::encode(&Message::ConfigRequest(request))?;

        self.shared.pending.announce_request(request_id)?;
        if let Err(e) = self.write_bytes(&bytes) {
            self.shared.pending.withdraw(request_id);
            return Err(e);
        }
        match self.shared.pending.wait_for_response(request_id)? {
            Message::ConfigResponse(response) if response.is_ok() => {
                log::debug!(
                    "ConfigResponse {}: port={}, optional={}, value={}",
                    request_id,
                    response.port_id,
                    response.optional,
                    response.value
                );
                Ok(response)
            }
            Message::ConfigResponse(response) => {
                log::debug!("ConfigRequest {} failed with code {}", request_id, response.result);
                Err(Error::Configuration {
                    code: response.result,
                })
            }
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Sends a port request without waiting for its completion.
    ///
    /// With `throttle` set, the call first blocks until the flow control admits the
    /// request; the value is the number of bytes the board must buffer for the answer.
    pub(crate) fn submit_port_request(
        &self,
        mut request: PortRequest,
        throttle: Option<usize>,
    ) -> Result<u16> {
        self.ensure_open()?;
        let request_id = self.shared.ports.next_request_id();
        request.request_id = request_id;
        log::debug!(
            "Submit PortRequest {}: port={}, action={:?}, len={}",
            request_id,
            request.port_id,
            request.action,
            request.data.len()
        );
        let message = Message::PortRequest(request);
        let bytes = Self::encode(&message)?;
        if let Some(receive_len) = throttle {
            self.shared
                .throttler
                .wait_until_available(request_id, bytes.len() + receive_len)?;
        }
        if let Err(e) = self.write_bytes(&bytes) {
            self.shared.throttler.request_completed(request_id);
            return Err(e);
        }
        Ok(request_id)
    }

    /// Sends a port request and waits for the event completing it.
    pub(crate) fn send_port_request(
        &self,
        mut request: PortRequest,
        throttle: Option<usize>,
    ) -> Result<PortEvent> {
        self.ensure_open()?;
        let request_id = self.shared.ports.next_request_id();
        request.request_id = request_id;
        log::debug!(
            "Send PortRequest {}: port={}, action={:?}, len={}",
            request_id,
            request.port_id,
            request.action,
            request.data.len()
        );
        let bytes = Self::encode(&Message::PortRequest(request))?;
        if let Some(receive_len) = throttle {
            self.shared
                .throttler
                .wait_until_available(request_id, bytes.len() + receive_len)?;
        }
        let sent = self
            .shared
            .pending
            .announce_request(request_id)
            .and_then(|()| self.write_bytes(&bytes));
        if let Err(e) = sent {
            self.shared.pending.withdraw(request_id);
            self.shared.throttler.request_completed(request_id);
            return Err(e);
        }
        match self.shared.pending.wait_for_response(request_id)? {
            Message::PortEvent(event) => {
                log::debug!(
                    "PortEvent {}: port={}, event={:?}, attr1={}, attr2={}, len={}",
                    request_id,
                    event.port_id,
                    event.event,
                    event.attr1,
                    event.attr2,
                    event.data.len()
                );
                Ok(event)
            }
            _ => Err(Error::UnexpectedResponse),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn state(&self) -> DeviceState {
        *lock(&self.state)
    }

    fn is_closed(&self) -> bool {
        self.state() == DeviceState::Closed
    }

    /// Transitions to `Closed` and releases everything that might be blocked.
    fn shutdown(&self) {
        {
            let mut state = lock(&self.state);
            if *state == DeviceState::Closed {
                return;
            }
            *state = DeviceState::Closed;
        }
        log::info!("Closing Wirekite device");
        self.ports.clear();
        self.pending.close();
        self.throttler.close();
        self.transport.close();
    }

    /// Reads chunks until the transport fails or the device is closed.
    fn receive_loop(&self) {
        let mut buf = vec![0u8; self.config.read_chunk_size.max(2)];
        let mut reassembler = Reassembler::new();
        loop {
            if self.is_closed() {
                break;
            }
            let len = match self.transport.read(&mut buf) {
                Ok(len) => len,
                Err(e) if is_transient(&e) => continue,
                Err(e) => {
                    if !self.is_closed() {
                        log::error!("Reading from device failed: {}", e);
                    }
                    self.shutdown();
                    break;
                }
            };
            let chunk = &buf[..len];
            log::trace!("Received chunk {:02x?}", chunk);

            let mut pos = 0;
            loop {
                let result = match reassembler.next_message(chunk, &mut pos) {
                    Ok(Some(bytes)) => Message::from_bytes(&bytes)
                        .map_err(Error::from)
                        .and_then(|message| self.dispatch(message)),
                    Ok(None) => break,
                    Err(e) => Err(Error::from(e)),
                };
                if let Err(e) = result {
                    log::error!("Closing device after protocol error: {}", e);
                    self.shutdown();
                    return;
                }
            }
        }
        log::debug!("Receive thread finished");
    }

    /// Routes one decoded message from the board.
    fn dispatch(&self, message: Message) -> Result<()> {
        match message {
            Message::ConfigResponse(response) => {
                let state = self.state();
                if state == DeviceState::Ready || response.request_id == RESET_REQUEST_ID {
                    self.pending
                        .put_response(response.request_id, Message::ConfigResponse(response));
                }
                Ok(())
            }
            Message::PortEvent(event) => {
                if self.state() == DeviceState::Ready {
                    self.handle_port_event(event);
                }
                Ok(())
            }
            Message::ConfigRequest(_) | Message::PortRequest(_) => {
                log::error!("Device sent a {} message", message.message_type());
                Err(Error::UnexpectedResponse)
            }
        }
    }

    fn handle_port_event(&self, event: PortEvent) {
        let Some(port) = self.ports.get(event.port_id) else {
            log::warn!("Port event received for invalid port ID {}", event.port_id);
            return;
        };

        let is_sample = event.event == PortEventCode::SingleSample;
        match port.channel() {
            Channel::DigitalInputOnDemand(queue) | Channel::AnalogInputOnDemand(queue) => {
                if is_sample && !queue.push(event) {
                    log::warn!("Sample queue of port {} is full, dropping sample", port.id());
                }
            }
            Channel::DigitalInputPrecached => {
                if is_sample {
                    port.set_last_sample(event.value);
                }
            }
            Channel::DigitalInputTriggering(callback) => {
                if is_sample {
                    port.set_last_sample(event.value);
                    callback(port.id(), event.value != 0);
                }
            }
            Channel::AnalogInputSampling(callback) => {
                if is_sample {
                    port.set_last_sample(event.value);
                    callback(port.id(), analog_value(event.value));
                }
            }
            Channel::I2cMaster | Channel::SpiMaster => {
                port.set_last_sample(event.attr1 as u32);
                if event.attr1 != 0 {
                    log::warn!(
                        "Transaction {} on port {} failed with status {}",
                        event.request_id,
                        port.id(),
                        event.attr1
                    );
                }
                if event.request_id != 0 {
                    self.throttler.request_completed(event.request_id);
                    self.pending
                        .put_response(event.request_id, Message::PortEvent(event));
                }
            }
            Channel::DigitalOutput | Channel::PwmOutput => {
                if event.request_id != 0 {
                    self.throttler.request_completed(event.request_id);
                    self.pending
                        .put_response(event.request_id, Message::PortEvent(event));
                }
            }
        }
    }
}
