use std::{
    collections::HashMap,
    io,
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        mpsc::{Receiver, Sender},
    },
    thread,
    time::{Duration, Instant},
};

use wirekite_protocol::{
    BoardInfo, ConfigAction, ConfigRequest, ConfigResponse, ConfigResult, INVALID_PORT_ID,
    Message, PortAction, PortEvent, PortEventCode, PortRequest, PortType,
};

use crate::{
    board::{Board, PortConfig, Transfer, VirtualBoard},
    pipe::{BoardEnd, Packet, PipeTransport, pipe},
};

#[derive(Debug, Clone)]
pub struct Config {
    /// Largest chunk the board sends at once. The real hardware uses 64 byte packets.
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { chunk_size: 64 }
    }
}

/// Builder to create a [Simulator] and the transport connected to it
///
/// # Example
///
/// ```
/// use wirekite_sim::{VirtualBoard, simulator::Builder};
///
/// let (simulator, transport) = Builder::new()
///     .chunk_size(3)
///     .build(VirtualBoard::new())
///     .unwrap();
/// # drop(transport);
/// # drop(simulator);
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Split the data sent to the host into chunks of at most `size` bytes.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size.max(1);
        self
    }

    /// Start the simulator thread and return the host end of the pipe.
    pub fn build<B: Board>(self, board: B) -> io::Result<(Simulator<B>, PipeTransport)> {
        Simulator::start(board, self.config)
    }
}

struct State<B> {
    board: B,
    ports: HashMap<u16, PortConfig>,
    next_port_id: u16,
    /// Every request received from the host, in order.
    requests: Vec<Message>,
    holding: bool,
    held: Vec<PortEvent>,
    /// Requests are recorded but not answered.
    stalled: bool,
    connected: bool,
}

struct Shared<B> {
    state: Mutex<State<B>>,
    changed: Condvar,
    events: Sender<Packet>,
    config: Config,
}

/// A simulated Wirekite board running on its own thread.
///
/// Besides answering the host's requests, the simulator lets tests change inputs,
/// hold back transaction completions and unplug the board.
pub struct Simulator<B: Board = VirtualBoard> {
    shared: Arc<Shared<B>>,
}

impl Simulator<VirtualBoard> {
    /// Starts a [VirtualBoard] with the default configuration.
    pub fn spawn() -> io::Result<(Simulator<VirtualBoard>, PipeTransport)> {
        Builder::new().build(VirtualBoard::new())
    }
}

impl<B: Board> Simulator<B> {
    fn start(board: B, config: Config) -> io::Result<(Simulator<B>, PipeTransport)> {
        let (transport, BoardEnd { requests, events }) = pipe();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                board,
                ports: HashMap::new(),
                next_port_id: 1,
                requests: Vec::new(),
                holding: false,
                stalled: false,
                held: Vec::new(),
                connected: true,
            }),
            changed: Condvar::new(),
            events,
            config,
        });
        {
            let shared = shared.clone();
            thread::Builder::new()
                .name("wirekite-sim".to_string())
                .spawn(move || shared.run(requests))?;
        }
        log::info!("Simulated board started");
        Ok((Simulator { shared }, transport))
    }

    /// Gives access to the board, e.g. to attach I2C slaves.
    pub fn with_board<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.shared.lock().board)
    }

    /// Changes the level of a digital input pin and reports it to the host
    /// on every port triggering on the new level.
    pub fn set_digital_input(&self, pin: u16, level: bool) {
        let mut state = self.shared.lock();
        state.board.set_input(pin, level as u32);
        let events: Vec<Message> = state
            .ports
            .values()
            .filter(|port| port.pin_config == pin && port.triggers_on(level))
            .map(|port| sample_event(port.id, level as u32).into())
            .collect();
        self.shared.emit(&state, events);
    }

    /// Changes the raw value of an analog input pin.
    pub fn set_analog_input(&self, pin: u16, raw: u32) {
        self.shared.lock().board.set_input(pin, raw);
    }

    /// Sends one sample for every sampling analog input, as if their intervals had elapsed.
    pub fn sample_analog_inputs(&self) {
        let mut state = self.shared.lock();
        let sampling: Vec<PortConfig> = state
            .ports
            .values()
            .filter(|port| port.is_sampling())
            .cloned()
            .collect();
        let events: Vec<Message> = sampling
            .iter()
            .map(|port| sample_event(port.id, state.board.read_value(port)).into())
            .collect();
        self.shared.emit(&state, events);
    }

    /// Sends an arbitrary event to the host.
    pub fn send_event(&self, event: PortEvent) {
        let state = self.shared.lock();
        self.shared.emit(&state, vec![event.into()]);
    }

    /// Sends raw bytes to the host, split into chunks like regular messages.
    pub fn send_raw(&self, bytes: &[u8]) {
        let state = self.shared.lock();
        self.shared.send_bytes(&state, bytes);
    }

    /// Holds back the completions of bus transactions until they are released.
    pub fn hold_completions(&self) {
        self.shared.lock().holding = true;
    }

    /// Sends the held completions in reverse order. Later completions are still held.
    /// Returns the number of completions sent.
    pub fn release_completions(&self) -> usize {
        let mut state = self.shared.lock();
        let held: Vec<Message> = state.held.drain(..).rev().map(Message::from).collect();
        let count = held.len();
        log::debug!("Releasing {} held completions", count);
        self.shared.emit(&state, held);
        count
    }

    /// Stops holding completions and sends the held ones.
    pub fn resume_completions(&self) -> usize {
        self.shared.lock().holding = false;
        self.release_completions()
    }

    /// Keeps recording requests but stops answering them, like a hung board.
    pub fn stall(&self) {
        self.shared.lock().stalled = true;
    }

    pub fn held_completions(&self) -> usize {
        self.shared.lock().held.len()
    }

    /// Waits until at least `count` completions are held. Returns `false` on timeout.
    pub fn wait_for_held_completions(&self, count: usize, timeout: Duration) -> bool {
        self.shared.wait_until(timeout, |state| state.held.len() >= count)
    }

    /// Waits until the host has sent at least `count` requests. Returns `false` on timeout.
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        self.shared
            .wait_until(timeout, |state| state.requests.len() >= count)
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<Message> {
        self.shared.lock().requests.clone()
    }

    /// The ports currently configured, ordered by id.
    pub fn ports(&self) -> Vec<PortConfig> {
        let state = self.shared.lock();
        let mut ports: Vec<_> = state.ports.values().cloned().collect();
        ports.sort_by_key(|port| port.id);
        ports
    }

    /// Unplugs the board. The host's reads fail and nothing is answered anymore.
    pub fn disconnect(&self) {
        let mut state = self.shared.lock();
        if !state.connected {
            return;
        }
        state.connected = false;
        log::info!("Simulated board disconnected");
        let _ = self.shared.events.send(Packet::Closed);
        self.shared.changed.notify_all();
    }
}

impl<B: Board> Drop for Simulator<B> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn sample_event(port_id: u16, value: u32) -> PortEvent {
    let mut event = PortEvent::new(port_id, PortEventCode::SingleSample);
    event.value = value;
    event
}

impl<B: Board> Shared<B> {
    fn lock(&self) -> MutexGuard<'_, State<B>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&State<B>) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while !done(&state) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Serves host requests until the host closes its end of the pipe.
    fn run(&self, requests: Receiver<Vec<u8>>) {
        for bytes in requests {
            let message = match Message::from_bytes(&bytes) {
                Ok(message) => message,
                Err(e) => {
                    log::error!("Simulator received malformed message: {}", e);
                    continue;
                }
            };
            let mut state = self.lock();
            if !state.connected {
                continue;
            }
            log::trace!("Simulator received {:?}", message);
            state.requests.push(message.clone());
            if !state.stalled {
                let replies = state.process(message);
                self.emit(&state, replies);
            }
            self.changed.notify_all();
        }
        log::debug!("Simulator stopped");
    }

    /// Encodes `messages` back to back and sends them to the host.
    fn emit(&self, state: &State<B>, messages: Vec<Message>) {
        let mut bytes = Vec::new();
        for message in &messages {
            match message.to_bytes() {
                Ok(encoded) => bytes.extend_from_slice(&encoded),
                Err(e) => log::error!("Simulator cannot encode {:?}: {}", message, e),
            }
        }
        self.send_bytes(state, &bytes);
    }

    fn send_bytes(&self, state: &State<B>, bytes: &[u8]) {
        if !state.connected {
            return;
        }
        for chunk in bytes.chunks(self.config.chunk_size) {
            if self.events.send(Packet::Data(chunk.to_vec())).is_err() {
                log::debug!("Host end of the pipe is gone");
                return;
            }
        }
    }
}

impl<B: Board> State<B> {
    fn process(&mut self, message: Message) -> Vec<Message> {
        match message {
            Message::ConfigRequest(request) => vec![self.handle_config_request(request).into()],
            Message::PortRequest(request) => self
                .handle_port_request(request)
                .into_iter()
                .map(Message::from)
                .collect(),
            other => {
                log::warn!("Simulator ignoring {} message", other.message_type());
                Vec::new()
            }
        }
    }

    fn allocate_port_id(&mut self) -> u16 {
        loop {
            let id = self.next_port_id;
            self.next_port_id = match id.wrapping_add(1) {
                0 | INVALID_PORT_ID => 1,
                next => next,
            };
            if !self.ports.contains_key(&id) {
                return id;
            }
        }
    }

    fn handle_config_request(&mut self, request: ConfigRequest) -> ConfigResponse {
        let mut response = ConfigResponse {
            port_id: request.port_id,
            request_id: request.request_id,
            result: 0,
            optional: 0,
            value: 0,
        };
        log::debug!(
            "Simulator config request {}: {:?}",
            request.request_id,
            request.action
        );
        let result = match request.action {
            ConfigAction::Reset => {
                self.board.reset();
                self.ports.clear();
                self.held.clear();
                self.next_port_id = 1;
                Ok(())
            }
            ConfigAction::ConfigurePort => match PortType::try_from(request.port_type) {
                Ok(port_type) => {
                    let id = self.allocate_port_id();
                    let port = PortConfig::from_request(id, port_type, &request);
                    match self.board.configure_port(&port) {
                        Ok(optional) => {
                            response.port_id = id;
                            response.optional = optional;
                            self.ports.insert(id, port);
                            Ok(())
                        }
                        Err(code) => Err(code),
                    }
                }
                Err(_) => Err(ConfigResult::InvalidData),
            },
            ConfigAction::Release => match self.ports.remove(&request.port_id) {
                Some(port) => {
                    self.board.release_port(&port);
                    Ok(())
                }
                None => Err(ConfigResult::InvalidData),
            },
            ConfigAction::ConfigureModule => self.board.configure_module(&request),
            ConfigAction::Query => match BoardInfo::try_from(request.port_type) {
                Ok(item) => {
                    response.value = self.board.query(item);
                    Ok(())
                }
                Err(_) => Err(ConfigResult::InvalidData),
            },
        };
        if let Err(code) = result {
            response.result = code.into();
        }
        response
    }

    fn handle_port_request(&mut self, request: PortRequest) -> Option<PortEvent> {
        let Some(port) = self.ports.get(&request.port_id).cloned() else {
            log::warn!("Simulator got request for unknown port {}", request.port_id);
            return None;
        };
        let mut event = PortEvent::new(port.id, PortEventCode::SingleSample);
        event.request_id = request.request_id;

        let address = request.attr2;
        let transfer = match request.action {
            PortAction::SetValue => {
                self.board.write_value(&port, request.value);
                return None;
            }
            PortAction::GetValue => {
                event.value = self.board.read_value(&port);
                return Some(event);
            }
            PortAction::TxData => Transfer::Transmit {
                address,
                data: &request.data,
            },
            PortAction::RxData => Transfer::Receive {
                address,
                len: request.value as usize,
            },
            PortAction::TxAndRxData => Transfer::TransmitAndReceive {
                address,
                data: &request.data,
                len: request.value as usize,
            },
            PortAction::Reset => Transfer::ResetBus,
        };
        let result = self.board.transfer(&port, transfer);
        event.event = match transfer {
            Transfer::Receive { .. } | Transfer::TransmitAndReceive { .. } => {
                PortEventCode::DataReceived
            }
            Transfer::Transmit { .. } | Transfer::ResetBus => PortEventCode::TxComplete,
        };
        event.attr1 = result.status;
        event.attr2 = match event.event {
            PortEventCode::DataReceived => result.received.len() as u16,
            _ => result.transmitted as u16,
        };
        event.data = result.received.into_boxed_slice();

        if self.holding {
            self.held.push(event);
            None
        } else {
            Some(event)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use wirekite_device::Transport;
    use wirekite_protocol::reassembler::Reassembler;

    fn read_messages(transport: &PipeTransport, count: usize) -> Vec<Message> {
        let mut reassembler = Reassembler::new();
        let mut messages = Vec::new();
        let mut buf = [0u8; 64];
        while messages.len() < count {
            let len = transport.read(&mut buf).unwrap();
            let mut pos = 0;
            while let Some(bytes) = reassembler.next_message(&buf[..len], &mut pos).unwrap() {
                messages.push(Message::from_bytes(&bytes).unwrap());
            }
        }
        messages
    }

    fn read_message(transport: &PipeTransport) -> Message {
        read_messages(transport, 1).remove(0)
    }

    fn send(transport: &PipeTransport, message: impl Into<Message>) {
        transport
            .write(&message.into().to_bytes().unwrap())
            .unwrap();
    }

    #[test]
    fn configure_and_read_digital_input() {
        let (simulator, transport) = Builder::new().chunk_size(5).build(VirtualBoard::new()).unwrap();
        simulator.set_digital_input(7, true);

        let mut request = ConfigRequest::new(ConfigAction::ConfigurePort);
        request.request_id = 1;
        request.port_type = PortType::DigitalPin.into();
        request.pin_config = 7;
        send(&transport, request);
        let Message::ConfigResponse(response) = read_message(&transport) else {
            panic!("expected config response");
        };
        assert_eq!(response.request_id, 1);
        assert_eq!(response.port_id, 1);
        assert_eq!(response.optional, 1);

        let mut request = PortRequest::new(1, PortAction::GetValue);
        request.request_id = 2;
        send(&transport, request);
        match read_message(&transport) {
            Message::PortEvent(event) => {
                assert_eq!(event.request_id, 2);
                assert_eq!(event.event, PortEventCode::SingleSample);
                assert_eq!(event.value, 1);
            }
            other => panic!("expected port event, got {:?}", other),
        }
    }

    #[test]
    fn held_completions_are_released_in_reverse() {
        let (simulator, transport) = Simulator::spawn().unwrap();
        let mut request = ConfigRequest::new(ConfigAction::ConfigurePort);
        request.request_id = 1;
        request.port_type = PortType::Spi.into();
        send(&transport, request);
        read_message(&transport);

        simulator.hold_completions();
        for request_id in [10, 11] {
            let mut request = PortRequest::new(1, PortAction::TxData);
            request.request_id = request_id;
            request.data = vec![1, 2, 3].into();
            send(&transport, request);
        }
        assert!(simulator.wait_for_held_completions(2, Duration::from_secs(5)));
        assert_eq!(simulator.release_completions(), 2);

        let completions = read_messages(&transport, 2);
        assert_eq!(completions[0].request_id(), 11);
        assert_eq!(completions[1].request_id(), 10);
    }

    #[test]
    fn stalled_board_records_without_answering() {
        let (simulator, transport) = Simulator::spawn().unwrap();
        simulator.stall();
        send(&transport, ConfigRequest::new(ConfigAction::Reset));
        assert!(simulator.wait_for_requests(1, Duration::from_secs(5)));
        simulator.disconnect();
        assert!(transport.read(&mut [0u8; 16]).is_err());
    }

    #[test]
    fn release_of_unknown_port_is_rejected() {
        let (_simulator, transport) = Simulator::spawn().unwrap();
        let mut request = ConfigRequest::new(ConfigAction::Release);
        request.request_id = 4;
        request.port_id = 9;
        send(&transport, request);
        match read_message(&transport) {
            Message::ConfigResponse(response) => {
                assert_eq!(response.result, u8::from(ConfigResult::InvalidData))
            }
            other => panic!("expected config response, got {:?}", other),
        }
    }
}
