use std::fmt::Display;

/// Size of the common message header in bytes.
pub const HEADER_LEN: usize = 8;
/// Size of a [ConfigRequest] on the wire.
pub const CONFIG_REQUEST_LEN: usize = 20;
/// Size of a [ConfigResponse] on the wire.
pub const CONFIG_RESPONSE_LEN: usize = 16;
/// Size of the fixed part of [PortRequest] and [PortEvent]; the payload follows.
pub const PORT_MESSAGE_FIXED_LEN: usize = 16;
/// Largest payload a port request or event can carry.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - PORT_MESSAGE_FIXED_LEN;

/// Request id reserved for the reset sent when a device is opened.
pub const RESET_REQUEST_ID: u16 = 0xffff;
/// Port id that never identifies a configured port.
pub const INVALID_PORT_ID: u16 = 0xffff;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, u8> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(other),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }
    };
}

wire_enum! {
    /// The `type` byte of the message header.
    MessageType {
        ConfigRequest = 1,
        ConfigResponse = 2,
        PortRequest = 3,
        PortEvent = 4,
    }
}

wire_enum! {
    /// Action carried by a [ConfigRequest].
    ConfigAction {
        /// Configure a pin or bus as a port. The device assigns the port id.
        ConfigurePort = 1,
        /// Release a port and free its pins.
        Release = 2,
        /// Reset the board to its initial configuration.
        Reset = 3,
        /// Configure a module shared by several ports (e.g. a PWM timer).
        ConfigureModule = 4,
        /// Query board information.
        Query = 5,
    }
}

wire_enum! {
    /// Action carried by a [PortRequest].
    PortAction {
        SetValue = 1,
        GetValue = 2,
        TxData = 3,
        RxData = 4,
        TxAndRxData = 5,
        Reset = 6,
    }
}

wire_enum! {
    /// Event code carried by a [PortEvent].
    PortEventCode {
        Idle = 0,
        SingleSample = 1,
        TxComplete = 2,
        DataReceived = 3,
        SetDone = 4,
        Error = 5,
    }
}

wire_enum! {
    /// Result code of a [ConfigResponse].
    ConfigResult {
        Ok = 0,
        InvalidData = 1,
        OutOfMemory = 2,
    }
}

wire_enum! {
    /// Port type selector of a `ConfigurePort` request.
    PortType {
        DigitalPin = 1,
        AnalogInput = 2,
        Pwm = 3,
        I2c = 4,
        Spi = 5,
    }
}

wire_enum! {
    /// Module selector of a `ConfigureModule` request.
    ModuleType {
        PwmTimer = 1,
        PwmChannel = 2,
    }
}

wire_enum! {
    /// Board information items that can be queried.
    BoardInfo {
        /// Available memory in bytes
        AvailableMemory = 1,
        /// Largest contiguous memory block in bytes
        LargestMemoryBlock = 2,
        /// Microcontroller board type
        Board = 3,
        /// Firmware version
        Version = 4,
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageType::ConfigRequest => "ConfigRequest",
            MessageType::ConfigResponse => "ConfigResponse",
            MessageType::PortRequest => "PortRequest",
            MessageType::PortEvent => "PortEvent",
        };
        f.write_str(name)
    }
}

/// Configures ports and modules, resets the board or queries board information.
/// Sent from the host to the device; answered by a [ConfigResponse] with the same request id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigRequest {
    /// Target port for `Release`, otherwise 0.
    pub port_id: u16,
    pub request_id: u16,
    pub action: ConfigAction,
    /// A [PortType], [ModuleType] or [BoardInfo] code depending on `action`.
    pub port_type: u8,
    pub pin_config: u16,
    pub attr1: u16,
    pub attr2: u16,
    pub value: u32,
}

impl ConfigRequest {
    pub fn new(action: ConfigAction) -> ConfigRequest {
        ConfigRequest {
            port_id: 0,
            request_id: 0,
            action,
            port_type: 0,
            pin_config: 0,
            attr1: 0,
            attr2: 0,
            value: 0,
        }
    }
}

/// Answer to a [ConfigRequest]. For `ConfigurePort`, the header carries the newly assigned port id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigResponse {
    pub port_id: u16,
    pub request_id: u16,
    /// Raw result code, see [ConfigResult].
    pub result: u8,
    pub optional: u16,
    pub value: u32,
}

impl ConfigResponse {
    /// Whether the device accepted the request.
    pub fn is_ok(&self) -> bool {
        self.result == ConfigResult::Ok as u8
    }
}

/// An operation on a configured port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortRequest {
    pub port_id: u16,
    pub request_id: u16,
    pub action: PortAction,
    pub attr1: u8,
    pub attr2: u16,
    pub value: u32,
    pub data: Box<[u8]>,
}

impl PortRequest {
    pub fn new(port_id: u16, action: PortAction) -> PortRequest {
        PortRequest {
            port_id,
            request_id: 0,
            action,
            attr1: 0,
            attr2: 0,
            value: 0,
            data: Box::default(),
        }
    }
}

/// A sample, completion or error reported by the device for a port.
/// Completions echo the request id of the [PortRequest] they complete.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortEvent {
    pub port_id: u16,
    pub request_id: u16,
    pub event: PortEventCode,
    pub attr1: u8,
    pub attr2: u16,
    pub value: u32,
    pub data: Box<[u8]>,
}

impl PortEvent {
    pub fn new(port_id: u16, event: PortEventCode) -> PortEvent {
        PortEvent {
            port_id,
            request_id: 0,
            event,
            attr1: 0,
            attr2: 0,
            value: 0,
            data: Box::default(),
        }
    }
}

/// One message of the Wirekite protocol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    ConfigRequest(ConfigRequest),
    ConfigResponse(ConfigResponse),
    PortRequest(PortRequest),
    PortEvent(PortEvent),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::ConfigRequest(_) => MessageType::ConfigRequest,
            Message::ConfigResponse(_) => MessageType::ConfigResponse,
            Message::PortRequest(_) => MessageType::PortRequest,
            Message::PortEvent(_) => MessageType::PortEvent,
        }
    }

    pub fn port_id(&self) -> u16 {
        match self {
            Message::ConfigRequest(m) => m.port_id,
            Message::ConfigResponse(m) => m.port_id,
            Message::PortRequest(m) => m.port_id,
            Message::PortEvent(m) => m.port_id,
        }
    }

    pub fn request_id(&self) -> u16 {
        match self {
            Message::ConfigRequest(m) => m.request_id,
            Message::ConfigResponse(m) => m.request_id,
            Message::PortRequest(m) => m.request_id,
            Message::PortEvent(m) => m.request_id,
        }
    }

    /// The variable-length payload of port requests and events; empty for config messages.
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::PortRequest(m) => &m.data[..],
            Message::PortEvent(m) => &m.data[..],
            Message::ConfigRequest(_) | Message::ConfigResponse(_) => &[],
        }
    }

    /// Number of bytes the message occupies on the wire, including the header.
    pub fn encoded_len(&self) -> usize {
        match self {
            Message::ConfigRequest(_) => CONFIG_REQUEST_LEN,
            Message::ConfigResponse(_) => CONFIG_RESPONSE_LEN,
            Message::PortRequest(m) => PORT_MESSAGE_FIXED_LEN + m.data.len(),
            Message::PortEvent(m) => PORT_MESSAGE_FIXED_LEN + m.data.len(),
        }
    }
}

impl From<ConfigRequest> for Message {
    fn from(value: ConfigRequest) -> Self {
        Message::ConfigRequest(value)
    }
}

impl From<ConfigResponse> for Message {
    fn from(value: ConfigResponse) -> Self {
        Message::ConfigResponse(value)
    }
}

impl From<PortRequest> for Message {
    fn from(value: PortRequest) -> Self {
        Message::PortRequest(value)
    }
}

impl From<PortEvent> for Message {
    fn from(value: PortEvent) -> Self {
        Message::PortEvent(value)
    }
}

#[test]
fn wire_enum_conversion() {
    assert_eq!(PortAction::try_from(5), Ok(PortAction::TxAndRxData));
    assert_eq!(PortAction::try_from(7), Err(7));
    assert_eq!(u8::from(ConfigAction::Query), 5);
    assert_eq!(PortEventCode::try_from(0), Ok(PortEventCode::Idle));
}

#[test]
fn encoded_len_includes_payload() {
    let mut request = PortRequest::new(3, PortAction::TxData);
    request.data = vec![1, 2, 3].into_boxed_slice();
    assert_eq!(Message::from(request).encoded_len(), 19);
    assert_eq!(
        Message::from(ConfigRequest::new(ConfigAction::Reset)).encoded_len(),
        20
    );
}
