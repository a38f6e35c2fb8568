/// Read and write implementations for the protocol messages
use std::io::{self, ErrorKind, Read, Write};

use crate::{
    error::ReadError,
    protocol::{
        CONFIG_REQUEST_LEN, CONFIG_RESPONSE_LEN, ConfigAction, ConfigRequest, ConfigResponse,
        HEADER_LEN, Message, MessageType, PORT_MESSAGE_FIXED_LEN, PortAction, PortEvent,
        PortEventCode, PortRequest,
    },
};

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Reads the length prefix of a message. `buf` must hold at least two bytes.
pub fn peek_message_size(buf: &[u8]) -> usize {
    get_u16(buf, 0) as usize
}

impl Message {
    /// Serializes the message, computing the size field from the payload.
    ///
    /// Fails with [ErrorKind::InvalidInput] if the payload does not fit the 16 bit size field.
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        let size = self.encoded_len();
        let size = u16::try_from(size).map_err(|_| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("Message too large! Maximum is {}, but got {}", u16::MAX, size),
            )
        })?;

        let mut fixed = [0u8; CONFIG_REQUEST_LEN];
        put_u16(&mut fixed, 0, size);
        fixed[2] = self.message_type().into();
        put_u16(&mut fixed, 4, self.port_id());
        put_u16(&mut fixed, 6, self.request_id());

        let fixed_len = match self {
            Message::ConfigRequest(m) => {
                fixed[8] = m.action.into();
                fixed[9] = m.port_type;
                put_u16(&mut fixed, 10, m.pin_config);
                put_u32(&mut fixed, 12, m.value);
                put_u16(&mut fixed, 16, m.attr1);
                put_u16(&mut fixed, 18, m.attr2);
                CONFIG_REQUEST_LEN
            }
            Message::ConfigResponse(m) => {
                fixed[8] = m.result;
                put_u16(&mut fixed, 10, m.optional);
                put_u32(&mut fixed, 12, m.value);
                CONFIG_RESPONSE_LEN
            }
            Message::PortRequest(m) => {
                fixed[8] = m.action.into();
                fixed[9] = m.attr1;
                put_u16(&mut fixed, 10, m.attr2);
                put_u32(&mut fixed, 12, m.value);
                PORT_MESSAGE_FIXED_LEN
            }
            Message::PortEvent(m) => {
                fixed[8] = m.event.into();
                fixed[9] = m.attr1;
                put_u16(&mut fixed, 10, m.attr2);
                put_u32(&mut fixed, 12, m.value);
                PORT_MESSAGE_FIXED_LEN
            }
        };

        writer.write_all(&fixed[..fixed_len])?;
        let payload = self.payload();
        if !payload.is_empty() {
            writer.write_all(payload)?;
        }
        Ok(())
    }

    /// Serializes the message into a freshly allocated buffer.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Serializes the message into `buf` starting at `offset` and returns the number of bytes written.
    pub fn encode_at(&self, buf: &mut [u8], offset: usize) -> io::Result<usize> {
        let mut target = buf.get_mut(offset..).ok_or_else(|| {
            io::Error::new(ErrorKind::InvalidInput, "Offset beyond end of buffer")
        })?;
        self.write_to(&mut target)?;
        Ok(self.encoded_len())
    }

    /// Decodes a single message from the start of `buf`.
    ///
    /// Exactly the number of bytes declared in the size field are consumed; any bytes beyond are ignored.
    pub fn from_bytes(buf: &[u8]) -> Result<Message, ReadError> {
        if buf.len() < HEADER_LEN {
            return Err(ReadError::Truncated {
                expected: HEADER_LEN,
                got: buf.len(),
            });
        }
        let size = peek_message_size(buf);
        if size < HEADER_LEN {
            return Err(ReadError::InvalidSize {
                message_type: None,
                size,
            });
        }
        if buf.len() < size {
            return Err(ReadError::Truncated {
                expected: size,
                got: buf.len(),
            });
        }
        let buf = &buf[..size];

        let message_type = MessageType::try_from(buf[2]).map_err(ReadError::UnknownMessageType)?;
        let size_matches = match message_type {
            MessageType::ConfigRequest => size == CONFIG_REQUEST_LEN,
            MessageType::ConfigResponse => size == CONFIG_RESPONSE_LEN,
            MessageType::PortRequest | MessageType::PortEvent => size >= PORT_MESSAGE_FIXED_LEN,
        };
        if !size_matches {
            return Err(ReadError::InvalidSize {
                message_type: Some(message_type),
                size,
            });
        }

        let port_id = get_u16(buf, 4);
        let request_id = get_u16(buf, 6);

        let message = match message_type {
            MessageType::ConfigRequest => Message::ConfigRequest(ConfigRequest {
                port_id,
                request_id,
                action: ConfigAction::try_from(buf[8]).map_err(|action| {
                    ReadError::UnknownAction {
                        message_type,
                        action,
                    }
                })?,
                port_type: buf[9],
                pin_config: get_u16(buf, 10),
                value: get_u32(buf, 12),
                attr1: get_u16(buf, 16),
                attr2: get_u16(buf, 18),
            }),
            MessageType::ConfigResponse => Message::ConfigResponse(ConfigResponse {
                port_id,
                request_id,
                result: buf[8],
                optional: get_u16(buf, 10),
                value: get_u32(buf, 12),
            }),
            MessageType::PortRequest => Message::PortRequest(PortRequest {
                port_id,
                request_id,
                action: PortAction::try_from(buf[8]).map_err(|action| {
                    ReadError::UnknownAction {
                        message_type,
                        action,
                    }
                })?,
                attr1: buf[9],
                attr2: get_u16(buf, 10),
                value: get_u32(buf, 12),
                data: buf[PORT_MESSAGE_FIXED_LEN..].into(),
            }),
            MessageType::PortEvent => Message::PortEvent(PortEvent {
                port_id,
                request_id,
                event: PortEventCode::try_from(buf[8]).map_err(ReadError::UnknownEvent)?,
                attr1: buf[9],
                attr2: get_u16(buf, 10),
                value: get_u32(buf, 12),
                data: buf[PORT_MESSAGE_FIXED_LEN..].into(),
            }),
        };
        Ok(message)
    }

    /// Reads exactly one message from a blocking stream.
    pub fn from_reader(reader: &mut impl Read) -> Result<Message, ReadError> {
        let mut size_buf = [0u8; 2];
        reader.read_exact(&mut size_buf)?;
        let size = peek_message_size(&size_buf);
        if size < HEADER_LEN {
            return Err(ReadError::InvalidSize {
                message_type: None,
                size,
            });
        }
        let mut buf = vec![0u8; size];
        buf[..2].copy_from_slice(&size_buf);
        reader.read_exact(&mut buf[2..])?;
        Message::from_bytes(&buf)
    }
}

#[cfg(test)]
mod test {
    use crate::error::ReadError;
    use crate::protocol::*;
    use std::io::Cursor;

    fn config_request() -> ConfigRequest {
        ConfigRequest {
            port_id: 0,
            request_id: 0x0102,
            action: ConfigAction::ConfigurePort,
            port_type: PortType::DigitalPin.into(),
            pin_config: 13,
            attr1: 5,
            attr2: 0x0a0b,
            value: 0x1234_5678,
        }
    }

    #[test]
    fn write_config_request() {
        let out = Message::from(config_request()).to_bytes().unwrap();
        assert_eq!(
            out,
            vec![
                20, 0, 1, 0, 0, 0, 0x02, 0x01, 1, 1, 13, 0, 0x78, 0x56, 0x34, 0x12, 5, 0, 0x0b,
                0x0a
            ]
        );
    }

    #[test]
    fn read_config_response() {
        let data = [16, 0, 2, 0, 7, 0, 3, 0, 0, 0, 1, 0, 0xff, 0, 0, 0];
        match Message::from_bytes(&data).unwrap() {
            Message::ConfigResponse(response) => {
                assert_eq!(response.port_id, 7);
                assert_eq!(response.request_id, 3);
                assert!(response.is_ok());
                assert_eq!(response.optional, 1);
                assert_eq!(response.value, 0xff);
            }
            other => panic!("expected ConfigResponse, got {:?}", other),
        }
    }

    #[test]
    fn port_request_payload_follows_fixed_fields() {
        let mut request = PortRequest::new(4, PortAction::TxData);
        request.request_id = 9;
        request.attr2 = 0x52;
        request.data = vec![0x40, 0x00].into_boxed_slice();
        let out = Message::from(request).to_bytes().unwrap();
        assert_eq!(out.len(), 18);
        assert_eq!(&out[..2], &[18, 0]);
        assert_eq!(out[2], 3);
        assert_eq!(out[8], 3);
        assert_eq!(&out[10..12], &[0x52, 0]);
        assert_eq!(&out[16..], &[0x40, 0x00]);
    }

    #[test]
    fn port_event_round_trip() {
        let mut event = PortEvent::new(2, PortEventCode::DataReceived);
        event.request_id = 77;
        event.attr1 = 3;
        event.attr2 = 300;
        event.value = u32::MAX;
        event.data = (0..=255).collect::<Vec<u8>>().into_boxed_slice();
        let message = Message::from(event);
        let bytes = message.to_bytes().unwrap();
        assert_eq!(Message::from_bytes(&bytes).unwrap(), message);
    }

    #[test]
    fn bytes_round_trip() {
        let data = vec![
            20, 0, 1, 0, 3, 0, 4, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let message = Message::from_bytes(&data).unwrap();
        assert_eq!(message.to_bytes().unwrap(), data);
    }

    #[test]
    fn maximal_payload() {
        let mut request = PortRequest::new(1, PortAction::TxData);
        request.data = vec![0xa5; MAX_PAYLOAD_LEN].into_boxed_slice();
        let message = Message::from(request);
        let bytes = message.to_bytes().unwrap();
        assert_eq!(bytes.len(), u16::MAX as usize);
        assert_eq!(Message::from_bytes(&bytes).unwrap(), message);

        let mut too_large = PortRequest::new(1, PortAction::TxData);
        too_large.data = vec![0; MAX_PAYLOAD_LEN + 1].into_boxed_slice();
        let err = Message::from(too_large).to_bytes().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn encode_at_offset() {
        let mut buf = [0xeeu8; 40];
        let written = Message::from(config_request())
            .encode_at(&mut buf, 10)
            .unwrap();
        assert_eq!(written, 20);
        assert_eq!(buf[9], 0xee);
        assert_eq!(&buf[10..12], &[20, 0]);
        assert_eq!(buf[30], 0xee);
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut data = Message::from(PortEvent::new(3, PortEventCode::SetDone))
            .to_bytes()
            .unwrap();
        data.extend_from_slice(&[1, 2, 3]);
        match Message::from_bytes(&data).unwrap() {
            Message::PortEvent(event) => assert!(event.data.is_empty()),
            other => panic!("expected PortEvent, got {:?}", other),
        }
    }

    #[test]
    fn unknown_message_type() {
        let data = [16, 0, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        match Message::from_bytes(&data) {
            Err(ReadError::UnknownMessageType(t)) => assert_eq!(t, 9),
            other => panic!("expected UnknownMessageType, got {:?}", other),
        }
    }

    #[test]
    fn unknown_event_code() {
        let data = [16, 0, 4, 0, 1, 0, 0, 0, 42, 0, 0, 0, 0, 0, 0, 0];
        match Message::from_bytes(&data) {
            Err(ReadError::UnknownEvent(e)) => assert_eq!(e, 42),
            other => panic!("expected UnknownEvent, got {:?}", other),
        }
    }

    #[test]
    fn size_too_small_for_type() {
        let data = [12, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        match Message::from_bytes(&data) {
            Err(ReadError::InvalidSize {
                message_type: Some(MessageType::ConfigResponse),
                size: 12,
            }) => {}
            other => panic!("expected InvalidSize, got {:?}", other),
        }
    }

    #[test]
    fn truncated_buffer() {
        let data = [16, 0, 2, 0, 0, 0, 0, 0, 0, 0];
        match Message::from_bytes(&data) {
            Err(ReadError::Truncated { expected, got }) => {
                assert_eq!(expected, 16);
                assert_eq!(got, 10);
            }
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn read_consecutive_messages_from_stream() {
        let mut data = Message::from(config_request()).to_bytes().unwrap();
        data.extend(
            Message::from(PortEvent::new(5, PortEventCode::SingleSample))
                .to_bytes()
                .unwrap(),
        );
        let mut cursor = Cursor::new(data);
        assert_eq!(
            Message::from_reader(&mut cursor).unwrap(),
            Message::from(config_request())
        );
        assert_eq!(
            Message::from_reader(&mut cursor).unwrap().message_type(),
            MessageType::PortEvent
        );
        assert!(matches!(
            Message::from_reader(&mut cursor),
            Err(ReadError::IoError(_))
        ));
    }
}
