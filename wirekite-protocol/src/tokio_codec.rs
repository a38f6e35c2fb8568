//! [tokio_util::codec] support for framing Wirekite messages on async byte streams.
use std::io;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    codec::peek_message_size,
    error::ReadError,
    protocol::{HEADER_LEN, Message},
};

/// Length-prefix codec for use with `FramedRead` / `FramedWrite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WirekiteCodec;

impl Decoder for WirekiteCodec {
    type Item = Message;
    type Error = ReadError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ReadError> {
        if src.len() < 2 {
            return Ok(None);
        }
        let size = peek_message_size(src);
        if size < HEADER_LEN {
            return Err(ReadError::InvalidSize {
                message_type: None,
                size,
            });
        }
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }
        let frame = src.split_to(size);
        Message::from_bytes(&frame).map(Some)
    }
}

impl Encoder<Message> for WirekiteCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> io::Result<()> {
        let bytes = item.to_bytes()?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}
