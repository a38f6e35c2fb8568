//! The async codec and the blocking reassembler agree on the same byte streams.
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use wirekite_protocol::{
    ConfigAction, ConfigRequest, ConfigResponse, Message, PortAction, PortEvent, PortEventCode,
    PortRequest, error::ReadError, reassembler::reassemble, tokio_codec::WirekiteCodec,
};

fn traffic() -> Vec<Message> {
    let mut configure = ConfigRequest::new(ConfigAction::ConfigurePort);
    configure.request_id = 7;
    configure.port_type = 4;
    configure.value = 100_000;

    let mut write = PortRequest::new(3, PortAction::TxData);
    write.request_id = 8;
    write.attr2 = 0x52;
    write.data = vec![0x40, 0x00].into();

    let mut received = PortEvent::new(3, PortEventCode::DataReceived);
    received.request_id = 9;
    received.attr2 = 40;
    received.data = (0..40).collect();

    vec![
        configure.into(),
        ConfigResponse {
            port_id: 3,
            request_id: 7,
            result: 0,
            optional: 0,
            value: 0,
        }
        .into(),
        write.into(),
        received.into(),
        PortEvent::new(5, PortEventCode::SingleSample).into(),
    ]
}

fn encode_all(messages: &[Message]) -> BytesMut {
    let mut codec = WirekiteCodec;
    let mut stream = BytesMut::new();
    for message in messages {
        codec.encode(message.clone(), &mut stream).unwrap();
    }
    stream
}

fn decode_in_chunks(stream: &[u8], chunk_size: usize) -> Vec<Message> {
    let mut codec = WirekiteCodec;
    let mut buf = BytesMut::new();
    let mut decoded = Vec::new();
    for chunk in stream.chunks(chunk_size) {
        buf.extend_from_slice(chunk);
        while let Some(message) = codec.decode(&mut buf).unwrap() {
            decoded.push(message);
        }
    }
    assert!(buf.is_empty());
    decoded
}

#[test]
fn codec_and_reassembler_agree() {
    let messages = traffic();
    let stream = encode_all(&messages);
    for chunk_size in 1..=stream.len() {
        let from_codec = decode_in_chunks(&stream, chunk_size);
        let from_reassembler: Vec<Message> = reassemble(stream.chunks(chunk_size))
            .map(|bytes| Message::from_bytes(&bytes.unwrap()).unwrap())
            .collect();
        assert_eq!(from_codec, messages, "chunk size {}", chunk_size);
        assert_eq!(from_reassembler, messages, "chunk size {}", chunk_size);
    }
}

#[test]
fn encoder_matches_blocking_encoding() {
    for message in traffic() {
        let mut buf = BytesMut::new();
        WirekiteCodec.encode(message.clone(), &mut buf).unwrap();
        assert_eq!(&buf[..], &message.to_bytes().unwrap()[..]);
        assert_eq!(buf.len(), message.encoded_len());
    }
}

#[test]
fn undersized_frame_is_rejected_by_both() {
    let stream = [6u8, 0, 2, 0, 0, 0];
    let mut buf = BytesMut::from(&stream[..]);
    assert!(matches!(
        WirekiteCodec.decode(&mut buf),
        Err(ReadError::InvalidSize { size: 6, .. })
    ));
    let mut messages = reassemble([&stream[..]]);
    assert!(matches!(
        messages.next(),
        Some(Err(ReadError::InvalidSize { size: 6, .. }))
    ));
    assert!(messages.next().is_none());
}
