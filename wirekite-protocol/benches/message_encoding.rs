use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use wirekite_protocol::{
    Message, PortAction, PortEvent, PortEventCode, PortRequest, reassembler::reassemble,
};

fn i2c_request(len: usize) -> Message {
    let mut request = PortRequest::new(3, PortAction::TxData);
    request.request_id = 17;
    request.attr2 = 0x52;
    request.data = vec![0x5a; len].into_boxed_slice();
    request.into()
}

fn encoding(c: &mut Criterion) {
    let small = i2c_request(2);
    let large = i2c_request(1024);
    c.bench_function("encode port request (2 bytes)", |b| {
        b.iter(|| black_box(&small).to_bytes().unwrap())
    });
    c.bench_function("encode port request (1 KiB)", |b| {
        b.iter(|| black_box(&large).to_bytes().unwrap())
    });
}

fn decoding(c: &mut Criterion) {
    let mut event = PortEvent::new(3, PortEventCode::DataReceived);
    event.data = vec![0xa5; 256].into_boxed_slice();
    let bytes = Message::from(event).to_bytes().unwrap();
    c.bench_function("decode port event (256 bytes)", |b| {
        b.iter(|| Message::from_bytes(black_box(&bytes)).unwrap())
    });
}

fn reassembly(c: &mut Criterion) {
    let stream: Vec<u8> = (0..64)
        .flat_map(|i| {
            let mut event = PortEvent::new(1, PortEventCode::SingleSample);
            event.data = vec![0; i % 13].into_boxed_slice();
            Message::from(event).to_bytes().unwrap()
        })
        .collect();
    c.bench_function("reassemble 64 events from 64 byte chunks", |b| {
        b.iter(|| reassemble(black_box(&stream).chunks(64)).count())
    });
}

criterion_group!(benches, encoding, decoding, reassembly);
criterion_main!(benches);
