//! Splits a stream of transport chunks into complete messages.
//!
//! USB bulk transfers deliver the byte stream in chunks that are unrelated to message
//! boundaries: a chunk may hold several messages, the tail of one message and the head
//! of the next, or a single byte of a length prefix. The [Reassembler] keeps whatever
//! incomplete message remains at the end of a chunk and completes it with the next one.
use crate::{codec::peek_message_size, error::ReadError, protocol::HEADER_LEN};

/// The incomplete message carried over from the previous chunk.
#[derive(Debug, Default)]
enum Pending {
    #[default]
    None,
    /// Only the low byte of the length prefix has been seen.
    LengthByte(u8),
    /// The message size is known; `buf` has its final length and `filled` bytes are valid.
    Partial { buf: Vec<u8>, filled: usize },
}

/// Incremental message reassembler.
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: Pending,
}

fn checked_size(size: usize) -> Result<usize, ReadError> {
    if size < HEADER_LEN {
        Err(ReadError::InvalidSize {
            message_type: None,
            size,
        })
    } else {
        Ok(size)
    }
}

impl Reassembler {
    pub fn new() -> Reassembler {
        Reassembler::default()
    }

    /// Returns `true` if no partial message is buffered.
    pub fn is_idle(&self) -> bool {
        matches!(self.pending, Pending::None)
    }

    /// Discards any partial message.
    pub fn reset(&mut self) {
        self.pending = Pending::None;
    }

    /// Extracts the next complete message from `chunk[*pos..]` and advances `pos` past the consumed bytes.
    ///
    /// Returns `Ok(None)` once the chunk is exhausted. An incomplete message at the end of the
    /// chunk is retained and completed by subsequent chunks. A declared size smaller than the
    /// message header can never be satisfied and is reported as an error.
    pub fn next_message(
        &mut self,
        chunk: &[u8],
        pos: &mut usize,
    ) -> Result<Option<Vec<u8>>, ReadError> {
        loop {
            match std::mem::take(&mut self.pending) {
                Pending::Partial { mut buf, mut filled } => {
                    let available = chunk.len() - *pos;
                    let take = (buf.len() - filled).min(available);
                    buf[filled..filled + take].copy_from_slice(&chunk[*pos..*pos + take]);
                    filled += take;
                    *pos += take;
                    if filled < buf.len() {
                        self.pending = Pending::Partial { buf, filled };
                        return Ok(None);
                    }
                    return Ok(Some(buf));
                }
                Pending::LengthByte(low) => {
                    if *pos >= chunk.len() {
                        self.pending = Pending::LengthByte(low);
                        return Ok(None);
                    }
                    let high = chunk[*pos];
                    let size = checked_size(u16::from_le_bytes([low, high]) as usize)?;
                    *pos += 1;
                    let mut buf = vec![0u8; size];
                    buf[0] = low;
                    buf[1] = high;
                    self.pending = Pending::Partial { buf, filled: 2 };
                }
                Pending::None => {
                    let remaining = &chunk[*pos..];
                    match remaining.len() {
                        0 => return Ok(None),
                        1 => {
                            self.pending = Pending::LengthByte(remaining[0]);
                            *pos += 1;
                            return Ok(None);
                        }
                        _ => {
                            let size = checked_size(peek_message_size(remaining))?;
                            if remaining.len() >= size {
                                *pos += size;
                                return Ok(Some(remaining[..size].to_vec()));
                            }
                            let mut buf = vec![0u8; size];
                            buf[..remaining.len()].copy_from_slice(remaining);
                            self.pending = Pending::Partial {
                                buf,
                                filled: remaining.len(),
                            };
                            *pos = chunk.len();
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }
}

/// Lazy iterator over the complete messages contained in a sequence of chunks.
///
/// Chunks are pulled from the underlying iterator only when the current one is exhausted.
/// After the first error the iterator is fused and yields nothing more.
pub struct Messages<I, C> {
    chunks: I,
    current: Option<C>,
    pos: usize,
    reassembler: Reassembler,
    failed: bool,
}

impl<I, C> Messages<I, C>
where
    I: Iterator<Item = C>,
    C: AsRef<[u8]>,
{
    pub fn new(chunks: I) -> Messages<I, C> {
        Messages {
            chunks,
            current: None,
            pos: 0,
            reassembler: Reassembler::new(),
            failed: false,
        }
    }

    /// Whether the stream ended in the middle of a message.
    pub fn has_partial_message(&self) -> bool {
        !self.reassembler.is_idle()
    }
}

impl<I, C> Iterator for Messages<I, C>
where
    I: Iterator<Item = C>,
    C: AsRef<[u8]>,
{
    type Item = Result<Vec<u8>, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(chunk) = &self.current {
                match self.reassembler.next_message(chunk.as_ref(), &mut self.pos) {
                    Ok(Some(message)) => return Some(Ok(message)),
                    Ok(None) => {}
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
            }
            self.current = Some(self.chunks.next()?);
            self.pos = 0;
        }
    }
}

/// Reassembles the messages contained in `chunks`.
pub fn reassemble<I>(chunks: I) -> Messages<I::IntoIter, I::Item>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    Messages::new(chunks.into_iter())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::{Message, PortEvent, PortEventCode};

    fn event(port_id: u16, payload_len: usize) -> Vec<u8> {
        let mut event = PortEvent::new(port_id, PortEventCode::DataReceived);
        event.data = (0..payload_len).map(|b| b as u8).collect();
        Message::from(event).to_bytes().unwrap()
    }

    fn stream() -> (Vec<Vec<u8>>, Vec<u8>) {
        let messages = vec![event(1, 0), event(2, 7), event(3, 300), event(4, 1)];
        let bytes = messages.concat();
        (messages, bytes)
    }

    fn split_by(bytes: &[u8], sizes: &[usize]) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        let mut offset = 0;
        let mut i = 0;
        while offset < bytes.len() {
            let size = sizes[i % sizes.len()].min(bytes.len() - offset);
            chunks.push(bytes[offset..offset + size].to_vec());
            offset += size;
            i += 1;
        }
        chunks
    }

    #[test]
    fn whole_stream_in_one_chunk() {
        let (messages, bytes) = stream();
        let out: Vec<_> = reassemble([bytes]).map(Result::unwrap).collect();
        assert_eq!(out, messages);
    }

    #[test]
    fn single_byte_chunks() {
        let (messages, bytes) = stream();
        let chunks = split_by(&bytes, &[1]);
        let out: Vec<_> = reassemble(chunks).map(Result::unwrap).collect();
        assert_eq!(out, messages);
    }

    #[test]
    fn irregular_chunks_with_empty_ones() {
        let (messages, bytes) = stream();
        for sizes in [&[3usize, 0, 64][..], &[17, 1, 0, 2], &[64], &[5, 11, 1]] {
            let chunks = split_by(&bytes, sizes);
            let mut with_empty = Vec::new();
            for chunk in chunks {
                with_empty.push(Vec::new());
                with_empty.push(chunk);
            }
            let out: Vec<_> = reassemble(with_empty).map(Result::unwrap).collect();
            assert_eq!(out, messages, "chunk sizes {:?}", sizes);
        }
    }

    #[test]
    fn chunk_ending_on_message_boundary() {
        let first = event(1, 4);
        let second = event(2, 0);
        let chunks = vec![first.clone(), second.clone()];
        let mut messages = reassemble(chunks);
        assert_eq!(messages.next().unwrap().unwrap(), first);
        assert_eq!(messages.next().unwrap().unwrap(), second);
        assert!(messages.next().is_none());
        assert!(!messages.has_partial_message());
    }

    #[test]
    fn lone_length_byte_is_carried_over() {
        let message = event(9, 2);
        let mut reassembler = Reassembler::new();
        let mut pos = 0;
        assert!(
            reassembler
                .next_message(&message[..1], &mut pos)
                .unwrap()
                .is_none()
        );
        assert_eq!(pos, 1);
        assert!(!reassembler.is_idle());

        let mut pos = 0;
        let rest = &message[1..];
        assert_eq!(
            reassembler.next_message(rest, &mut pos).unwrap().unwrap(),
            message
        );
        assert_eq!(pos, rest.len());
        assert!(reassembler.is_idle());
    }

    #[test]
    fn partial_message_spans_many_chunks() {
        let message = event(7, 30);
        let mut reassembler = Reassembler::new();
        for chunk in message[..44].chunks(4) {
            let mut pos = 0;
            assert!(reassembler.next_message(chunk, &mut pos).unwrap().is_none());
            assert_eq!(pos, chunk.len());
            assert!(!reassembler.is_idle());
        }
        let mut pos = 0;
        let tail = &message[44..];
        assert_eq!(reassembler.next_message(tail, &mut pos).unwrap().unwrap(), message);
        assert!(reassembler.is_idle());

        let mut pos = 0;
        let empty: &[u8] = &[];
        assert!(reassembler.next_message(empty, &mut pos).unwrap().is_none());
        assert!(reassembler.is_idle());
    }

    #[test]
    fn stream_ending_mid_message() {
        let message = event(1, 10);
        let mut messages = reassemble([message[..12].to_vec()]);
        assert!(messages.next().is_none());
        assert!(messages.has_partial_message());
    }

    #[test]
    fn undersized_length_is_an_error() {
        let chunks = vec![event(1, 0), vec![3, 0, 4, 0]];
        let mut messages = reassemble(chunks);
        assert!(messages.next().unwrap().is_ok());
        assert!(matches!(
            messages.next(),
            Some(Err(ReadError::InvalidSize { size: 3, .. }))
        ));
        assert!(messages.next().is_none());
    }

    #[test]
    fn undersized_length_split_across_chunks() {
        let mut messages = reassemble(vec![vec![0u8], vec![0u8, 1, 2]]);
        assert!(matches!(
            messages.next(),
            Some(Err(ReadError::InvalidSize { size: 0, .. }))
        ));
    }
}
