use std::{io, sync::Arc};

/// Byte pipe to a Wirekite board, usually a pair of USB bulk endpoints.
///
/// The device runs one receive thread that calls [Transport::read] in a loop while
/// any number of application threads call [Transport::write]. Implementations must
/// therefore be shareable across threads.
pub trait Transport: Send + Sync + 'static {
    /// Blocks until the next chunk of data has arrived and copies it into `buf`.
    ///
    /// Chunks need not be aligned to message boundaries and may be empty.
    /// Errors of kind `TimedOut`, `WouldBlock` or `Interrupted` are retried by the
    /// caller; any other error is treated as a disconnect.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Submits one complete encoded message.
    fn write(&self, data: &[u8]) -> io::Result<()>;

    /// Releases the pipes. Pending and later reads must fail promptly.
    fn close(&self);
}

macro_rules! forward_transport {
    ($($ptr:ident),+) => {
        $(
            impl<T: Transport + ?Sized> Transport for $ptr<T> {
                fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
                    (**self).read(buf)
                }

                fn write(&self, data: &[u8]) -> io::Result<()> {
                    (**self).write(data)
                }

                fn close(&self) {
                    (**self).close()
                }
            }
        )+
    };
}

forward_transport!(Box, Arc);

/// Whether a read error only means that no data was available yet.
pub(crate) fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
