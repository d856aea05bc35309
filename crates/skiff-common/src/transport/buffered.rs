use std::io::{BufReader, BufWriter, Read, Write};

/// Default buffer size for buffered transports (4 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Wraps raw byte channels into the streams a protocol reads from and
/// writes to.
///
/// Servers call [`input`](Self::input) and [`output`](Self::output) once per
/// accepted connection. Writers are flushed by the protocol at the end of
/// every message.
pub trait TransportFactory: Send + Sync + 'static {
    type Input<R: Read>: Read;
    type Output<W: Write>: Write;

    fn input<R: Read>(&self, inner: R) -> Self::Input<R>;
    fn output<W: Write>(&self, inner: W) -> Self::Output<W>;
}

/// Transport factory producing `BufReader` / `BufWriter` pairs.
///
/// # Example
///
/// ```
/// use std::io::Read;
/// use skiff_common::transport::{BufferedTransportFactory, TransportFactory};
///
/// let factory = BufferedTransportFactory::with_capacity(64);
/// let mut input = factory.input(&b"hello"[..]);
/// let mut text = String::new();
/// input.read_to_string(&mut text).unwrap();
/// assert_eq!(text, "hello");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferedTransportFactory {
    capacity: usize,
}

impl BufferedTransportFactory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BufferedTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for BufferedTransportFactory {
    type Input<R: Read> = BufReader<R>;
    type Output<W: Write> = BufWriter<W>;

    fn input<R: Read>(&self, inner: R) -> BufReader<R> {
        BufReader::with_capacity(self.capacity, inner)
    }

    fn output<W: Write>(&self, inner: W) -> BufWriter<W> {
        BufWriter::with_capacity(self.capacity, inner)
    }
}
