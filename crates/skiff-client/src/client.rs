use std::io::{BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use serde_json::{Map, Value};
use skiff_common::protocol::{
    bind_args, recv_reply, void_success, write_call, ApplicationException,
    ApplicationExceptionKind, CallError, InputProtocol, Method, OutputProtocol, ProtocolFactory,
    Result, SeqId, SkiffError,
};
use skiff_common::transport::{BufferedTransportFactory, TcpTransport, TransportFactory};

/// Connection-oriented skiff client.
///
/// Owns one input and one output protocol and makes calls strictly one
/// after another. Sequence ids start at 0 and grow by one per call; a reply
/// carrying a different seqid fails the call with `BAD_SEQUENCE_ID`.
///
/// # Example
///
/// ```no_run
/// use skiff_client::Client;
/// use skiff_common::protocol::ProtocolFactory;
///
/// let client = Client::connect("127.0.0.1:6000", ProtocolFactory::binary(), None).unwrap();
/// ```
pub struct Client<R, W> {
    iprot: InputProtocol<R>,
    oprot: OutputProtocol<W>,
    seqid: SeqId,
}

/// Client over a buffered TCP connection.
pub type TcpClient = Client<BufReader<TcpStream>, BufWriter<TcpStream>>;

impl TcpClient {
    /// Connects to a sequential or threaded server.
    ///
    /// `timeout` bounds the connect and every later socket read and write.
    pub fn connect(addr: &str, protocol: ProtocolFactory, timeout: Option<Duration>) -> Result<Self> {
        let stream = TcpTransport::connect(addr, timeout)?;
        let (read_half, write_half) = TcpTransport::split(stream)?;
        let transport = BufferedTransportFactory::new();

        Ok(Client::new(
            protocol.input(transport.input(read_half)),
            protocol.output(transport.output(write_half)),
        ))
    }

    /// Shuts the connection down.
    pub fn close(self) {
        let (iprot, _) = self.into_inner();
        TcpTransport::close(iprot.get_ref().get_ref());
    }
}

impl<R: Read, W: Write> Client<R, W> {
    pub fn new(iprot: InputProtocol<R>, oprot: OutputProtocol<W>) -> Self {
        Self {
            iprot,
            oprot,
            seqid: 0,
        }
    }

    /// Calls `M` with an already built argument struct.
    ///
    /// Oneway calls return as soon as the request is written.
    pub fn call<M: Method>(
        &mut self,
        args: &M::Args,
    ) -> std::result::Result<M::Success, CallError<M::Exception>> {
        let seqid = self.next_seqid();
        write_call::<M, _>(&mut self.oprot, seqid, args)?;

        if M::ONEWAY {
            return Ok(void_success::<M>()?);
        }

        let (reply_seqid, result) = recv_reply::<M, _>(&mut self.iprot)?;
        if reply_seqid != seqid {
            let exception = ApplicationException::new(
                ApplicationExceptionKind::BadSequenceId,
                format!("{} failed: out of sequence response", M::NAME),
            );
            return Err(SkiffError::Application(exception).into());
        }
        result
    }

    /// Calls `M` with positional and keyword arguments, bound to the
    /// argument struct before anything is written.
    pub fn call_with<M: Method>(
        &mut self,
        positional: Vec<Value>,
        keyword: Map<String, Value>,
    ) -> std::result::Result<M::Success, CallError<M::Exception>> {
        let args = bind_args::<M>(positional, keyword)?;
        self.call::<M>(&args)
    }

    pub fn into_inner(self) -> (InputProtocol<R>, OutputProtocol<W>) {
        (self.iprot, self.oprot)
    }

    fn next_seqid(&mut self) -> SeqId {
        let seqid = self.seqid;
        self.seqid = self.seqid.wrapping_add(1);
        seqid
    }
}
