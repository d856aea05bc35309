//! Request dispatch.
//!
//! A [`Processor`] owns a dispatch table from method name to a typed invoker
//! closure. The table is built once from method descriptors with
//! [`ProcessorBuilder::register`]; after that every request is routed by a
//! single map lookup.

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use skiff_common::protocol::{
    ApplicationException, ApplicationExceptionKind, InputProtocol, MessageHeader, MessageType,
    Method, OutputProtocol, Raised, Result, ResultFields, SkiffError,
};
use skiff_common::transport::Codec;

/// Decodes arguments from `payload`, runs the handler and returns the encoded
/// result struct, or `None` when the method is oneway.
type Invoker = Box<dyn Fn(Codec, &[u8], Codec) -> Result<Option<Vec<u8>>> + Send + Sync>;

/// Routes one request at a time to a handler.
///
/// The processor holds no per-connection state and is shared across every
/// connection of a server behind an `Arc`. Handlers must synchronize their
/// own mutable state; the processor only guarantees that calls on one
/// connection run one after another.
pub struct Processor {
    methods: HashMap<&'static str, Invoker>,
}

impl Processor {
    /// Starts a dispatch table over `handler`.
    pub fn builder<H: Send + Sync + 'static>(handler: Arc<H>) -> ProcessorBuilder<H> {
        ProcessorBuilder {
            handler,
            methods: HashMap::new(),
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.methods.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Performs exactly one request/response cycle.
    ///
    /// Reads one message from `iprot` and writes at most one message to
    /// `oprot`. Declared exceptions and unknown methods are successful
    /// dispatches; only transport failures, malformed input and undeclared
    /// handler failures come back as errors.
    pub fn process<R: Read, W: Write>(
        &self,
        iprot: &mut InputProtocol<R>,
        oprot: &mut OutputProtocol<W>,
    ) -> Result<()> {
        let header = iprot.read_message_begin()?;

        if !header.kind.is_request() {
            iprot.skip_struct()?;
            iprot.read_message_end()?;
            tracing::warn!(method = %header.name, kind = %header.kind, "Rejecting non-request message");
            let exception = ApplicationException::new(
                ApplicationExceptionKind::InvalidMessageType,
                format!("expected CALL or ONEWAY, got {}", header.kind),
            );
            return send_exception(oprot, &header, &exception);
        }

        let Some(invoke) = self.methods.get(header.name.as_str()) else {
            iprot.skip_struct()?;
            iprot.read_message_end()?;
            tracing::warn!(method = %header.name, seqid = header.seqid, "Unknown method");
            if header.kind == MessageType::Oneway {
                return Ok(());
            }
            return send_exception(oprot, &header, &ApplicationException::unknown_method(&header.name));
        };

        let payload = iprot.read_payload()?;
        iprot.read_message_end()?;

        tracing::debug!(method = %header.name, seqid = header.seqid, "Dispatching call");
        match invoke(iprot.codec(), &payload, oprot.codec())? {
            Some(result) => {
                oprot.write_message_begin(&header.answer(MessageType::Reply))?;
                oprot.write_payload(&result)?;
                oprot.write_message_end()
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("methods", &self.method_names())
            .finish()
    }
}

fn send_exception<W: Write>(
    oprot: &mut OutputProtocol<W>,
    request: &MessageHeader,
    exception: &ApplicationException,
) -> Result<()> {
    oprot.write_message_begin(&request.answer(MessageType::Exception))?;
    oprot.write_struct(exception)?;
    oprot.write_message_end()
}

/// Builds a [`Processor`] one method at a time.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use serde::{Deserialize, Serialize};
/// use skiff_common::protocol::{Method, NoException};
/// use skiff_server::Processor;
///
/// #[derive(Serialize, Deserialize)]
/// struct EchoArgs { text: String }
///
/// struct Echo;
/// impl Method for Echo {
///     const NAME: &'static str = "echo";
///     const ARG_FIELDS: &'static [&'static str] = &["text"];
///     type Args = EchoArgs;
///     type Success = String;
///     type Exception = NoException;
/// }
///
/// struct Handler;
///
/// let processor = Processor::builder(Arc::new(Handler))
///     .register::<Echo, _>(|_, args| Ok(args.text))
///     .build();
/// assert!(processor.has_method("echo"));
/// ```
pub struct ProcessorBuilder<H> {
    handler: Arc<H>,
    methods: HashMap<&'static str, Invoker>,
}

impl<H: Send + Sync + 'static> ProcessorBuilder<H> {
    /// Binds method `M` to `f`.
    ///
    /// `f` receives the handler and the decoded argument struct. Returning
    /// [`Raised::Declared`] populates the exception field of the result;
    /// [`Raised::Failure`] aborts the connection. Registering the same name
    /// twice keeps the last binding.
    pub fn register<M, F>(mut self, f: F) -> Self
    where
        M: Method,
        F: Fn(&H, M::Args) -> std::result::Result<M::Success, Raised<M::Exception>>
            + Send
            + Sync
            + 'static,
    {
        let handler = Arc::clone(&self.handler);
        let invoke: Invoker = Box::new(move |input, payload, output| {
            let args: M::Args = input.decode(payload)?;

            let fields = match f(handler.as_ref(), args) {
                Ok(value) => ResultFields::returned::<M>(value),
                Err(Raised::Declared(exception)) => {
                    tracing::debug!(method = M::NAME, exception = ?exception, "Handler raised a declared exception");
                    ResultFields::raised(exception)
                }
                Err(Raised::Failure(message)) => {
                    return Err(SkiffError::Handler(format!("{}: {}", M::NAME, message)));
                }
            };

            if M::ONEWAY {
                return Ok(None);
            }
            output.encode(&fields).map(Some)
        });

        if self.methods.insert(M::NAME, invoke).is_some() {
            tracing::warn!(method = M::NAME, "Method registered twice; keeping the last binding");
        }
        self
    }

    pub fn build(self) -> Processor {
        Processor {
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use skiff_common::protocol::{
        decode_reply, encode_call, DeclaredException, NoException, ProtocolFactory,
    };
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Overdrawn {
        balance: i64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum WithdrawError {
        Overdrawn(Overdrawn),
    }

    impl DeclaredException for WithdrawError {
        const FIELDS: &'static [&'static str] = &["overdrawn"];
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct AmountArgs {
        amount: i64,
    }

    struct Withdraw;

    impl Method for Withdraw {
        const NAME: &'static str = "withdraw";
        const ARG_FIELDS: &'static [&'static str] = &["amount"];
        type Args = AmountArgs;
        type Success = i64;
        type Exception = WithdrawError;
    }

    struct Audit;

    impl Method for Audit {
        const NAME: &'static str = "audit";
        const ARG_FIELDS: &'static [&'static str] = &["amount"];
        const ONEWAY: bool = true;
        const VOID: bool = true;
        type Args = AmountArgs;
        type Success = ();
        type Exception = WithdrawError;
    }

    struct Explode;

    impl Method for Explode {
        const NAME: &'static str = "explode";
        const ARG_FIELDS: &'static [&'static str] = &[];
        type Args = ();
        type Success = bool;
        type Exception = NoException;
    }

    #[derive(Default)]
    struct Account {
        balance: Mutex<i64>,
        audited: Mutex<Vec<i64>>,
    }

    fn processor(account: Arc<Account>) -> Processor {
        Processor::builder(account)
            .register::<Withdraw, _>(|account, args| {
                let mut balance = account.balance.lock().unwrap();
                if args.amount > *balance {
                    return Err(WithdrawError::Overdrawn(Overdrawn { balance: *balance }).into());
                }
                *balance -= args.amount;
                Ok(*balance)
            })
            .register::<Audit, _>(|account, args| {
                account.audited.lock().unwrap().push(args.amount);
                Err(WithdrawError::Overdrawn(Overdrawn { balance: 0 }).into())
            })
            .register::<Explode, _>(|_, ()| Err(Raised::failure("kaboom")))
            .build()
    }

    fn run(processor: &Processor, request: &[u8]) -> (Result<()>, Vec<u8>) {
        let protocol = ProtocolFactory::binary();
        let mut output = Vec::new();
        let result = processor.process(&mut protocol.input(request), &mut protocol.output(&mut output));
        (result, output)
    }

    #[test]
    fn test_success_reply() {
        let account = Arc::new(Account { balance: Mutex::new(100), ..Default::default() });
        let protocol = ProtocolFactory::binary();
        let request = encode_call::<Withdraw>(&protocol, 4, &AmountArgs { amount: 30 }).unwrap();

        let (result, reply) = run(&processor(account), &request);

        result.unwrap();
        assert_eq!(decode_reply::<Withdraw>(&protocol, &reply).unwrap(), 70);
    }

    #[test]
    fn test_declared_exception_is_a_successful_dispatch() {
        let account = Arc::new(Account { balance: Mutex::new(10), ..Default::default() });
        let protocol = ProtocolFactory::binary();
        let request = encode_call::<Withdraw>(&protocol, 0, &AmountArgs { amount: 30 }).unwrap();

        let (result, reply) = run(&processor(account), &request);

        result.unwrap();
        let err = decode_reply::<Withdraw>(&protocol, &reply).unwrap_err();
        assert_eq!(err.declared(), Some(WithdrawError::Overdrawn(Overdrawn { balance: 10 })));
    }

    #[test]
    fn test_oneway_writes_nothing_even_when_handler_raises() {
        let account = Arc::new(Account::default());
        let protocol = ProtocolFactory::binary();
        let mut request = Vec::new();
        let mut out = protocol.output(&mut request);
        out.write_message_begin(&MessageHeader::new("audit", MessageType::Oneway, 0)).unwrap();
        out.write_struct(&AmountArgs { amount: 5 }).unwrap();
        out.write_message_end().unwrap();

        let (result, reply) = run(&processor(Arc::clone(&account)), &request);

        result.unwrap();
        assert!(reply.is_empty());
        assert_eq!(*account.audited.lock().unwrap(), vec![5]);
    }

    #[test]
    fn test_unknown_method_drains_args_and_connection_continues() {
        let account = Arc::new(Account { balance: Mutex::new(50), ..Default::default() });
        let processor = processor(account);
        let protocol = ProtocolFactory::binary();

        let mut requests = Vec::new();
        let mut out = protocol.output(&mut requests);
        out.write_message_begin(&MessageHeader::new("deposit", MessageType::Call, 1)).unwrap();
        out.write_struct(&("lots", "of", "arguments", 1234u64)).unwrap();
        out.write_message_end().unwrap();
        requests.extend(encode_call::<Withdraw>(&protocol, 2, &AmountArgs { amount: 20 }).unwrap());

        let mut input = protocol.input(&requests[..]);
        let mut replies = Vec::new();
        processor.process(&mut input, &mut protocol.output(&mut replies)).unwrap();
        processor.process(&mut input, &mut protocol.output(&mut replies)).unwrap();

        let mut replies = protocol.input(&replies[..]);
        let header = replies.read_message_begin().unwrap();
        assert_eq!(header, MessageHeader::new("deposit", MessageType::Exception, 1));
        let exception: ApplicationException = replies.read_struct().unwrap();
        assert_eq!(exception.kind, ApplicationExceptionKind::UnknownMethod);

        let (seqid, balance) = skiff_common::protocol::recv_reply::<Withdraw, _>(&mut replies).unwrap();
        assert_eq!(seqid, 2);
        assert_eq!(balance.unwrap(), 30);
    }

    #[test]
    fn test_reply_message_is_rejected() {
        let processor = processor(Arc::new(Account::default()));
        let protocol = ProtocolFactory::binary();
        let mut request = Vec::new();
        let mut out = protocol.output(&mut request);
        out.write_message_begin(&MessageHeader::new("withdraw", MessageType::Reply, 8)).unwrap();
        out.write_struct(&0i64).unwrap();
        out.write_message_end().unwrap();

        let (result, reply) = run(&processor, &request);

        result.unwrap();
        let mut input = protocol.input(&reply[..]);
        assert_eq!(input.read_message_begin().unwrap().kind, MessageType::Exception);
        let exception: ApplicationException = input.read_struct().unwrap();
        assert_eq!(exception.kind, ApplicationExceptionKind::InvalidMessageType);
    }

    #[test]
    fn test_undeclared_failure_propagates_without_reply() {
        let processor = processor(Arc::new(Account::default()));
        let protocol = ProtocolFactory::binary();
        let request = encode_call::<Explode>(&protocol, 0, &()).unwrap();

        let (result, reply) = run(&processor, &request);

        assert!(matches!(result, Err(SkiffError::Handler(msg)) if msg.contains("kaboom")));
        assert!(reply.is_empty());
    }

    #[test]
    fn test_malformed_args_are_a_transport_failure() {
        let processor = processor(Arc::new(Account::default()));
        let protocol = ProtocolFactory::json();
        let mut request = Vec::new();
        let mut out = protocol.output(&mut request);
        out.write_message_begin(&MessageHeader::new("withdraw", MessageType::Call, 0)).unwrap();
        out.write_payload(b"{not json").unwrap();
        out.write_message_end().unwrap();

        let mut reply = Vec::new();
        let result = processor.process(&mut protocol.input(&request[..]), &mut protocol.output(&mut reply));

        assert!(matches!(result, Err(SkiffError::JsonSerialization(_))));
        assert!(reply.is_empty());
    }

    #[test]
    fn test_closed_input() {
        let processor = processor(Arc::new(Account::default()));
        let (result, _) = run(&processor, &[]);
        assert!(result.unwrap_err().is_closed());
    }

    #[test]
    fn test_method_names() {
        let processor = processor(Arc::new(Account::default()));
        assert_eq!(processor.method_names(), vec!["audit", "explode", "withdraw"]);
        assert!(!processor.has_method("deposit"));
    }
}
