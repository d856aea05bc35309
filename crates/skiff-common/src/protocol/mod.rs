pub mod args;
pub mod binary;
pub mod error;
pub mod exception;
pub mod message;
pub mod method;
pub mod reply;


pub use args::bind_args;
pub use binary::{InputProtocol, OutputProtocol, ProtocolFactory, MAX_MESSAGE_SIZE};
pub use error::{CallError, Raised, Result, SkiffError};
pub use exception::{ApplicationException, ApplicationExceptionKind};
pub use message::{MessageHeader, MessageType, SeqId};
pub use method::{DeclaredException, Method, NoException};
pub use reply::{
    decode_reply, encode_call, recv_reply, resolve, void_success, write_call, Outcome,
    ResultFields,
};
