//! Method descriptors.
//!
//! A schema compiler emits one [`Method`] implementation per service method.
//! The descriptor fixes the method name, the argument struct, the success
//! type, the declared exceptions and the oneway flag; everything else in the
//! runtime is driven from it.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use skiff_common::protocol::{Method, NoException};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! pub struct EchoArgs {
//!     pub text: String,
//! }
//!
//! pub struct Echo;
//!
//! impl Method for Echo {
//!     const NAME: &'static str = "echo";
//!     const ARG_FIELDS: &'static [&'static str] = &["text"];
//!     type Args = EchoArgs;
//!     type Success = String;
//!     type Exception = NoException;
//! }
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Static description of one service method.
pub trait Method: Send + Sync + 'static {
    /// Method name, unique within its service.
    const NAME: &'static str;

    /// Argument field names in declaration order. Positional arguments bind
    /// to these in order.
    const ARG_FIELDS: &'static [&'static str];

    /// The caller does not wait for a reply and the server never sends one.
    const ONEWAY: bool = false;

    /// The method returns nothing; the result struct has no `success` field.
    const VOID: bool = false;

    type Args: Serialize + DeserializeOwned + Send + 'static;

    /// Return type; `()` for void methods.
    type Success: Serialize + DeserializeOwned + Send + 'static;

    /// One variant per declared exception, or [`NoException`].
    type Exception: DeclaredException;
}

/// The set of exceptions a method declares, as a single enum.
///
/// Each variant corresponds to one optional exception field of the result
/// struct, so at most one of them can ever be populated.
pub trait DeclaredException: Serialize + DeserializeOwned + fmt::Debug + Send + 'static {
    /// Exception field names, in declaration order.
    const FIELDS: &'static [&'static str];
}

/// Declared-exception set of a method that declares none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoException {}

impl DeclaredException for NoException {
    const FIELDS: &'static [&'static str] = &[];
}

impl Serialize for NoException {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        match *self {}
    }
}

impl<'de> Deserialize<'de> for NoException {
    fn deserialize<D: Deserializer<'de>>(_deserializer: D) -> Result<Self, D::Error> {
        Err(serde::de::Error::custom("method declares no exceptions"))
    }
}
