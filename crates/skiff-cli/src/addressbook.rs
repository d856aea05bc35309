//! # Address Book Service
//!
//! The demo service served by `skiff serve`. Method descriptors are written
//! out by hand here, the way a schema compiler would emit them:
//!
//! ```text
//! service AddressBookService {
//!     bool add(1: Person person)
//!     Person get(1: string name) throws (1: PersonNotExistsError not_exists)
//!     bool remove(1: string name) throws (1: PersonNotExistsError not_exists)
//!     void ping()
//!     void sleep(1: i32 ms)
//!     oneway void log(1: string line)
//! }
//! ```
//!
//! [`AddressBook`] is the handler. It keeps its registry behind a mutex
//! because the threaded and HTTP servers call it from many threads at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use skiff_client::HttpClient;
use skiff_common::protocol::{CallError, DeclaredException, Method, NoException};
use skiff_server::Processor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PhoneType {
    #[default]
    Mobile,
    Home,
    Work,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    #[serde(default)]
    pub kind: PhoneType,
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    #[serde(default)]
    pub phones: Vec<PhoneNumber>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl Person {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phones: Vec::new(),
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonNotExistsError {
    pub message: String,
}

impl PersonNotExistsError {
    fn new(name: &str) -> Self {
        Self {
            message: format!("Person '{}' does not exist", name),
        }
    }
}

/// Exceptions declared by `get` and `remove`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupError {
    NotExists(PersonNotExistsError),
}

impl DeclaredException for LookupError {
    const FIELDS: &'static [&'static str] = &["not_exists"];
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddArgs {
    pub person: Person,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NameArgs {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SleepArgs {
    pub ms: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogArgs {
    pub line: String,
}

pub struct Add;

impl Method for Add {
    const NAME: &'static str = "add";
    const ARG_FIELDS: &'static [&'static str] = &["person"];
    type Args = AddArgs;
    type Success = bool;
    type Exception = NoException;
}

pub struct Get;

impl Method for Get {
    const NAME: &'static str = "get";
    const ARG_FIELDS: &'static [&'static str] = &["name"];
    type Args = NameArgs;
    type Success = Person;
    type Exception = LookupError;
}

pub struct Remove;

impl Method for Remove {
    const NAME: &'static str = "remove";
    const ARG_FIELDS: &'static [&'static str] = &["name"];
    type Args = NameArgs;
    type Success = bool;
    type Exception = LookupError;
}

pub struct Ping;

impl Method for Ping {
    const NAME: &'static str = "ping";
    const ARG_FIELDS: &'static [&'static str] = &[];
    const VOID: bool = true;
    type Args = ();
    type Success = ();
    type Exception = NoException;
}

pub struct Sleep;

impl Method for Sleep {
    const NAME: &'static str = "sleep";
    const ARG_FIELDS: &'static [&'static str] = &["ms"];
    const VOID: bool = true;
    type Args = SleepArgs;
    type Success = ();
    type Exception = NoException;
}

pub struct Log;

impl Method for Log {
    const NAME: &'static str = "log";
    const ARG_FIELDS: &'static [&'static str] = &["line"];
    const ONEWAY: bool = true;
    const VOID: bool = true;
    type Args = LogArgs;
    type Success = ();
    type Exception = NoException;
}

/// Address book handler.
#[derive(Debug, Default)]
pub struct AddressBook {
    registry: Mutex<HashMap<String, Person>>,
    log: Mutex<Vec<String>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `person` unless the name is taken. Returns whether it was stored.
    pub fn add(&self, person: Person) -> bool {
        let mut registry = lock(&self.registry);
        if registry.contains_key(&person.name) {
            return false;
        }
        registry.insert(person.name.clone(), person);
        true
    }

    pub fn get(&self, name: &str) -> Result<Person, PersonNotExistsError> {
        lock(&self.registry)
            .get(name)
            .cloned()
            .ok_or_else(|| PersonNotExistsError::new(name))
    }

    pub fn remove(&self, name: &str) -> Result<bool, PersonNotExistsError> {
        lock(&self.registry)
            .remove(name)
            .map(|_| true)
            .ok_or_else(|| PersonNotExistsError::new(name))
    }

    pub fn log(&self, line: String) {
        tracing::info!(%line, "Client log");
        lock(&self.log).push(line);
    }

    /// Lines received through `log`, oldest first.
    pub fn logged(&self) -> Vec<String> {
        lock(&self.log).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A panic while holding the lock cannot leave the map half-updated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds the dispatch table for `book`.
pub fn processor(book: Arc<AddressBook>) -> Processor {
    Processor::builder(book)
        .register::<Add, _>(|book, args| Ok(book.add(args.person)))
        .register::<Get, _>(|book, args| {
            book.get(&args.name)
                .map_err(|e| LookupError::NotExists(e).into())
        })
        .register::<Remove, _>(|book, args| {
            book.remove(&args.name)
                .map_err(|e| LookupError::NotExists(e).into())
        })
        .register::<Ping, _>(|_, ()| Ok(()))
        .register::<Sleep, _>(|_, args| {
            std::thread::sleep(Duration::from_millis(args.ms.max(0) as u64));
            Ok(())
        })
        .register::<Log, _>(|book, args| {
            book.log(args.line);
            Ok(())
        })
        .build()
}

/// Names accepted by [`call_json`].
pub const METHODS: &[&str] = &[Add::NAME, Get::NAME, Remove::NAME, Ping::NAME, Sleep::NAME, Log::NAME];

/// Calls the method named `method` and renders the outcome as JSON.
///
/// A normal return becomes `{"result": ...}` and a declared exception
/// becomes `{"exception": ...}`. Every other failure is an error.
pub async fn call_json(
    client: &HttpClient,
    method: &str,
    positional: Vec<Value>,
    keyword: Map<String, Value>,
) -> anyhow::Result<Value> {
    match method {
        "add" => render(client.call_with::<Add>(positional, keyword).await),
        "get" => render(client.call_with::<Get>(positional, keyword).await),
        "remove" => render(client.call_with::<Remove>(positional, keyword).await),
        "ping" => render(client.call_with::<Ping>(positional, keyword).await),
        "sleep" => render(client.call_with::<Sleep>(positional, keyword).await),
        "log" => render(client.call_with::<Log>(positional, keyword).await),
        other => anyhow::bail!(
            "Unknown method '{}' (expected one of: {})",
            other,
            METHODS.join(", ")
        ),
    }
}

fn render<T: Serialize, E: Serialize>(
    outcome: Result<T, CallError<E>>,
) -> anyhow::Result<Value> {
    match outcome {
        Ok(value) => Ok(json!({ "result": value })),
        Err(CallError::Declared(exception)) => Ok(json!({ "exception": exception })),
        Err(CallError::Rpc(e)) => Err(e.into()),
    }
}
