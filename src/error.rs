use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use serde_json::Value;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Invalid endpoint selection, credentials or request shape. Never retried.
    Configuration,
    /// The server rejected an `auth`/`subscribe`/`unsubscribe` operation, or sent a frame
    /// matching neither the data nor the control shape
    Operation,
    /// Error related to synchronization of concurrent session start-up
    Synchronization,
    /// Internal error from dependencies
    Internal,
    /// Error related to WebSocket connections
    WebSocket,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Configuration {
            reason: message.into(),
        }
        .into()
    }

    pub fn operation<S: Into<String>>(payload: S) -> Self {
        OperationError::new(payload).into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct Configuration {
    pub reason: String,
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: {}", self.reason)
    }
}

impl StdError for Configuration {}

/// A server-side rejection of a WebSocket operation.
///
/// `payload` is the raw frame exactly as the server sent it, so callers can inspect fields such
/// as `ret_msg` without this crate having to model every error shape.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    pub payload: String,
}

impl OperationError {
    #[must_use]
    pub fn new<S: Into<String>>(payload: S) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The `op` field of the rejected frame, if the payload is a JSON object carrying one.
    #[must_use]
    pub fn op(&self) -> Option<String> {
        self.field("op")
    }

    /// The server supplied reason, i.e. the `ret_msg` field.
    #[must_use]
    pub fn ret_msg(&self) -> Option<String> {
        self.field("ret_msg")
    }

    fn field(&self, name: &str) -> Option<String> {
        let value: Value = serde_json::from_str(&self.payload).ok()?;
        value.get(name)?.as_str().map(str::to_owned)
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op() {
            Some(op) => write!(f, "`{op}` operation rejected: {}", self.payload),
            None => write!(f, "operation rejected: {}", self.payload),
        }
    }
}

impl StdError for OperationError {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Synchronization;

impl fmt::Display for Synchronization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "synchronization error: a session is already running for this socket manager"
        )
    }
}

impl StdError for Synchronization {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Configuration, e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<rsa::Error> for Error {
    fn from(e: rsa::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<rsa::signature::Error> for Error {
    fn from(e: rsa::signature::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<rsa::pkcs8::Error> for Error {
    fn from(e: rsa::pkcs8::Error) -> Self {
        Error::with_source(Kind::Configuration, e)
    }
}

impl From<rsa::pkcs1::Error> for Error {
    fn from(e: rsa::pkcs1::Error) -> Self {
        Error::with_source(Kind::Configuration, e)
    }
}

impl From<hmac::digest::InvalidLength> for Error {
    fn from(e: hmac::digest::InvalidLength) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<Configuration> for Error {
    fn from(err: Configuration) -> Self {
        Error::with_source(Kind::Configuration, err)
    }
}

impl From<OperationError> for Error {
    fn from(err: OperationError) -> Self {
        Error::with_source(Kind::Operation, err)
    }
}

impl From<Synchronization> for Error {
    fn from(err: Synchronization) -> Self {
        Error::with_source(Kind::Synchronization, err)
    }
}
