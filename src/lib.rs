#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod auth;
pub mod error;
pub mod ws;

use crate::error::Error;

pub use auth::{Credentials, SignStyle};
pub use ws::{Channel, Network, Session, SocketManager};

pub type Result<T> = std::result::Result<T, Error>;

/// Timestamp in milliseconds since [`std::time::UNIX_EPOCH`]
pub type Timestamp = i64;
