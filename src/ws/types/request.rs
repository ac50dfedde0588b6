use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;
use crate::{Result, Timestamp};

/// Keepalive frame sent by the heartbeat loop.
pub(crate) const PING: &str = r#"{"op":"ping"}"#;

/// Subscription operation.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Op {
    Subscribe,
    Unsubscribe,
}

impl FromStr for Op {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "subscribe" => Ok(Self::Subscribe),
            "unsubscribe" => Ok(Self::Unsubscribe),
            other => Err(Error::configuration(format!(
                "op must be 'subscribe' or 'unsubscribe', but received '{other}'"
            ))),
        }
    }
}

/// `{"op":"subscribe"|"unsubscribe","args":[topic,...]}`
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    pub op: Op,
    #[serde(rename = "args")]
    pub topics: Vec<String>,
}

impl SubscriptionRequest {
    /// Builds a request from a textual `op`. Anything other than `subscribe` or `unsubscribe` is
    /// rejected.
    pub fn new<I, T>(op: &str, topics: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Ok(Self {
            op: op.parse()?,
            topics: topics.into_iter().map(Into::into).collect(),
        })
    }

    #[must_use]
    pub fn subscribe(topics: Vec<String>) -> Self {
        Self {
            op: Op::Subscribe,
            topics,
        }
    }

    #[must_use]
    pub fn unsubscribe(topics: Vec<String>) -> Self {
        Self {
            op: Op::Unsubscribe,
            topics,
        }
    }
}

/// `{"op":"auth","args":[api_key, expires, signature]}`
#[derive(Debug, Serialize)]
pub(crate) struct AuthRequest<'key> {
    op: &'static str,
    args: (&'key str, Timestamp, String),
}

impl<'key> AuthRequest<'key> {
    pub(crate) fn new(api_key: &'key str, expires: Timestamp, signature: String) -> Self {
        Self {
            op: "auth",
            args: (api_key, expires, signature),
        }
    }
}
