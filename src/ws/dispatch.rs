//! Classification of inbound frames into data and protocol control traffic.

use std::num::FpCategory;

use serde_json::Value;

use super::error::WsError;
use crate::Result;
use crate::error::OperationError;

/// An inbound frame that did not fail classification.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `{"topic":..., "data":...}`, handed to the caller unchanged
    Data(Value),
    /// Reply to a heartbeat ping
    Pong,
    /// Successful acknowledgement of any other operation
    Ack {
        /// The acknowledged `op`
        op: String,
    },
}

/// Classifies one raw frame.
///
/// A control frame whose `success` is falsy becomes an [`OperationError`] carrying `raw`; a frame
/// matching neither shape is a [`WsError::InvalidMessage`].
pub fn classify(raw: &str) -> Result<Frame> {
    let value: Value = serde_json::from_str(raw).map_err(WsError::MessageParse)?;

    let Value::Object(fields) = &value else {
        return Err(WsError::InvalidMessage(raw.to_owned()).into());
    };

    if fields.contains_key("topic") && fields.contains_key("data") {
        return Ok(Frame::Data(value));
    }

    match fields.get("op") {
        Some(Value::String(op)) if op == "pong" => Ok(Frame::Pong),
        Some(op) if is_truthy(fields.get("success")) => Ok(Frame::Ack {
            op: op.as_str().unwrap_or_default().to_owned(),
        }),
        Some(_) => Err(OperationError::new(raw).into()),
        None => Err(WsError::InvalidMessage(raw.to_owned()).into()),
    }
}

/// Returns the data frame carried by `raw`, or `None` for control traffic that is swallowed.
pub(crate) fn dispatch(raw: &str) -> Result<Option<Value>> {
    Ok(match classify(raw)? {
        Frame::Data(value) => Some(value),
        Frame::Pong => {
            #[cfg(feature = "tracing")]
            tracing::trace!("Heartbeat acknowledged");
            None
        }
        Frame::Ack { op } => {
            #[cfg(feature = "tracing")]
            tracing::debug!(%op, "Operation acknowledged");
            #[cfg(not(feature = "tracing"))]
            let _: &String = &op;
            None
        }
    })
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n.classify() != FpCategory::Zero),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}
