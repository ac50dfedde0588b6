//! Private channel login.

use chrono::Utc;

use super::connection::{Connection, Io};
use super::error::WsError;
use super::types::request::AuthRequest;
use super::types::response::ControlFrame;
use crate::auth::Credentials;
use crate::error::OperationError;
use crate::{Result, Timestamp};

/// How long, in milliseconds, a login signature stays valid.
const EXPIRES_AFTER_MS: Timestamp = 1000;

/// Logs in on a freshly opened `connection` and returns the session id assigned by the server.
///
/// Nothing else is read or written on the connection until the reply arrives.
pub(crate) async fn authenticate(
    connection: &Connection,
    credentials: &Credentials,
) -> Result<Option<String>> {
    let expires = Utc::now().timestamp_millis() + EXPIRES_AFTER_MS;
    let signature = credentials.sign_websocket(expires)?;
    let request = serde_json::to_string(&AuthRequest::new(credentials.key(), expires, signature))?;

    if connection.send(&request).await != Io::Done(()) {
        return Err(WsError::ConnectionClosed.into());
    }

    let Io::Done(raw) = connection.recv().await else {
        return Err(WsError::ConnectionClosed.into());
    };

    verify(&raw?)
}

fn verify(raw: &str) -> Result<Option<String>> {
    let reply: ControlFrame = serde_json::from_str(raw).map_err(WsError::MessageParse)?;

    if reply.op != "auth" {
        return Err(WsError::InvalidMessage(raw.to_owned()).into());
    }
    if !reply.success {
        return Err(OperationError::new(raw).into());
    }

    Ok(reply.conn_id)
}
