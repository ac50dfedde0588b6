use serde::Deserialize;

/// Protocol control frame, e.g. the reply to `auth`, `subscribe` or `ping`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlFrame {
    pub op: String,
    #[serde(default)]
    pub success: bool,
    pub conn_id: Option<String>,
    pub ret_msg: Option<String>,
    pub req_id: Option<String>,
}
