use serde::Deserialize;
use serde::Serialize;

/// One line written to the tutor backend's stdin, either to start a chat
/// turn or to ask the backend to reattach a conversation after reconnect.
/// Newline-delimited JSON, tagged on `type` the same way the client/server
/// protocol is — see `tutor_protocol::message`.
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendRequest<'a> {
    Chat { message: &'a str, code: &'a str },
    Resume { conversation_id: &'a str },
}

/// One line read from the tutor backend's stdout.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendLine {
    Chunk { text: String },
    Done {
        text: String,
        #[serde(default)]
        conversation_id: Option<String>,
    },
    ResumeAck { ok: bool },
}
