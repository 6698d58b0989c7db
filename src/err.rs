use thiserror::Error;

use crate::packet::{CorrelationId, PacketType};

/// A failure reported by an action implementation. These are business-logic failures, such as a request
/// naming an account that does not exist. They are passed through the handler and the dispatcher unchanged.
#[derive(Error, Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum ActionError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Missing field: {0}")]
    MissingField(String),
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Directory error: {0}")]
    Directory(String),
    #[error("Action failed: {0}")]
    Other(String),
}

pub type ActionResult<T> = Result<T, ActionError>;

#[derive(Error, Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum AmieError {
    #[error("Register handler failed: {0} is already bound")]
    DuplicateBinding(PacketType),
    #[error("Unknown action: no handler bound for {0}")]
    UnknownAction(PacketType),
    #[error("Invalid packet type: {0}")]
    InvalidPacketType(String),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("Track task failed: a task is already pending for {0}")]
    TaskAlreadyPending(CorrelationId),
    #[error("Unknown task: {0}")]
    UnknownTask(CorrelationId),

    #[error("Create reply failed: {0} has no reply")]
    TerminalPacket(PacketType),
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("IO error: {0}")]
    IOError(String),
}

impl AmieError {
    /// Whether this error should be reported back to the peer site as a failed transaction rather than
    /// treated as a fault of the local process.
    pub fn is_protocol_rejection(&self) -> bool {
        matches!(
            self,
            AmieError::UnknownAction(_)
                | AmieError::Action(_)
                | AmieError::MalformedPacket(_)
                | AmieError::InvalidPacketType(_)
                | AmieError::TerminalPacket(_)
        )
    }
}

impl From<std::io::Error> for AmieError {
    fn from(error: std::io::Error) -> Self {
        AmieError::IOError(error.to_string())
    }
}

impl From<serde_json::error::Error> for AmieError {
    fn from(error: serde_json::error::Error) -> Self {
        AmieError::MalformedPacket(error.to_string())
    }
}

pub type AmieResult<T> = Result<T, AmieError>;

#[test]
fn test_protocol_rejection() {
    let tag = PacketType::new("request_unicorn_modify").unwrap();
    assert!(AmieError::UnknownAction(tag.clone()).is_protocol_rejection());
    assert!(AmieError::from(ActionError::InvalidTarget("p1".into())).is_protocol_rejection());
    assert!(!AmieError::DuplicateBinding(tag).is_protocol_rejection());
    assert!(!AmieError::IOError("disk".into()).is_protocol_rejection());
    assert!(!AmieError::TaskAlreadyPending(CorrelationId::from("R1")).is_protocol_rejection());
}

#[test]
fn test_action_error_is_transparent() {
    let err: AmieError = ActionError::MissingField("person_id".into()).into();
    assert_eq!("Missing field: person_id", err.to_string());
}
