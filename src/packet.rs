use crate::err::*;
use crate::{INFORM_TRANSACTION_COMPLETE, STATUS_FAILED, STATUS_SUCCESS};
use regex::Regex;
use serde_json::Value;
use std::{collections::BTreeMap, fmt, path::Path, str::FromStr};

lazy_static! {
    static ref RGX_PACKET_TYPE: Regex = Regex::new(r"^[a-z][a-z0-9_]*$").unwrap();
}

// Request type and the reply type the peer expects back. Anything not listed is
// answered with an inform_transaction_complete.
const REPLY_TYPES: &[(&str, &str)] = &[
    ("request_account_create", "notify_account_create"),
    ("notify_account_create", "data_account_create"),
    ("request_project_create", "notify_project_create"),
    ("notify_project_create", "data_project_create"),
    ("request_project_inactivate", "notify_project_inactivate"),
    ("request_project_reactivate", "notify_project_reactivate"),
    ("request_account_inactivate", "notify_account_inactivate"),
    ("request_account_reactivate", "notify_account_reactivate"),
];

pub const STATUS_CODE_FIELD: &str = "status_code";
pub const MESSAGE_FIELD: &str = "message";

/// The field-name to value mapping carried in the body of a packet.
pub type PacketBody = BTreeMap<String, Value>;

/// Identifies the action a packet requests, e.g. `request_user_modify`. Used as the handler registry key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct PacketType(String);

impl PacketType {
    pub fn new(packet_type: &str) -> AmieResult<PacketType> {
        if !RGX_PACKET_TYPE.is_match(packet_type) {
            return Err(AmieError::InvalidPacketType(packet_type.to_string()));
        }

        Ok(PacketType(packet_type.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The type of the packet sent back in reply to a packet of this type. Errors if this type ends a
    /// transaction and so has no reply.
    pub fn reply_type(&self) -> AmieResult<PacketType> {
        if self.0 == INFORM_TRANSACTION_COMPLETE {
            return Err(AmieError::TerminalPacket(self.clone()));
        }

        let reply = REPLY_TYPES
            .iter()
            .find(|(request, _)| *request == self.0)
            .map(|(_, reply)| *reply)
            .unwrap_or(INFORM_TRANSACTION_COMPLETE);

        Ok(PacketType(reply.to_string()))
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl FromStr for PacketType {
    type Err = AmieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PacketType::new(s)
    }
}

impl TryFrom<String> for PacketType {
    type Error = AmieError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PacketType::new(&value)
    }
}

impl From<PacketType> for String {
    fn from(packet_type: PacketType) -> Self {
        packet_type.0
    }
}

/// Links a reply or a pending task back to the request it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        CorrelationId(id.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        CorrelationId(id)
    }
}

/// An inbound protocol message requesting an action. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ActionPacket {
    #[serde(rename = "type")]
    packet_type: PacketType,
    #[serde(rename = "correlation_id")]
    correlation: CorrelationId,
    #[serde(default)]
    body: PacketBody,
}

impl ActionPacket {
    pub fn new(packet_type: PacketType, correlation: CorrelationId, body: PacketBody) -> Self {
        ActionPacket {
            packet_type,
            correlation,
            body,
        }
    }

    /// Decode a packet from its JSON form, `{"type": .., "correlation_id": .., "body": {..}}`.
    pub fn from_json(json: &str) -> AmieResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn packet_type(&self) -> &PacketType {
        &self.packet_type
    }

    pub fn correlation(&self) -> &CorrelationId {
        &self.correlation
    }

    pub fn body(&self) -> &PacketBody {
        &self.body
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Gets a required string field from the body.
    pub fn field_str(&self, name: &str) -> ActionResult<&str> {
        match self.body.get(name) {
            Some(Value::String(value)) => Ok(value),
            Some(_) => Err(ActionError::InvalidField {
                field: name.to_string(),
                reason: "expected a string".to_string(),
            }),
            None => Err(ActionError::MissingField(name.to_string())),
        }
    }

    /// Build the reply to this packet. The reply carries this packet's correlation id and the reply type
    /// for this packet's type. A transaction completion reply reports success unless `fields` says otherwise.
    pub fn create_reply(&self, mut fields: PacketBody) -> AmieResult<ReplyPacket> {
        let packet_type = self.packet_type.reply_type()?;

        if packet_type.as_str() == INFORM_TRANSACTION_COMPLETE {
            fields
                .entry(STATUS_CODE_FIELD.to_string())
                .or_insert_with(|| Value::from(STATUS_SUCCESS));
        }

        Ok(ReplyPacket {
            packet_type,
            correlation: self.correlation.clone(),
            body: fields,
        })
    }

    /// Build a reply telling the peer that the transaction for this packet failed.
    pub fn create_failure_reply(&self, error: &AmieError) -> ReplyPacket {
        let mut body = PacketBody::new();
        body.insert(STATUS_CODE_FIELD.to_string(), Value::from(STATUS_FAILED));
        body.insert(MESSAGE_FIELD.to_string(), Value::from(error.to_string()));

        ReplyPacket {
            packet_type: PacketType(INFORM_TRANSACTION_COMPLETE.to_string()),
            correlation: self.correlation.clone(),
            body,
        }
    }
}

/// An outbound message answering an `ActionPacket`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ReplyPacket {
    #[serde(rename = "type")]
    packet_type: PacketType,
    #[serde(rename = "correlation_id")]
    correlation: CorrelationId,
    #[serde(default)]
    body: PacketBody,
}

impl ReplyPacket {
    pub fn packet_type(&self) -> &PacketType {
        &self.packet_type
    }

    pub fn correlation(&self) -> &CorrelationId {
        &self.correlation
    }

    pub fn body(&self) -> &PacketBody {
        &self.body
    }

    pub fn status_code(&self) -> Option<&str> {
        self.body.get(STATUS_CODE_FIELD).and_then(Value::as_str)
    }

    pub fn to_json(&self) -> AmieResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for ReplyPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} #{}", &self.packet_type, &self.correlation)?;
        if let Some(status) = self.status_code() {
            write!(f, " {}", status)?;
        }
        Ok(())
    }
}

/// Read newline-delimited JSON packets from a file. Blank lines are skipped.
pub async fn read_packets(path: &Path) -> AmieResult<Vec<ActionPacket>> {
    let text = tokio::fs::read_to_string(path).await?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(ActionPacket::from_json)
        .collect()
}

#[cfg(test)]
fn packet(packet_type: &str, correlation: &str) -> ActionPacket {
    ActionPacket::new(
        PacketType::new(packet_type).unwrap(),
        correlation.into(),
        PacketBody::new(),
    )
}

#[test]
fn test_rgx_packet_type() {
    assert!(RGX_PACKET_TYPE.is_match("request_user_modify"));
    assert!(RGX_PACKET_TYPE.is_match("a"));
    assert!(RGX_PACKET_TYPE.is_match("a0"));

    assert!(!RGX_PACKET_TYPE.is_match(""));
    assert!(!RGX_PACKET_TYPE.is_match("0a"));
    assert!(!RGX_PACKET_TYPE.is_match("_a"));
    assert!(!RGX_PACKET_TYPE.is_match("Request"));
    assert!(!RGX_PACKET_TYPE.is_match("request user"));
    assert!(!RGX_PACKET_TYPE.is_match("request/user"));
}

#[test]
fn test_reply_type() {
    assert_reply_type("request_account_create", "notify_account_create");
    assert_reply_type("notify_project_create", "data_project_create");
    assert_reply_type("request_account_reactivate", "notify_account_reactivate");
    assert_reply_type("request_user_modify", INFORM_TRANSACTION_COMPLETE);
    assert_reply_type("request_person_merge", INFORM_TRANSACTION_COMPLETE);
    assert_reply_type("data_account_create", INFORM_TRANSACTION_COMPLETE);
}

#[cfg(test)]
fn assert_reply_type(request: &str, expect: &str) {
    let reply = PacketType::new(request).unwrap().reply_type().unwrap();
    assert_eq!(expect, reply.as_str());
    assert_ne!(request, reply.as_str());
}

#[test]
fn test_terminal_packet_has_no_reply() {
    let itc = packet(INFORM_TRANSACTION_COMPLETE, "R1");
    let err = itc.create_reply(PacketBody::new()).unwrap_err();
    assert_eq!(AmieError::TerminalPacket(itc.packet_type().clone()), err);

    let failure = itc.create_failure_reply(&err);
    assert_eq!(&CorrelationId::from("R1"), failure.correlation());
}

#[test]
fn test_reply_correlation() {
    for correlation in ["R1", "R2", "", "12345.6789"] {
        let request = packet("request_user_modify", correlation);
        let reply = request.create_reply(PacketBody::new()).unwrap();
        assert_eq!(request.correlation(), reply.correlation());
    }
}

#[test]
fn test_reply_status() {
    let reply = packet("request_user_modify", "R1")
        .create_reply(PacketBody::new())
        .unwrap();
    assert_eq!(Some(STATUS_SUCCESS), reply.status_code());

    let reply = packet("request_account_create", "R1")
        .create_reply(PacketBody::new())
        .unwrap();
    assert_eq!(None, reply.status_code());

    let err = AmieError::UnknownAction(PacketType::new("request_unicorn_modify").unwrap());
    let reply = packet("request_unicorn_modify", "R1").create_failure_reply(&err);
    assert_eq!(INFORM_TRANSACTION_COMPLETE, reply.packet_type().as_str());
    assert_eq!(Some(STATUS_FAILED), reply.status_code());
    assert_eq!(
        Some(&Value::from(err.to_string())),
        reply.body().get(MESSAGE_FIELD)
    );
}

#[test]
fn test_from_json() {
    let packet = ActionPacket::from_json(
        r#"{"type": "request_user_modify", "correlation_id": "R1", "body": {"person_id": "p1"}}"#,
    )
    .unwrap();
    assert_eq!("request_user_modify", packet.packet_type().as_str());
    assert_eq!("R1", packet.correlation().as_str());
    assert_eq!(Ok("p1"), packet.field_str("person_id"));
    assert_eq!(
        Err(ActionError::MissingField("first_name".into())),
        packet.field_str("first_name")
    );

    let no_body = ActionPacket::from_json(r#"{"type": "request_user_modify", "correlation_id": "R1"}"#)
        .unwrap();
    assert!(no_body.body().is_empty());
}

#[test]
fn test_from_json_rejects_bad_type() {
    let err = ActionPacket::from_json(r#"{"type": "Request User", "correlation_id": "R1"}"#)
        .unwrap_err();
    assert!(matches!(err, AmieError::MalformedPacket(_)));

    let err = ActionPacket::from_json("not json").unwrap_err();
    assert!(matches!(err, AmieError::MalformedPacket(_)));
}

#[test]
fn test_reply_to_json() {
    let reply = packet("request_user_modify", "R1")
        .create_reply(PacketBody::new())
        .unwrap();
    let json: Value = serde_json::from_str(&reply.to_json().unwrap()).unwrap();
    assert_eq!(Value::from(INFORM_TRANSACTION_COMPLETE), json["type"]);
    assert_eq!(Value::from("R1"), json["correlation_id"]);
    assert_eq!(Value::from(STATUS_SUCCESS), json["body"][STATUS_CODE_FIELD]);
}

#[tokio::test]
async fn test_read_packets() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"type": "request_user_modify", "correlation_id": "R1"}}"#).unwrap();
    writeln!(file).unwrap();
    writeln!(file, r#"{{"type": "request_person_merge", "correlation_id": "R2", "body": {{}}}}"#).unwrap();

    let packets = read_packets(file.path()).await.unwrap();
    assert_eq!(2, packets.len());
    assert_eq!("request_person_merge", packets[1].packet_type().as_str());
}
