use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of `MATCH_REQUEST`, also the body of `POST /match/request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    /// The receiver's material the requester wants.
    pub material_id: i64,
    pub receiver_id: i64,
    /// The requester's own material offered in exchange.
    pub requester_material_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchAction {
    Accept,
    Reject,
    Complete,
}

impl MatchAction {
    pub fn path_segment(self) -> &'static str {
        match self {
            MatchAction::Accept => "accept",
            MatchAction::Reject => "reject",
            MatchAction::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResponse {
    pub match_id: i64,
    pub action: MatchAction,
}

/// Outbound envelope: `{"type": "MATCH_REQUEST" | "MATCH_RESPONSE", "data": {...}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchCommand {
    MatchRequest(MatchRequest),
    MatchResponse(MatchResponse),
}

impl MatchCommand {
    pub fn respond(match_id: i64, action: MatchAction) -> Self {
        MatchCommand::MatchResponse(MatchResponse { match_id, action })
    }
}

/// Inbound envelope. The server's `type` vocabulary is open-ended, so `data` stays untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl MatchEvent {
    /// Server-side rejections arrive as `ERROR` frames.
    pub fn is_error(&self) -> bool {
        self.kind.eq_ignore_ascii_case("ERROR")
    }

    pub(crate) fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_shape() {
        let command = MatchCommand::MatchRequest(MatchRequest {
            material_id: 10,
            receiver_id: 7,
            requester_material_id: 3,
        });
        assert_eq!(
            serde_json::to_value(command).unwrap(),
            json!({
                "type": "MATCH_REQUEST",
                "data": { "materialId": 10, "receiverId": 7, "requesterMaterialId": 3 }
            })
        );
    }

    #[test]
    fn response_envelope_shape() {
        let value = serde_json::to_value(MatchCommand::respond(55, MatchAction::Complete)).unwrap();
        assert_eq!(
            value,
            json!({ "type": "MATCH_RESPONSE", "data": { "matchId": 55, "action": "COMPLETE" } })
        );
        assert_eq!(MatchAction::Reject.path_segment(), "reject");
    }

    #[test]
    fn inbound_frames() {
        let event = MatchEvent::parse(r#"{"type":"MATCH_ACCEPTED","data":{"matchId":5}}"#).unwrap();
        assert_eq!(event.kind, "MATCH_ACCEPTED");
        assert_eq!(event.data["matchId"], 5);
        assert!(!event.is_error());

        let bare = MatchEvent::parse(r#"{"type":"error"}"#).unwrap();
        assert!(bare.is_error());
        assert_eq!(bare.data, Value::Null);

        assert!(MatchEvent::parse("not json").is_err());
        assert!(MatchEvent::parse(r#"{"data":1}"#).is_err());
    }
}
