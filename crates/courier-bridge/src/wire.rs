//! JSON shapes exchanged with the protocol sidecar.

use serde::{Deserialize, Serialize};

use courier_core::{domain::GroupInfo, transport::ConnectionEvent};

/// Close status the protocol uses for "logged out" (credentials revoked).
pub const LOGGED_OUT_STATUS: u16 = 401;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionRequest<'a> {
    pub identity: &'a str,
    pub credential_dir: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct PairingCodeRequest<'a> {
    pub identity: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct PairingCodeResponse {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SendTextRequest<'a> {
    pub to: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct EventsResponse {
    #[serde(default)]
    pub cursor: u64,
    #[serde(default)]
    pub events: Vec<WireEvent>,
}

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireEvent {
    Connecting,
    Open,
    Close {
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        terminal: bool,
        #[serde(default, rename = "statusCode")]
        status_code: Option<u16>,
    },
    Creds,
    #[serde(other)]
    Unknown,
}

impl WireEvent {
    pub fn into_event(self) -> Option<ConnectionEvent> {
        match self {
            WireEvent::Connecting => Some(ConnectionEvent::Connecting),
            WireEvent::Open => Some(ConnectionEvent::Open),
            WireEvent::Creds => Some(ConnectionEvent::CredentialsUpdated),
            WireEvent::Close {
                reason,
                terminal,
                status_code,
            } => {
                let terminal = terminal || status_code == Some(LOGGED_OUT_STATUS);
                let reason = reason.unwrap_or_else(|| match status_code {
                    Some(code) => format!("closed with status {code}"),
                    None => "connection closed".to_string(),
                });
                Some(ConnectionEvent::Closed { reason, terminal })
            }
            WireEvent::Unknown => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireGroup {
    #[serde(default)]
    pub subject: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupsResponse {
    #[serde(default)]
    pub groups: Vec<WireGroup>,
}

impl GroupsResponse {
    pub fn into_groups(self) -> Vec<GroupInfo> {
        self.groups
            .into_iter()
            .map(|g| GroupInfo {
                name: g.subject,
                id: g.id,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(v: serde_json::Value) -> Option<ConnectionEvent> {
        serde_json::from_value::<WireEvent>(v).unwrap().into_event()
    }

    #[test]
    fn lifecycle_events_decode() {
        assert_eq!(
            decode(json!({"type": "connecting"})),
            Some(ConnectionEvent::Connecting)
        );
        assert_eq!(decode(json!({"type": "open"})), Some(ConnectionEvent::Open));
        assert_eq!(
            decode(json!({"type": "creds"})),
            Some(ConnectionEvent::CredentialsUpdated)
        );
    }

    #[test]
    fn logged_out_status_is_terminal() {
        assert_eq!(
            decode(json!({"type": "close", "statusCode": 401})),
            Some(ConnectionEvent::closed("closed with status 401", true))
        );
        assert_eq!(
            decode(json!({"type": "close", "statusCode": 428, "reason": "timed out"})),
            Some(ConnectionEvent::closed("timed out", false))
        );
        assert_eq!(
            decode(json!({"type": "close", "terminal": true, "reason": "bad session"})),
            Some(ConnectionEvent::closed("bad session", true))
        );
    }

    #[test]
    fn unknown_events_are_ignored() {
        assert_eq!(decode(json!({"type": "qr", "data": "..."})), None);
    }

    #[test]
    fn groups_map_subject_to_name() {
        let resp: GroupsResponse = serde_json::from_value(json!({
            "groups": [{"subject": "Family", "id": "1203@g.us"}]
        }))
        .unwrap();
        let groups = resp.into_groups();
        assert_eq!(groups[0].name, "Family");
        assert_eq!(groups[0].short_id(), "1203");
    }
}
