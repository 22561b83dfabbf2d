use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload vapi POSTs to our tool server routes while a call is live:
/// `{"message": {"toolCalls": [{id, toolId, function: {name, arguments}}]}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub message: ToolCallMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolCallMessage {
    #[serde(rename = "toolCalls", default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "toolId")]
    pub tool_id: Option<String>,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    /// Vapi sends `arguments` either as an object or as a JSON string.
    pub fn arguments(&self) -> Map<String, Value> {
        match &self.function.arguments {
            Value::Object(map) => map.clone(),
            Value::String(raw) => serde_json::from_str::<Value>(raw)
                .ok()
                .and_then(|parsed| parsed.as_object().cloned())
                .unwrap_or_default(),
            _ => Map::new(),
        }
    }
}

impl ToolCallPayload {
    /// Only the first tool call is serviced; the assistant is prompted to use
    /// at most one tool per turn.
    pub fn first_tool_call(&self) -> Option<&ToolCall> {
        self.message.tool_calls.first()
    }
}

/// Webhook payload. Only `end-of-call-report` carries the fields below;
/// everything is optional so other message types still parse.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub message: WebhookMessage,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub call: Option<WebhookCall>,
    #[serde(rename = "endedReason")]
    pub ended_reason: Option<String>,
    pub summary: Option<String>,
    #[serde(rename = "recordingUrl")]
    pub recording_url: Option<String>,
    #[serde(rename = "stereoRecordingUrl")]
    pub stereo_recording_url: Option<String>,
    #[serde(rename = "startedAt")]
    pub started_at: Option<String>,
    #[serde(rename = "endedAt")]
    pub ended_at: Option<String>,
    #[serde(rename = "durationSeconds")]
    pub duration_seconds: Option<f64>,
    pub cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookCall {
    pub id: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "assistantId")]
    pub assistant_id: Option<String>,
    pub customer: Option<Customer>,
}

#[derive(Debug, Deserialize)]
pub struct Customer {
    pub number: Option<String>,
}

impl WebhookPayload {
    pub fn call_id(&self) -> Option<String> {
        self.message.call.as_ref().and_then(|c| c.id.clone())
    }

    pub fn phone_number(&self) -> Option<String> {
        self.message
            .call
            .as_ref()
            .and_then(|c| c.customer.as_ref())
            .and_then(|customer| customer.number.clone())
    }

    /// Call status as vapi reported it, when the report carries one.
    pub fn call_status(&self) -> Option<String> {
        self.message.call.as_ref().and_then(|c| c.status.clone())
    }
}

/// "2024-03-16T00:00:00Z" style timestamps from vapi into epoch seconds.
pub fn parse_rfc3339_epoch(raw: &str) -> Option<i32> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_call_with_object_arguments() {
        let payload: ToolCallPayload = serde_json::from_value(json!({
            "message": {
                "toolCalls": [{
                    "id": "call_1",
                    "toolId": "tool-uuid",
                    "function": {
                        "name": "search_water_board",
                        "arguments": {"search_query": "sector 12"}
                    }
                }]
            }
        }))
        .unwrap();

        let call = payload.first_tool_call().unwrap();
        assert_eq!(call.tool_id.as_deref(), Some("tool-uuid"));
        let args = call.arguments();
        assert_eq!(args.get("search_query").unwrap(), "sector 12");
    }

    #[test]
    fn parses_tool_call_with_string_arguments() {
        let payload: ToolCallPayload = serde_json::from_value(json!({
            "message": {
                "toolCalls": [{
                    "id": "call_2",
                    "function": {
                        "name": "log_complaints",
                        "arguments": "{\"name\": \"Asha\", \"issue\": \"leak\"}"
                    }
                }]
            }
        }))
        .unwrap();

        let args = payload.first_tool_call().unwrap().arguments();
        assert_eq!(args.get("name").unwrap(), "Asha");
        assert_eq!(args.get("issue").unwrap(), "leak");
    }

    #[test]
    fn garbled_string_arguments_become_empty() {
        let payload: ToolCallPayload = serde_json::from_value(json!({
            "message": {
                "toolCalls": [{
                    "id": "call_3",
                    "function": {"name": "search_x", "arguments": "not json"}
                }]
            }
        }))
        .unwrap();

        assert!(payload.first_tool_call().unwrap().arguments().is_empty());
    }

    #[test]
    fn missing_tool_calls_parses_to_empty_list() {
        let payload: ToolCallPayload =
            serde_json::from_value(json!({"message": {}})).unwrap();
        assert!(payload.first_tool_call().is_none());
    }

    #[test]
    fn parses_end_of_call_report() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "message": {
                "type": "end-of-call-report",
                "endedReason": "customer-ended-call",
                "summary": "Asked about pension scheme eligibility.",
                "recordingUrl": "https://recordings/abc.wav",
                "startedAt": "2025-03-16T10:00:00Z",
                "endedAt": "2025-03-16T10:02:30Z",
                "durationSeconds": 150.0,
                "cost": 0.12,
                "call": {
                    "id": "call-uuid",
                    "status": "ended",
                    "customer": {"number": "+911234567890"}
                }
            }
        }))
        .unwrap();

        assert_eq!(payload.message.message_type, "end-of-call-report");
        assert_eq!(payload.call_id().as_deref(), Some("call-uuid"));
        assert_eq!(payload.phone_number().as_deref(), Some("+911234567890"));
        assert_eq!(payload.call_status().as_deref(), Some("ended"));
        let started = parse_rfc3339_epoch(payload.message.started_at.as_deref().unwrap());
        let ended = parse_rfc3339_epoch(payload.message.ended_at.as_deref().unwrap());
        assert_eq!(ended.unwrap() - started.unwrap(), 150);
    }

    #[test]
    fn report_without_status_yields_none() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "message": {
                "type": "end-of-call-report",
                "call": {"id": "call-uuid"}
            }
        }))
        .unwrap();
        assert!(payload.call_status().is_none());
    }
}
