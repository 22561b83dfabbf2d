use anyhow::{anyhow, Result};
use regex::Regex;
use reqwest::multipart;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info};

/// Vapi requires function names to match /^[a-zA-Z0-9_-]{1,64}$/.
pub fn sanitize_function_name(name: &str) -> String {
    let stripped = Regex::new(r"[^a-zA-Z0-9_-]")
        .expect("static regex")
        .replace_all(name, "")
        .to_string();
    let mut sanitized = stripped.trim_start_matches(['_', '-']).to_string();

    if sanitized.is_empty() {
        sanitized = "function_1".to_string();
    }
    sanitized.truncate(64);

    // Truncation can leave a leading separator again.
    if sanitized.starts_with(['_', '-']) {
        sanitized.replace_range(0..1, "f");
    }
    sanitized
}

/// Thin client over the vapi REST API. Tool and assistant payload shapes are
/// vendor-defined; the builders below are kept as plain functions on the
/// client so handlers and tests can inspect the JSON without the network.
pub struct VapiClient {
    api_key: String,
    base_url: String,
    phone_number_id: String,
    server_url: String,
    server_secret: String,
    query_tool_id: String,
    end_call_tool_id: String,
}

impl VapiClient {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("VAPI_API_KEY").expect("VAPI_API_KEY must be set"),
            base_url: std::env::var("VAPI_BASE_URL")
                .unwrap_or_else(|_| "https://api.vapi.ai".to_string()),
            phone_number_id: std::env::var("VAPI_PHONE_NUMBER_ID")
                .expect("VAPI_PHONE_NUMBER_ID must be set"),
            server_url: std::env::var("SERVER_URL").expect("SERVER_URL must be set"),
            server_secret: std::env::var("VAPI_SERVER_URL_SECRET")
                .expect("VAPI_SERVER_URL_SECRET must be set"),
            query_tool_id: std::env::var("VAPI_QUERY_TOOL_ID")
                .expect("VAPI_QUERY_TOOL_ID must be set"),
            end_call_tool_id: std::env::var("VAPI_END_CALL_TOOL_ID")
                .expect("VAPI_END_CALL_TOOL_ID must be set"),
        }
    }

    /// The two tools every assistant carries: knowledge query and end-call.
    pub fn base_tool_ids(&self) -> Vec<String> {
        vec![self.query_tool_id.clone(), self.end_call_tool_id.clone()]
    }

    pub fn query_tool_id(&self) -> &str {
        &self.query_tool_id
    }

    pub fn db_query_url(&self) -> String {
        format!("{}/api/vapi/db-query", self.server_url)
    }

    pub fn sheet_write_url(&self) -> String {
        format!("{}/api/vapi/sheet-write", self.server_url)
    }

    fn webhook_url(&self) -> String {
        format!("{}/api/vapi/webhook", self.server_url)
    }

    fn http(&self) -> reqwest::Client {
        reqwest::Client::new()
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    fn llm_context() -> Value {
        json!({
            "environment": "live_voice_call",
            "audience": "Indian citizen",
            "interaction_type": "government awareness service",
            "constraints": {
                "no_sensitive_data": true,
                "no_political_opinions": true,
                "safety_priority": "high"
            }
        })
    }

    fn system_prompt(name: &str, description: &str) -> String {
        format!(
            "You are {name}. {description}\n\
             You are an autonomous, tool-using reasoning system operating in a live voice call.\n\
             Context: {context}\n\n\
             RULES:\n\
             - Speak clearly, politely, and concisely.\n\
             - Do NOT ask for sensitive personal information.\n\
             - Do NOT express political or legal opinions.\n\
             - Never mention tool names to the caller.\n\n\
             KNOWLEDGE & TOOLS:\n\
             - If required information is not already known with certainty, or must be accurate \
             and verified, retrieve it using the appropriate knowledge base or tool before \
             responding.\n\
             - Always wait for the tool response before continuing.\n\
             - Use at most one tool per turn.\n\n\
             TRANSFER TO HUMAN:\n\
             - If the user explicitly asks to speak to a human, expert, officer, or agent, invoke \
             `transfer_call_tool` immediately.\n\
             - Also invoke `transfer_call_tool` if the user is confused, frustrated, dissatisfied, \
             or if the issue requires human judgment or escalation.\n\n\
             ENDING THE CALL:\n\
             - If the user clearly indicates the conversation is finished, first politely ask if \
             any further help is needed. If the user confirms no further help, invoke \
             `end_call_tool`.\n\n\
             CONTINUE WITHOUT TOOLS:\n\
             - For greetings, clarifications, confirmations, or follow-up questions.\n\
             - When explaining information already retrieved.\n\n\
             ERROR & SAFETY:\n\
             - If a tool fails or returns no useful result, briefly apologize and offer to retry \
             or transfer to a human.\n\
             - Politely refuse illegal, unsafe, or harmful requests and offer a safe alternative \
             or human transfer.\n\n\
             CALL FLOW:\n\
             Understand the request, decide whether to answer directly, use a tool, or transfer, \
             respond clearly, ask if more help is needed, and end politely when appropriate.",
            name = name,
            description = description,
            context = Self::llm_context(),
        )
    }

    /// Merge base + dynamic tool ids, first occurrence wins.
    fn merged_tool_ids(base: &[String], dynamic: &[String]) -> Vec<String> {
        let mut merged: Vec<String> = Vec::new();
        for id in base.iter().chain(dynamic.iter()) {
            if !merged.contains(id) {
                merged.push(id.clone());
            }
        }
        merged
    }

    pub fn build_outbound_call_payload(
        &self,
        phone_number: &str,
        agent_name: &str,
        agent_description: &str,
        base_tool_ids: &[String],
        dynamic_tool_ids: &[String],
    ) -> Value {
        json!({
            "assistant": {
                "name": agent_name,
                "firstMessage": format!("Namaste, I am {}. How can I help you?", agent_name),
                "maxDurationSeconds": 43200,
                "silenceTimeoutSeconds": 3600,
                "model": {
                    "provider": "openai",
                    "model": "gpt-4.1-nano",
                    "toolIds": Self::merged_tool_ids(base_tool_ids, dynamic_tool_ids),
                    "messages": [{
                        "role": "system",
                        "content": Self::system_prompt(agent_name, agent_description)
                    }],
                    "temperature": 0.5
                },
                "voice": {"provider": "vapi", "voiceId": "Neha"},
                "transcriber": {
                    "model": "gemini-2.0-flash",
                    "provider": "google",
                    "language": "Multilingual"
                },
                "server": {
                    "url": self.webhook_url(),
                    "secret": self.server_secret
                },
                "serverMessages": ["end-of-call-report"]
            },
            "phoneNumberId": self.phone_number_id,
            "customer": {"number": phone_number}
        })
    }

    pub fn build_inbound_assistant_payload(
        &self,
        agent_name: &str,
        agent_description: &str,
        base_tool_ids: &[String],
        dynamic_tool_ids: &[String],
        file_ids: &[String],
    ) -> Value {
        let mut payload = json!({
            "name": format!("{}-Inbound", agent_name),
            "firstMessage": format!("Namaste. I am {}. How may I assist you today?", agent_name),
            "model": {
                "provider": "openai",
                "model": "gpt-4.1-nano",
                "toolIds": Self::merged_tool_ids(base_tool_ids, dynamic_tool_ids),
                "messages": [{
                    "role": "system",
                    "content": Self::system_prompt(agent_name, agent_description)
                }],
                "temperature": 0.4
            },
            "voice": {"provider": "vapi", "voiceId": "Neha"},
            "transcriber": {
                "language": "multi",
                "model": "nova-3",
                "provider": "deepgram"
            },
            "recordingEnabled": true,
            "endCallMessage": "Thank you for calling. Have a good day.",
            "server": {
                "url": self.webhook_url(),
                "secret": self.server_secret
            },
            "serverMessages": ["end-of-call-report"]
        });

        if !file_ids.is_empty() {
            payload["knowledgeBases"] = json!([{
                "name": "government_knowledge_base",
                "provider": "google",
                "model": "gemini-2.0-flash",
                "description": "Government schemes and information knowledge base",
                "fileIds": file_ids
            }]);
        }
        payload
    }

    /// POST /call. Returns the vapi call object; the caller tracks its id.
    pub async fn start_outbound_call(
        &self,
        phone_number: &str,
        agent_name: &str,
        agent_description: &str,
        base_tool_ids: &[String],
        dynamic_tool_ids: &[String],
    ) -> Result<Value> {
        let payload = self.build_outbound_call_payload(
            phone_number,
            agent_name,
            agent_description,
            base_tool_ids,
            dynamic_tool_ids,
        );

        info!("Starting outbound call to {}", phone_number);
        let res = self
            .http()
            .post(format!("{}/call", self.base_url))
            .header("Authorization", self.auth_header())
            .timeout(Duration::from_secs(30))
            .json(&payload)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            error!("Vapi /call failed ({}): {}", status, body);
            return Err(anyhow!("Vapi outbound call failed: {}", body));
        }
        Ok(res.json().await?)
    }

    /// POST /assistant then PATCH /phone-number/{id} so incoming calls hit the
    /// new assistant. Returns the assistant id.
    pub async fn start_inbound_agent(
        &self,
        agent_name: &str,
        agent_description: &str,
        base_tool_ids: &[String],
        dynamic_tool_ids: &[String],
        file_ids: &[String],
    ) -> Result<String> {
        let payload = self.build_inbound_assistant_payload(
            agent_name,
            agent_description,
            base_tool_ids,
            dynamic_tool_ids,
            file_ids,
        );

        let res = self
            .http()
            .post(format!("{}/assistant", self.base_url))
            .header("Authorization", self.auth_header())
            .timeout(Duration::from_secs(30))
            .json(&payload)
            .send()
            .await?;

        if !res.status().is_success() {
            let body = res.text().await.unwrap_or_default();
            error!("Vapi /assistant failed: {}", body);
            return Err(anyhow!("Vapi assistant creation failed: {}", body));
        }
        let assistant: Value = res.json().await?;
        let assistant_id = assistant["id"]
            .as_str()
            .ok_or_else(|| anyhow!("Vapi assistant response missing id"))?
            .to_string();
        info!("Inbound assistant created with ID: {}", assistant_id);

        let attach = self
            .http()
            .patch(format!(
                "{}/phone-number/{}",
                self.base_url, self.phone_number_id
            ))
            .header("Authorization", self.auth_header())
            .timeout(Duration::from_secs(30))
            .json(&json!({"assistantId": assistant_id}))
            .send()
            .await?;

        if !attach.status().is_success() {
            let body = attach.text().await.unwrap_or_default();
            error!("Vapi phone-number attach failed: {}", body);
            return Err(anyhow!("Attaching inbound assistant failed: {}", body));
        }
        info!("Inbound assistant attached to phone number");
        Ok(assistant_id)
    }

    /// POST /file (multipart). Returns the vapi file object with its id.
    pub async fn upload_file(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Value> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .unwrap_or_else(|_| {
                multipart::Part::bytes(Vec::new()).file_name(file_name.to_string())
            });
        let form = multipart::Form::new().part("file", part);

        let res = self
            .http()
            .post(format!("{}/file", self.base_url))
            .header("Authorization", self.auth_header())
            .timeout(Duration::from_secs(60))
            .multipart(form)
            .send()
            .await?;

        if !res.status().is_success() {
            let body = res.text().await.unwrap_or_default();
            error!("Vapi file upload failed: {}", body);
            return Err(anyhow!("Vapi file upload failed: {}", body));
        }
        Ok(res.json().await?)
    }

    /// PATCH the fixed knowledge query tool with the full current file list.
    /// An empty list is valid and clears the knowledge base.
    pub async fn update_query_tool(&self, file_ids: &[String]) -> Result<()> {
        let payload = json!({
            "function": {
                "name": "query_tool",
                "description": "This tool is an authoritative knowledge retrieval system. Call \
                    this tool whenever the user asks for specific details, eligibility criteria, \
                    documentation requirements, or procedural steps of any kind. Use this to \
                    ensure accuracy before providing factual information.",
                "parameters": {"type": "object", "properties": {}, "required": []}
            },
            "messages": [
                {"type": "request-start", "blocking": true},
                {
                    "type": "request-response-delayed",
                    "content": "Please hold on, getting back to you with the right information.",
                    "timingMilliseconds": 1000
                }
            ],
            "knowledgeBases": [{
                "name": "government_knowledge_base",
                "provider": "google",
                "model": "gemini-2.0-flash",
                "description": "Used whenever the information to retrieve relates to government \
                    schemes or services.",
                "fileIds": file_ids
            }]
        });

        let res = self
            .http()
            .patch(format!("{}/tool/{}", self.base_url, self.query_tool_id))
            .header("Authorization", self.auth_header())
            .timeout(Duration::from_secs(30))
            .json(&payload)
            .send()
            .await?;

        if !res.status().is_success() {
            let body = res.text().await.unwrap_or_default();
            error!("Query tool sync failed: {}", body);
            return Err(anyhow!("Query tool sync failed: {}", body));
        }
        Ok(())
    }

    pub fn build_dataset_search_tool_payload(
        &self,
        name: &str,
        summary: &str,
        columns: &[String],
        permission: &str,
    ) -> Value {
        let description = format!(
            "Use this tool for {} operations. Knowledge Base Summary: {}. \
             Available columns/fields: {}.",
            permission,
            summary,
            columns.join(", ")
        );
        json!({
            "type": "function",
            "function": {
                "name": sanitize_function_name(name),
                "description": description,
                "parameters": {
                    "type": "object",
                    "properties": {
                        "search_query": {
                            "type": "string",
                            "description": "The specific value or ID to look for"
                        },
                        "target_column": {
                            "type": "string",
                            "description": "The column name to search within"
                        }
                    },
                    "required": ["search_query"]
                }
            },
            "server": {
                "url": self.db_query_url(),
                "secret": self.server_secret
            }
        })
    }

    /// Data-entry tool: one string property per sheet column. The first two
    /// columns are required; name and issue usually come first.
    pub fn build_sheet_write_tool_payload(
        &self,
        function_name: &str,
        description: &str,
        columns: &[String],
    ) -> Value {
        let mut properties = serde_json::Map::new();
        for col in columns {
            properties.insert(
                col.clone(),
                json!({"type": "string", "description": format!("Caller's {}", col)}),
            );
        }
        let required: Vec<&String> = columns.iter().take(2).collect();

        json!({
            "type": "function",
            "function": {
                "name": sanitize_function_name(function_name),
                "description": description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required
                }
            },
            "server": {
                "url": self.sheet_write_url(),
                "secret": self.server_secret
            }
        })
    }

    pub fn build_transfer_call_tool_payload(&self, phone_number: &str, expert_field: &str) -> Value {
        json!({
            "type": "transferCall",
            "function": {
                "name": "transfer_call_tool",
                "parameters": null,
                "description": format!(
                    "this tool transfers the call to a human {field} expert when the caller asks \
                     for exact details of {field} or the case is sensitive or personal",
                    field = expert_field
                )
            },
            "messages": [{"type": "request-start", "blocking": false}],
            "destinations": [{
                "type": "number",
                "number": phone_number,
                "message": "Okay, this is a crucial and sensitive topic. I will transfer the call \
                    to our corresponding expert who will further help you with this.",
                "description": format!(
                    "when the caller asks for more details about {field} or uses specific terms \
                     related to {field}, invoke this tool",
                    field = expert_field
                ),
                "transferPlan": {"mode": "blind-transfer", "sipVerb": "refer"},
                "numberE164CheckEnabled": true
            }]
        })
    }

    /// POST /tool with a prebuilt payload. Returns the created tool object.
    pub async fn create_tool(&self, payload: &Value) -> Result<Value> {
        let res = self
            .http()
            .post(format!("{}/tool", self.base_url))
            .header("Authorization", self.auth_header())
            .timeout(Duration::from_secs(30))
            .json(payload)
            .send()
            .await?;

        if !res.status().is_success() {
            let body = res.text().await.unwrap_or_default();
            error!("Vapi tool creation failed: {}", body);
            return Err(anyhow!("Vapi tool creation failed: {}", body));
        }
        Ok(res.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> VapiClient {
        VapiClient {
            api_key: "key".into(),
            base_url: "https://api.vapi.ai".into(),
            phone_number_id: "pn-1".into(),
            server_url: "https://backend.example.com".into(),
            server_secret: "shh".into(),
            query_tool_id: "query-tool".into(),
            end_call_tool_id: "end-tool".into(),
        }
    }

    #[test]
    fn sanitizes_function_names() {
        assert_eq!(sanitize_function_name("Delhi Jal Board!"), "DelhiJalBoard");
        assert_eq!(sanitize_function_name("__search_db"), "search_db");
        assert_eq!(sanitize_function_name("!!!"), "function_1");
        assert_eq!(sanitize_function_name(""), "function_1");

        let long = "a".repeat(80);
        assert_eq!(sanitize_function_name(&long).len(), 64);
    }

    #[test]
    fn outbound_payload_dedups_tool_ids() {
        let client = test_client();
        let base = vec!["query-tool".to_string(), "end-tool".to_string()];
        let dynamic = vec!["db-tool".to_string(), "query-tool".to_string()];

        let payload =
            client.build_outbound_call_payload("+911234567890", "LokMitra", "desc", &base, &dynamic);

        let ids: Vec<&str> = payload["assistant"]["model"]["toolIds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["query-tool", "end-tool", "db-tool"]);
        assert_eq!(payload["customer"]["number"], "+911234567890");
        assert_eq!(
            payload["assistant"]["serverMessages"][0],
            "end-of-call-report"
        );
        assert_eq!(
            payload["assistant"]["server"]["url"],
            "https://backend.example.com/api/vapi/webhook"
        );
    }

    #[test]
    fn inbound_payload_includes_knowledge_base_only_with_files() {
        let client = test_client();
        let base = vec!["query-tool".to_string()];

        let without = client.build_inbound_assistant_payload("LokMitra", "d", &base, &[], &[]);
        assert!(without.get("knowledgeBases").is_none());

        let with = client.build_inbound_assistant_payload(
            "LokMitra",
            "d",
            &base,
            &[],
            &["file-1".to_string()],
        );
        assert_eq!(with["knowledgeBases"][0]["fileIds"][0], "file-1");
        assert_eq!(with["name"], "LokMitra-Inbound");
    }

    #[test]
    fn sheet_write_tool_requires_first_two_columns() {
        let client = test_client();
        let columns = vec![
            "name".to_string(),
            "issue".to_string(),
            "ward".to_string(),
        ];
        let payload = client.build_sheet_write_tool_payload(
            "log_complaints",
            "APPEND TOOL: records caller complaints",
            &columns,
        );

        let required: Vec<&str> = payload["function"]["parameters"]["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["name", "issue"]);
        assert!(payload["function"]["parameters"]["properties"]["ward"].is_object());
        assert_eq!(
            payload["server"]["url"],
            "https://backend.example.com/api/vapi/sheet-write"
        );
    }

    #[test]
    fn transfer_tool_is_a_blind_transfer() {
        let client = test_client();
        let payload = client.build_transfer_call_tool_payload("+919999999999", "water supply");
        assert_eq!(payload["type"], "transferCall");
        assert_eq!(
            payload["destinations"][0]["transferPlan"]["mode"],
            "blind-transfer"
        );
        assert_eq!(payload["destinations"][0]["number"], "+919999999999");
    }
}
