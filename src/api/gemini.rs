use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

/// What we ask gemini for when a dataset is connected: a function-tool name
/// and a spoken-prose summary the assistant reads to decide when to use it.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetAnalysis {
    pub tool_name: String,
    pub summary: String,
}

/// Deterministic analysis used whenever the LLM call fails. Connecting a
/// dataset must never depend on gemini being reachable.
pub fn fallback_analysis(file_name: &str, columns: &[String]) -> DatasetAnalysis {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    let tool_name: String = stem.chars().filter(|c| c.is_alphanumeric()).collect();
    let tool_name = if tool_name.is_empty() {
        "dataset".to_string()
    } else {
        tool_name
    };
    DatasetAnalysis {
        tool_name,
        summary: format!("Database containing: {}", columns.join(", ")),
    }
}

/// Strip ```json fenced blocks and surrounding noise from LLM output.
pub fn extract_json(text: &str) -> String {
    let mut text = text.trim();
    if let Some(after_fence) = text.strip_prefix("```") {
        let mut inner = after_fence.trim_start();
        if let Some(rest) = inner.strip_prefix("json") {
            inner = rest;
        }
        text = match inner.split_once("```") {
            Some((body, _)) => body,
            None => inner,
        };
    }
    text.trim().to_string()
}

const GEMINI_MODEL: &str = "gemini-2.5-flash";
const MAX_ATTEMPTS: u32 = 3;

/// generateContent with a fixed JSON response schema, retrying quota errors
/// with exponential backoff (2^attempt seconds).
pub async fn analyze_dataset(prompt: &str) -> Result<DatasetAnalysis> {
    let api_key = std::env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY must be set");
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
        GEMINI_MODEL, api_key
    );
    let payload = json!({
        "contents": [{"parts": [{"text": prompt}]}],
        "generationConfig": {
            "temperature": 0.3,
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "tool_name": {"type": "STRING"},
                    "summary": {"type": "STRING"}
                },
                "required": ["tool_name", "summary"]
            }
        }
    });

    let client = reqwest::Client::new();
    for attempt in 0..MAX_ATTEMPTS {
        info!("Gemini call attempt {}/{}", attempt + 1, MAX_ATTEMPTS);

        let res = client
            .post(&url)
            .timeout(Duration::from_secs(30))
            .json(&payload)
            .send()
            .await?;

        if res.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let wait = 2u64.pow(attempt);
            warn!("Gemini quota hit, retrying in {}s", wait);
            tokio::time::sleep(Duration::from_secs(wait)).await;
            continue;
        }
        if !res.status().is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini error: {}", body));
        }

        let body: Value = res.json().await?;
        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow!("Empty Gemini response"))?;
        let analysis: DatasetAnalysis = serde_json::from_str(&extract_json(text))?;
        return Ok(analysis);
    }
    Err(anyhow!("Gemini quota exhausted after {} attempts", MAX_ATTEMPTS))
}

/// Analyze with automatic fallback; logs instead of propagating LLM failures.
pub async fn analyze_dataset_or_fallback(
    prompt: &str,
    file_name: &str,
    columns: &[String],
) -> DatasetAnalysis {
    match analyze_dataset(prompt).await {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!("Gemini structured output failed, using fallback: {}", e);
            fallback_analysis(file_name, columns)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_json() {
        assert_eq!(extract_json("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn extracts_fenced_json() {
        let fenced = "```json\n{\"tool_name\": \"x\", \"summary\": \"y\"}\n```";
        assert_eq!(
            extract_json(fenced),
            "{\"tool_name\": \"x\", \"summary\": \"y\"}"
        );
    }

    #[test]
    fn extracts_fence_without_language_tag() {
        assert_eq!(extract_json("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn extracts_unterminated_fence() {
        assert_eq!(extract_json("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn fallback_uses_alphanumeric_file_stem() {
        let columns = vec!["ward".to_string(), "officer".to_string()];
        let analysis = fallback_analysis("jal board-2024.csv", &columns);
        assert_eq!(analysis.tool_name, "jalboard2024");
        assert_eq!(analysis.summary, "Database containing: ward, officer");
    }

    #[test]
    fn fallback_never_yields_empty_name() {
        let analysis = fallback_analysis("!!!.csv", &[]);
        assert_eq!(analysis.tool_name, "dataset");
    }
}
