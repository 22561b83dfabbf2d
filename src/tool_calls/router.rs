use serde_json::{json, Value};
use crate::api::vapi_client::sanitize_function_name;
use crate::repositories::datasets::Dataset;

/// Maps an opaque vapi tool invocation back to one of the registered
/// datasets, then answers from the stored row snapshot. Calls arrive while a
/// caller is waiting on the line, so everything here is a plain in-memory
/// scan with no extra lookups.

pub const FUZZY_CUTOFF: f64 = 0.6;
pub const MAX_RESULTS: usize = 3;

/// "search_delhi_jal_board" -> "delhi_jal_board". The assistant-facing tool
/// names carry an operation prefix the stored dataset names do not.
pub fn strip_tool_prefixes(function_name: &str) -> String {
    function_name
        .replace("search_", "")
        .replace("read_", "")
        .replace("write_", "")
        .replace("log_", "")
}

/// Resolution cascade:
/// 1. the vapi tool id is in a dataset's registered tool-id list;
/// 2. the prefix-stripped function name equals a dataset name (case-insensitive);
/// 3. a dataset name contains the prefix-stripped function name;
/// 4. a dataset name contains / is contained by the function name once both
///    are sanitized the same way the tool names were at registration.
/// `source_filter` narrows stage 4 (the sheet-write path only ever targets
/// googlesheets datasets).
pub fn resolve_dataset<'a>(
    datasets: &'a [Dataset],
    tool_id: Option<&str>,
    function_name: &str,
    source_filter: Option<&str>,
) -> Option<&'a Dataset> {
    if let Some(wanted) = tool_id {
        if let Some(hit) = datasets
            .iter()
            .find(|d| d.tool_ids.iter().any(|id| id == wanted))
        {
            return Some(hit);
        }
    }

    let cleaned = strip_tool_prefixes(function_name);
    if let Some(hit) = datasets
        .iter()
        .find(|d| d.name.eq_ignore_ascii_case(&cleaned))
    {
        return Some(hit);
    }
    let cleaned_lower = cleaned.to_lowercase();
    if let Some(hit) = datasets
        .iter()
        .find(|d| d.name.to_lowercase().contains(&cleaned_lower))
    {
        return Some(hit);
    }

    let function_sanitized = sanitize_function_name(&cleaned_lower);
    datasets
        .iter()
        .filter(|d| source_filter.map_or(true, |s| d.source_type == s))
        .find(|d| {
            let candidate = sanitize_function_name(&d.name.to_lowercase().replace(' ', "_"));
            candidate == function_sanitized
                || candidate.contains(&function_sanitized)
                || function_sanitized.contains(&candidate)
        })
}

fn row_text(row: &Value) -> String {
    match row.as_object() {
        Some(map) => map
            .values()
            .map(cell_text)
            .collect::<Vec<_>>()
            .join(" "),
        None => row.to_string(),
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Search the snapshot: exact cell match first, then fuzzy ranking. Substring
/// hits score 1.0 (rapidfuzz partial_ratio equivalence); otherwise
/// jaro_winkler over the joined row text, cutoff 0.6, top 3.
pub fn search_rows(rows: &[Value], search_query: &str) -> Value {
    let query = search_query.trim().to_lowercase();

    for row in rows {
        let exact = row.as_object().map_or(false, |map| {
            map.values().any(|cell| cell_text(cell).to_lowercase() == query)
        });
        if exact {
            return json!({"results": [row], "match_type": "exact"});
        }
    }

    let mut scored: Vec<(f64, &Value)> = rows
        .iter()
        .filter_map(|row| {
            let text = row_text(row).to_lowercase();
            let score = if !query.is_empty() && text.contains(&query) {
                1.0
            } else {
                strsim::jaro_winkler(&query, &text)
            };
            (score >= FUZZY_CUTOFF).then_some((score, row))
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let results: Vec<&Value> = scored
        .into_iter()
        .take(MAX_RESULTS)
        .map(|(_, row)| row)
        .collect();
    let status = if results.is_empty() { "not_found" } else { "success" };
    json!({"results": results, "status": status})
}

/// The one response shape vapi accepts from a tool server. Always paired with
/// HTTP 200; the assistant speaks whatever lands in `result`.
pub fn tool_result_response(tool_call_id: &str, result: Value) -> Value {
    json!({
        "results": [{
            "toolCallId": tool_call_id,
            "result": result
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset(name: &str, source_type: &str, tool_ids: Vec<&str>, rows: Vec<Value>) -> Dataset {
        Dataset {
            id: 1,
            name: name.to_string(),
            source_type: source_type.to_string(),
            summary: String::new(),
            columns: Vec::new(),
            tool_ids: tool_ids.into_iter().map(String::from).collect(),
            rows,
            connection: json!({}),
            created_at: 0,
        }
    }

    #[test]
    fn strips_operation_prefixes() {
        assert_eq!(strip_tool_prefixes("search_delhi_jal_board"), "delhi_jal_board");
        assert_eq!(strip_tool_prefixes("log_complaints"), "complaints");
        assert_eq!(strip_tool_prefixes("read_schemes"), "schemes");
        assert_eq!(strip_tool_prefixes("plain_name"), "plain_name");
    }

    #[test]
    fn resolves_by_tool_id_first() {
        let datasets = vec![
            dataset("alpha", "csv", vec!["tool-a"], vec![]),
            dataset("beta", "csv", vec!["tool-b"], vec![]),
        ];
        let hit = resolve_dataset(&datasets, Some("tool-b"), "search_alpha", None).unwrap();
        // The tool id outranks the name match.
        assert_eq!(hit.name, "beta");
    }

    #[test]
    fn resolves_by_cleaned_name() {
        let datasets = vec![dataset("Delhi_Jal_Board", "csv", vec!["tool-x"], vec![])];
        let hit =
            resolve_dataset(&datasets, Some("unknown"), "search_delhi_jal_board", None).unwrap();
        assert_eq!(hit.name, "Delhi_Jal_Board");
    }

    #[test]
    fn resolves_by_sanitized_containment() {
        let datasets = vec![dataset("Ward Complaints", "googlesheets", vec![], vec![])];
        let hit = resolve_dataset(
            &datasets,
            None,
            "log_ward_complaints_sheet",
            Some("googlesheets"),
        )
        .unwrap();
        assert_eq!(hit.name, "Ward Complaints");
    }

    #[test]
    fn source_filter_only_applies_to_fuzzy_stage() {
        let datasets = vec![dataset("pensions", "csv", vec![], vec![])];
        // Exact name hit still resolves even though the filter says sheets.
        let hit = resolve_dataset(&datasets, None, "search_pensions", Some("googlesheets"));
        assert!(hit.is_some());
        // Fuzzy-only candidates outside the filter do not.
        let miss = resolve_dataset(&datasets, None, "log_pensions_v2", Some("googlesheets"));
        assert!(miss.is_none());
    }

    #[test]
    fn unresolvable_invocation_returns_none() {
        let datasets = vec![dataset("alpha", "csv", vec!["tool-a"], vec![])];
        assert!(resolve_dataset(&datasets, Some("nope"), "search_something_else", None).is_none());
    }

    fn sample_rows() -> Vec<Value> {
        vec![
            json!({"ward": "12", "officer": "Sharma", "scheme": "Jal Jeevan Mission"}),
            json!({"ward": "14", "officer": "Verma", "scheme": "Swachh Bharat"}),
            json!({"ward": "15", "officer": "Gupta", "scheme": "PM Awas Yojana"}),
            json!({"ward": "16", "officer": "Iyer", "scheme": "Ayushman Bharat"}),
        ]
    }

    #[test]
    fn exact_cell_match_wins() {
        let result = search_rows(&sample_rows(), "Verma");
        assert_eq!(result["match_type"], "exact");
        assert_eq!(result["results"].as_array().unwrap().len(), 1);
        assert_eq!(result["results"][0]["ward"], "14");
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let result = search_rows(&sample_rows(), "sharma");
        assert_eq!(result["match_type"], "exact");
        assert_eq!(result["results"][0]["officer"], "Sharma");
    }

    #[test]
    fn substring_hits_rank_ahead_and_cap_at_three() {
        let result = search_rows(&sample_rows(), "Bharat");
        assert_eq!(result["status"], "success");
        let results = result["results"].as_array().unwrap();
        assert!(results.len() <= MAX_RESULTS);
        // Both Bharat schemes must be in front of any pure-similarity hit.
        assert!(results[0]["scheme"].as_str().unwrap().contains("Bharat"));
        assert!(results[1]["scheme"].as_str().unwrap().contains("Bharat"));
    }

    #[test]
    fn low_similarity_reports_not_found() {
        let result = search_rows(&sample_rows(), "zzzzqqqq");
        assert_eq!(result["status"], "not_found");
        assert!(result["results"].as_array().unwrap().is_empty());
    }

    #[test]
    fn empty_snapshot_reports_not_found() {
        let result = search_rows(&[], "anything");
        assert_eq!(result["status"], "not_found");
    }

    #[test]
    fn tool_result_shape_matches_vapi_contract() {
        let response = tool_result_response("call_1", json!({"ok": true}));
        assert_eq!(response["results"][0]["toolCallId"], "call_1");
        assert_eq!(response["results"][0]["result"]["ok"], true);
    }
}
