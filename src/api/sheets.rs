use anyhow::{anyhow, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;
use crate::utils::ingest;

/// Pull the spreadsheet id out of a share URL
/// (`https://docs.google.com/spreadsheets/d/<id>/edit...`).
pub fn extract_spreadsheet_id(sheet_url: &str) -> Option<String> {
    Regex::new(r"/d/([a-zA-Z0-9-_]+)")
        .expect("static regex")
        .captures(sheet_url)
        .map(|caps| caps[1].to_string())
}

/// Read a public or anyone-with-link sheet through the CSV export endpoint.
/// Returns the header list and the row snapshot.
pub async fn fetch_sheet_rows(spreadsheet_id: &str) -> Result<(Vec<String>, Vec<Value>)> {
    let url = format!(
        "https://docs.google.com/spreadsheets/d/{}/export?format=csv",
        spreadsheet_id
    );
    let res = reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_secs(30))
        .send()
        .await?;

    if !res.status().is_success() {
        return Err(anyhow!(
            "Sheet export failed with status {}; is the sheet shared?",
            res.status()
        ));
    }
    let bytes = res.bytes().await?;
    ingest::parse_csv(&bytes)
}

#[derive(Deserialize)]
struct ServiceAccount {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Serialize)]
struct TokenClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Mint a short-lived access token from the service-account key file
/// (`GOOGLE_SERVICE_ACCOUNT_FILE`): RS256 JWT, exchanged at the token
/// endpoint with the jwt-bearer grant.
async fn service_account_token() -> Result<String> {
    let path = std::env::var("GOOGLE_SERVICE_ACCOUNT_FILE")
        .map_err(|_| anyhow!("GOOGLE_SERVICE_ACCOUNT_FILE is not configured"))?;
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| anyhow!("Cannot read service account file {}: {}", path, e))?;
    let account: ServiceAccount = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("Invalid service account file: {}", e))?;

    let now = chrono::Utc::now().timestamp();
    let claims = TokenClaims {
        iss: account.client_email.clone(),
        scope: "https://www.googleapis.com/auth/spreadsheets".to_string(),
        aud: account.token_uri.clone(),
        iat: now,
        exp: now + 3600,
    };
    let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
        .map_err(|e| anyhow!("Invalid service account private key: {}", e))?;
    let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key)?;

    let res = reqwest::Client::new()
        .post(&account.token_uri)
        .timeout(Duration::from_secs(30))
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ])
        .send()
        .await?;

    if !res.status().is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(anyhow!("Google token exchange failed: {}", body));
    }
    let token: Value = res.json().await?;
    token["access_token"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Token response missing access_token"))
}

/// Append one row to the first sheet via the Sheets v4 values:append API.
pub async fn append_row(spreadsheet_id: &str, values: &[String]) -> Result<()> {
    let token = service_account_token().await?;
    let url = format!(
        "https://sheets.googleapis.com/v4/spreadsheets/{}/values/A1:append?valueInputOption=USER_ENTERED",
        spreadsheet_id
    );

    let res = reqwest::Client::new()
        .post(&url)
        .bearer_auth(token)
        .timeout(Duration::from_secs(30))
        .json(&json!({"values": [values]}))
        .send()
        .await?;

    if !res.status().is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(anyhow!("Sheet append failed: {}", body));
    }
    info!("Appended row to spreadsheet {}", spreadsheet_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_spreadsheet_id_from_share_url() {
        let url = "https://docs.google.com/spreadsheets/d/1AbC-dEf_123/edit#gid=0";
        assert_eq!(extract_spreadsheet_id(url).as_deref(), Some("1AbC-dEf_123"));
    }

    #[test]
    fn rejects_urls_without_an_id() {
        assert!(extract_spreadsheet_id("https://docs.google.com/spreadsheets/").is_none());
        assert!(extract_spreadsheet_id("not a url").is_none());
    }
}
