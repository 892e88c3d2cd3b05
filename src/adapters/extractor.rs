use crate::domain::model::{parse_date, Document, ExtractedExpense, ExtractionFailure, Participants};
use crate::domain::ports::DocumentExtractor;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

/// 將單據原始位元組 POST 到推論服務，回應須為單一 JSON 物件
pub struct HttpDocumentExtractor {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    headers: HashMap<String, String>,
    timeout: Option<Duration>,
}

impl HttpDocumentExtractor {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: None,
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DocumentExtractor for HttpDocumentExtractor {
    async fn extract(&self, document: &Document) -> Result<ExtractedExpense, ExtractionFailure> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .query(&[("filename", document.name.as_str())])
            .header(CONTENT_TYPE, content_type_for(&document.name))
            .body(document.bytes.clone());

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if let Some(api_key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {}", api_key));
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!("Sending {} to extractor {}", document.name, self.endpoint);

        let response = request.send().await.map_err(|e| {
            ExtractionFailure::new(&document.name, format!("Request failed: {}", e)).retryable()
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ExtractionFailure::new(&document.name, format!("Failed to read response: {}", e))
                .retryable()
        })?;

        tracing::debug!("Extractor response status for {}: {}", document.name, status);

        if !status.is_success() {
            let failure = ExtractionFailure::new(
                &document.name,
                format!("Extractor returned {}", status),
            )
            .with_raw_response(body);
            return Err(
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    failure.retryable()
                } else {
                    failure
                },
            );
        }

        parse_extraction_response(&body, &document.name)
    }
}

fn content_type_for(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// 解析推論服務回應；任何不符合格式的回應都轉成 ExtractionFailure
pub fn parse_extraction_response(
    body: &str,
    file: &str,
) -> Result<ExtractedExpense, ExtractionFailure> {
    let invalid = |reason: &str| ExtractionFailure::new(file, reason).with_raw_response(body);

    let value: Value = serde_json::from_str(strip_code_fence(body))
        .map_err(|_| invalid("Invalid JSON response"))?;
    let Value::Object(fields) = value else {
        return Err(invalid("Response is not a JSON object"));
    };

    if let Some(error) = fields.get("error").filter(|e| !e.is_null()) {
        let reason = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(invalid(&format!("Extractor reported error: {}", reason)));
    }

    let amount = match fields.get("amount") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
    .filter(|a| a.is_finite())
    .ok_or_else(|| invalid("Missing or non-numeric amount"))?;

    let participant = match fields.get("participant") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            serde_json::from_value::<Participants>(value.clone())
                .map_err(|_| invalid("Participant must be a string or a list of strings"))?,
        ),
    };

    let date = text_field(&fields, "date").and_then(|raw| {
        let parsed = parse_date(&raw);
        if parsed.is_none() {
            tracing::debug!("Unrecognized date '{}' in {}", raw, file);
        }
        parsed
    });

    Ok(ExtractedExpense {
        amount,
        date,
        vendor_name: text_field(&fields, "vendor_name"),
        currency: text_field(&fields, "currency").map(|c| c.to_uppercase()),
        event_id: text_field(&fields, "event_id"),
        participant,
        source_file: file.to_string(),
    })
}

/// 字串或數字欄位，空白視為 null
fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn strip_code_fence(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };
    // 去掉語言標記，例如 ```json
    match inner.split_once('\n') {
        Some((tag, rest)) if !tag.trim_start().starts_with('{') => rest.trim(),
        _ => inner.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn document(name: &str) -> Document {
        Document {
            name: name.to_string(),
            bytes: vec![0x89, 0x50, 0x4E, 0x47],
        }
    }

    #[test]
    fn test_parse_full_response() {
        let body = r#"{
            "amount": 125.50,
            "date": "2023-10-26",
            "vendor_name": "The Grand Hotel",
            "currency": "usd",
            "event_id": "EVT-12345",
            "participant": "John Doe"
        }"#;

        let expense = parse_extraction_response(body, "hotel.jpg").unwrap();

        assert_eq!(expense.amount, 125.5);
        assert_eq!(expense.date, chrono::NaiveDate::from_ymd_opt(2023, 10, 26));
        assert_eq!(expense.vendor_name.as_deref(), Some("The Grand Hotel"));
        assert_eq!(expense.currency.as_deref(), Some("USD"));
        assert_eq!(expense.event_id.as_deref(), Some("EVT-12345"));
        assert_eq!(
            expense.participant,
            Some(Participants::Delimited("John Doe".to_string()))
        );
        assert_eq!(expense.source_file, "hotel.jpg");
    }

    #[test]
    fn test_parse_nulls_fenced_and_string_amount() {
        let body = "```json\n{\"amount\": \"1,020.00\", \"date\": null, \"vendor_name\": \"\", \"currency\": null, \"event_id\": 42, \"participant\": [\"Al\", \"Bo\"]}\n```";

        let expense = parse_extraction_response(body, "r.png").unwrap();

        assert_eq!(expense.amount, 1020.0);
        assert_eq!(expense.date, None);
        assert_eq!(expense.vendor_name, None);
        assert_eq!(expense.event_id.as_deref(), Some("42"));
        assert_eq!(
            expense.participant,
            Some(Participants::List(vec!["Al".to_string(), "Bo".to_string()]))
        );
    }

    #[test]
    fn test_non_conforming_responses_become_failures() {
        let cases = [
            "I could not read this receipt",
            "[1, 2, 3]",
            r#"{"vendor_name": "Acme"}"#,
            r#"{"amount": null}"#,
            r#"{"amount": 10, "participant": 5}"#,
            r#"{"error": "blurry image"}"#,
        ];

        for body in cases {
            let failure = parse_extraction_response(body, "bad.png").unwrap_err();
            assert_eq!(failure.kind(), "extraction_failed");
            assert_eq!(failure.file, "bad.png");
            assert_eq!(failure.raw_response.as_deref(), Some(body));
            assert!(!failure.retryable, "{body} should not be retryable");
        }
    }

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type_for("a.PNG"), "image/png");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("a.webp"), "image/webp");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_extract_posts_bytes_and_parses_response() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/extract")
                .query_param("filename", "receipt.png")
                .header("content-type", "image/png")
                .header("authorization", "Bearer secret");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "amount": 90,
                    "date": "2024-01-01",
                    "vendor_name": "Acme",
                    "currency": "USD",
                    "event_id": null,
                    "participant": "Al, Bo"
                }));
        });

        let extractor = HttpDocumentExtractor::new(server.url("/extract"))
            .with_api_key(Some("secret".to_string()))
            .with_timeout(Some(Duration::from_secs(5)));

        let expense = extractor.extract(&document("receipt.png")).await.unwrap();

        api_mock.assert();
        assert_eq!(expense.amount, 90.0);
        assert_eq!(expense.event_id, None);
        assert_eq!(expense.source_file, "receipt.png");
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST).path("/extract");
            then.status(503).body("overloaded");
        });

        let extractor = HttpDocumentExtractor::new(server.url("/extract"));
        let failure = extractor.extract(&document("r.png")).await.unwrap_err();

        api_mock.assert();
        assert!(failure.retryable);
        assert_eq!(failure.raw_response.as_deref(), Some("overloaded"));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retryable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/extract");
            then.status(400).body("unsupported image");
        });

        let extractor = HttpDocumentExtractor::new(server.url("/extract"))
            .with_api_key(Some("  ".to_string()));
        let failure = extractor.extract(&document("r.gif")).await.unwrap_err();

        assert!(!failure.retryable);
        assert!(failure.reason.contains("400"));
    }
}
