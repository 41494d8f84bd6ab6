use axum::{body::Bytes, extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    app::App,
    schedule::{next_trigger, validate_and_describe},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct ParseCronResponse {
    pub valid: bool,
    pub description: String,
    pub next_run_time: Option<DateTime<Utc>>,
}

/// Validates an expression for the editor. An invalid expression is a normal
/// answer with `valid = false`, never an error status. So is a body that is
/// not JSON or whose `cron_expression` is not a string.
pub async fn parse(State(app): State<App>, body: Bytes) -> Json<ParseCronResponse> {
    let expression = match cron_expression(&body) {
        Ok(expression) => expression,
        Err(description) => {
            return Json(ParseCronResponse {
                valid: false,
                description,
                next_run_time: None,
            })
        }
    };

    let description = validate_and_describe(&expression);
    let next_run_time = if description.valid {
        next_trigger(&expression, app.clock.now())
    } else {
        None
    };

    Json(ParseCronResponse {
        valid: description.valid,
        description: description.description,
        next_run_time,
    })
}

/// A missing or null `cron_expression` reads as an empty one.
fn cron_expression(body: &[u8]) -> Result<String, String> {
    let request: Value = serde_json::from_slice(body)
        .map_err(|e| format!("Request body is not valid JSON: {e}"))?;

    match request.get("cron_expression") {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(expression)) => Ok(expression.clone()),
        Some(other) => Err(format!(
            "cron_expression must be a string, got {}",
            json_type(other)
        )),
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::tests::setup_test::setup_test;

    #[tokio::test]
    async fn test_parse_valid_expression() {
        let test = setup_test().await;

        let response = test
            .server
            .post("/api/cron/parse")
            .json(&json!({ "cron_expression": "0 9 * * 1-5" }))
            .await;

        response.assert_status_ok();
        let parsed: ParseCronResponse = response.json();
        assert!(parsed.valid);
        assert_eq!(parsed.description, "At 09:00 on Monday through Friday");
        assert_eq!(
            parsed.next_run_time,
            Some(Utc.with_ymd_and_hms(2025, 6, 11, 9, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_parse_invalid_expression_is_not_an_error() {
        let test = setup_test().await;

        for expression in ["", "not a cron", "0 9 1 * MON"] {
            let response = test
                .server
                .post("/api/cron/parse")
                .json(&json!({ "cron_expression": expression }))
                .await;

            response.assert_status_ok();
            let parsed: ParseCronResponse = response.json();
            assert!(!parsed.valid, "'{expression}' should be invalid");
            assert!(!parsed.description.is_empty());
            assert_eq!(parsed.next_run_time, None);
        }
    }

    #[tokio::test]
    async fn test_unreadable_bodies_are_answered_as_invalid() {
        let test = setup_test().await;

        for (body, expected) in [
            ("{not json", "Request body is not valid JSON"),
            (
                r#"{"cron_expression":5}"#,
                "cron_expression must be a string, got a number",
            ),
            (
                r#"{"cron_expression":["0 9 * * *"]}"#,
                "cron_expression must be a string, got an array",
            ),
            ("[1, 2]", ""),
        ] {
            let response = test
                .server
                .post("/api/cron/parse")
                .text(body)
                .content_type("application/json")
                .await;

            response.assert_status_ok();
            let parsed: ParseCronResponse = response.json();
            assert!(!parsed.valid, "{body} should be answered as invalid");
            assert!(
                parsed.description.starts_with(expected),
                "{}",
                parsed.description
            );
            assert!(!parsed.description.is_empty());
            assert_eq!(parsed.next_run_time, None);
        }
    }

    #[tokio::test]
    async fn test_null_or_missing_expression_reads_as_empty() {
        let test = setup_test().await;
        let empty = validate_and_describe("").description;

        for body in [json!({ "cron_expression": null }), json!({})] {
            let response = test.server.post("/api/cron/parse").json(&body).await;

            response.assert_status_ok();
            let parsed: ParseCronResponse = response.json();
            assert!(!parsed.valid);
            assert_eq!(parsed.description, empty);
        }
    }
}
