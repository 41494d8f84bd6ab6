use axum::Json;

use crate::templates::{self, Template};

pub async fn list() -> Json<&'static [Template]> {
    Json(templates::all())
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use crate::tests::setup_test::setup_test;

    #[tokio::test]
    async fn test_lists_templates() {
        let test = setup_test().await;

        let response = test.server.get("/api/templates").await;

        response.assert_status_ok();
        let templates: Vec<Value> = response.json();
        assert_eq!(templates.len(), crate::templates::all().len());
        assert!(templates
            .iter()
            .all(|template| template["name"].is_string() && template["code"].is_string()));
    }
}
