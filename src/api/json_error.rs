use axum::{
    extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse,
    response::Response, Json,
};
use validator::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] JsonRejection),
    #[error("{}", describe_validation_errors(.0))]
    ValidationError(ValidationErrors),
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::InvalidJson(rejection) => rejection.body_text(),
            Self::ValidationError(_) => self.to_string(),
        };

        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "message": message })),
        )
            .into_response()
    }
}

/// One sentence per failing field, in field order.
fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|(a, _), (b, _)| a.cmp(b));

    fields
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| {
                error
                    .message
                    .as_ref()
                    .map_or_else(|| format!("{field} is invalid"), ToString::to_string)
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;

    #[derive(Validate)]
    struct Payload {
        #[validate(length(min = 1, message = "name must not be empty"))]
        name: String,
        #[validate(range(min = 1))]
        limit: u64,
    }

    #[test]
    fn test_validation_errors_are_joined_in_field_order() {
        let errors = Payload {
            name: String::new(),
            limit: 0,
        }
        .validate()
        .unwrap_err();

        assert_eq!(
            JsonError::ValidationError(errors).to_string(),
            "limit is invalid; name must not be empty"
        );
    }
}
