use crate::util::is_local_endpoint_url;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("token budget exceeded: {0}")]
    BudgetExceeded(String),
    #[error("cannot reach model endpoint '{url}': {message}")]
    Unreachable { url: String, message: String },
    #[error("model endpoint '{url}' returned HTTP {status}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },
    #[error("model request to '{url}' failed: {message}")]
    Request { url: String, message: String },
    #[error("malformed model response: {0}")]
    Protocol(String),
}

impl ModelError {
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, ModelError::BudgetExceeded(_))
    }
}

pub(crate) fn map_api_request_error(error: reqwest::Error, request_url: &str) -> ModelError {
    let url = request_url.to_string();
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return ModelError::Unreachable {
            url,
            message: format!(
                "{error}. Start your llama.cpp server or update CHATSH_API_URL."
            ),
        };
    }
    if error.is_connect() {
        return ModelError::Unreachable {
            url,
            message: error.to_string(),
        };
    }
    if error.is_timeout() {
        return ModelError::Request {
            url,
            message: format!("timed out: {error}"),
        };
    }
    if let Some(status) = error.status() {
        return ModelError::Http {
            url,
            status: status.as_u16(),
            message: error.to_string(),
        };
    }
    ModelError::Request {
        url,
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_budget_variant_reports_budget_exceeded() {
        assert!(ModelError::BudgetExceeded("prompt too long".into()).is_budget_exceeded());
        assert!(!ModelError::Protocol("bad json".into()).is_budget_exceeded());
        assert!(!ModelError::Http {
            url: "http://localhost:8080/v1/chat/completions".into(),
            status: 500,
            message: "boom".into(),
        }
        .is_budget_exceeded());
    }

    #[test]
    fn test_error_messages_name_the_endpoint() {
        let err = ModelError::Unreachable {
            url: "http://localhost:8080/tokenize".into(),
            message: "connection refused".into(),
        };
        assert!(err.to_string().contains("http://localhost:8080/tokenize"));
    }
}
