use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Cannot reach equipment service: {message}")]
    Connection { message: String },

    #[error("Not authorized: {message}")]
    Unauthorized { message: String },

    #[error("Request failed ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {message}")]
    Decode { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Builds the error for a non-success response from its status and body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = error_message(body);
        match status {
            401 | 403 => ClientError::Unauthorized { message },
            _ => ClientError::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ClientError::Connection {
                message: err.to_string(),
            }
        } else if err.is_decode() {
            ClientError::Decode {
                message: err.to_string(),
            }
        } else {
            ClientError::Api {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        }
    }
}

/// Pulls a readable message out of `{"error": ..}` or `{"errors": {field: [..]}}` bodies.
pub fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return message.to_string();
    }

    if let Some(fields) = value.get("errors").and_then(Value::as_object) {
        let parts: Vec<String> = fields
            .iter()
            .map(|(field, messages)| {
                let joined = messages
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                format!("{}: {}", field, joined)
            })
            .collect();
        return parts.join("; ");
    }

    value.to_string()
}
