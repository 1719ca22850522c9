use anyhow::Result;
use reqwest;
use serde::{Deserialize, Serialize};
use std::env;

macro_rules! debug_println {
    ($($arg:tt)*) => {
        if std::env::var("DEFECTDESK_DEBUG").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Failure classes surfaced by [`GeminiClient::generate`]. The display text
/// is what ends up in the output panel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("An API error occurred. Quota or connectivity problems? Detail: {0}")]
    Api(String),
    #[error("An unexpected error occurred. Detail: {0}")]
    Unexpected(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    system_instruction: Content,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Reads `GEMINI_API_KEY`. The UI degrades to disabled controls when this
    /// fails, so the error is reported once at startup rather than per call.
    pub fn from_env(base_url: String, model: String) -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY is not set"))?;
        Ok(Self::with_key(base_url, model, api_key))
    }

    pub fn with_key(base_url: String, model: String, api_key: String) -> Self {
        GeminiClient {
            base_url,
            model,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    #[allow(dead_code)]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// One round trip to `models/{model}:generateContent`.
    ///
    /// No cancellation or timeout: once dispatched, the call runs until the
    /// server answers or the connection fails.
    pub async fn generate(
        &self,
        user_prompt: &str,
        system_instruction: &str,
    ) -> Result<String, ApiError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: user_prompt.to_string(),
                }],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        debug_println!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::Api(e.to_string()))?;

        let status = response.status();
        debug_println!("Gemini responded with {}", status);

        if !status.is_success() {
            // Error bodies carry a structured message; fall back to the bare
            // status when the body is not what we expect.
            let detail = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("HTTP {}", status),
            };
            return Err(ApiError::Api(detail));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Unexpected(e.to_string()))?;

        extract_text(body)
    }
}

fn extract_text(body: GenerateResponse) -> Result<String, ApiError> {
    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Unexpected("response contained no candidates".to_string()))?;

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    if parts.is_empty() {
        return Err(ApiError::Unexpected(
            "candidate contained no text".to_string(),
        ));
    }

    Ok(parts.into_iter().map(|p| p.text).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: "What is crazing?".to_string(),
                }],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: "Act as an expert metallurgist.".to_string(),
                }],
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "What is crazing?" }] }
                ],
                "systemInstruction": {
                    "parts": [{ "text": "Act as an expert metallurgist." }]
                }
            })
        );
    }

    #[test]
    fn test_extract_text_concatenates_parts() {
        let body: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "role": "model", "parts": [{ "text": "a" }, { "text": "b" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(extract_text(body).unwrap(), "ab");
    }

    #[test]
    fn test_extract_text_without_candidates() {
        let body: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(extract_text(body), Err(ApiError::Unexpected(_))));
    }

    #[test]
    fn test_extract_text_with_empty_content() {
        let body: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{}]
        }))
        .unwrap();
        assert!(matches!(extract_text(body), Err(ApiError::Unexpected(_))));
    }

    #[test]
    fn test_error_display_carries_detail() {
        let api = ApiError::Api("quota exceeded".to_string());
        assert!(api.to_string().contains("quota exceeded"));
        assert!(api.to_string().contains("Quota or connectivity"));

        let unexpected = ApiError::Unexpected("boom".to_string());
        assert!(unexpected.to_string().contains("boom"));
        assert!(unexpected.to_string().contains("unexpected"));
    }
}
