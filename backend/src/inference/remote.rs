use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client as HttpClient;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::conditions::find_by_name;
use super::predictor::PredictionSet;
use crate::error::DiagnosisError;
use crate::ingest::UploadedImage;

pub const DEFAULT_ADVICE: &str = "No specific advice provided.";

lazy_static! {
    static ref CONDITION_LINE: Regex =
        Regex::new(r"\*\*Predicted Condition:\*\*[ \t]*(.+)").expect("condition pattern");
    static ref CONFIDENCE_LINE: Regex =
        Regex::new(r"\*\*Confidence:\*\*[ \t]*([\d.]+)%").expect("confidence pattern");
    static ref LEADING_NUMBER: Regex = Regex::new(r"^(?:\d+(?:\.\d*)?|\.\d+)").expect("number pattern");
    static ref ADVICE_BLOCK: Regex = Regex::new(r"(?s)\*\*Advice:\*\*\s+(.*)").expect("advice pattern");
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote diagnosis returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Could not parse remote diagnosis: {0}")]
    ParseFailure(String),
}

impl From<RemoteError> for DiagnosisError {
    fn from(err: RemoteError) -> Self {
        DiagnosisError::ModelUnavailable(err.to_string())
    }
}

/// Body returned by the diagnosis endpoint. Structured fields win over the
/// markdown `prediction` text when both are present.
#[derive(Debug, Default, Deserialize)]
pub struct RemoteResponse {
    pub prediction: Option<String>,
    pub condition: Option<String>,
    pub confidence: Option<f64>,
    pub advice: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDiagnosis {
    pub condition: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub advice: String,
}

impl RemoteDiagnosis {
    pub fn into_prediction_set(&self) -> Result<PredictionSet, RemoteError> {
        let class = find_by_name(&self.condition).ok_or_else(|| {
            RemoteError::ParseFailure(format!("unrecognised condition '{}'", self.condition))
        })?;
        PredictionSet::from_primary(class.id, self.confidence)
            .ok_or_else(|| RemoteError::ParseFailure(format!("class id {} out of range", class.id)))
    }
}

/// The only place that knows the markdown layout of the remote response.
pub fn parse_markdown_prediction(markdown: &str) -> Result<RemoteDiagnosis, RemoteError> {
    let condition = CONDITION_LINE
        .captures(markdown)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| RemoteError::ParseFailure("missing **Predicted Condition:** line".to_string()))?;

    let confidence = match CONFIDENCE_LINE.captures(markdown).and_then(|caps| caps.get(1)) {
        // `87.5.1%` reads as 87.5: only the longest leading number counts
        Some(m) => {
            let percent: f64 = LEADING_NUMBER
                .find(m.as_str())
                .and_then(|number| number.as_str().parse().ok())
                .ok_or_else(|| RemoteError::ParseFailure(format!("malformed confidence '{}'", m.as_str())))?;
            percent / 100.0
        }
        None => 0.0,
    };

    let advice = ADVICE_BLOCK
        .captures(markdown)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DEFAULT_ADVICE.to_string());

    Ok(RemoteDiagnosis {
        condition,
        confidence: confidence.clamp(0.0, 1.0),
        advice,
    })
}

pub fn translate_response(response: RemoteResponse) -> Result<RemoteDiagnosis, RemoteError> {
    if let Some(condition) = response.condition {
        // some deployments report percentages
        let confidence = match response.confidence.unwrap_or(0.0) {
            c if c > 1.0 => c / 100.0,
            c => c,
        };
        return Ok(RemoteDiagnosis {
            condition: condition.trim().to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            advice: response.advice.unwrap_or_else(|| DEFAULT_ADVICE.to_string()),
        });
    }

    match response.prediction {
        Some(markdown) => parse_markdown_prediction(&markdown),
        None => Err(RemoteError::ParseFailure(
            "response carried neither structured fields nor a prediction".to_string(),
        )),
    }
}

#[derive(Clone)]
pub struct RemoteDiagnosisClient {
    http_client: HttpClient,
    endpoint: Url,
}

impl RemoteDiagnosisClient {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, RemoteError> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn model_id(&self) -> String {
        format!(
            "Swin Transformer (remote: {})",
            self.endpoint.host_str().unwrap_or("unknown host")
        )
    }

    pub async fn diagnose(&self, image: &UploadedImage) -> Result<RemoteDiagnosis, RemoteError> {
        let part = Part::bytes(image.data().to_vec())
            .file_name(image.file_name().unwrap_or("upload").to_string())
            .mime_str(image.mime_type())?;
        let form = Form::new().part("file", part);

        log::info!(
            "Posting {} bytes to remote diagnosis endpoint {}",
            image.size(),
            self.endpoint
        );
        let response = self
            .http_client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await?;
            return Err(RemoteError::Status {
                status,
                body: if error_text.is_empty() {
                    "Model not responding".to_string()
                } else {
                    error_text
                },
            });
        }

        let body: RemoteResponse = response.json().await?;
        translate_response(body)
    }
}
