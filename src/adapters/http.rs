use crate::config::toml_config::PredictionHead;
use crate::config::TriageConfig;
use crate::core::Predictor;
use crate::domain::model::{LabelScore, PredictionResult};
use crate::utils::error::{Result, TriageError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    text: &'a str,
}

/// 服務可能回傳雙層預測，也可能只回傳單一清單
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictResponse {
    Flat(Vec<LabelScore>),
    TwoHead {
        #[serde(rename = "mainPredictions", default)]
        main: Vec<LabelScore>,
        #[serde(rename = "subPredictions", default)]
        sub: Vec<LabelScore>,
    },
}

impl PredictResponse {
    fn select(self, head: PredictionHead) -> Vec<LabelScore> {
        match self {
            PredictResponse::Flat(list) => list,
            PredictResponse::TwoHead { main, sub } => match head {
                PredictionHead::Main => main,
                PredictionHead::Sub => sub,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub main_classes_count: usize,
    #[serde(default)]
    pub sub_classes_count: usize,
}

impl HealthStatus {
    pub fn is_ready(&self) -> bool {
        self.status == "healthy" && self.model_loaded
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Categories {
    #[serde(rename = "mainCategories", default)]
    pub main: Vec<String>,
    #[serde(rename = "subCategories", default)]
    pub sub: Vec<String>,
}

/// 遠端分類服務的 HTTP 客戶端
#[derive(Debug, Clone)]
pub struct HttpPredictor {
    client: Client,
    predict_url: String,
    health_url: String,
    categories_url: String,
    head: PredictionHead,
}

impl HttpPredictor {
    pub fn new(config: &TriageConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_seconds))
            .default_headers(build_headers(config.api.headers.as_ref())?)
            .build()?;

        Ok(Self {
            client,
            predict_url: config.predict_url(),
            health_url: config.health_url(),
            categories_url: config.categories_url(),
            head: config.api.prediction_head,
        })
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        tracing::debug!("Checking service health at {}", self.health_url);
        let response = self.client.get(&self.health_url).send().await?;

        if !response.status().is_success() {
            return Err(TriageError::ServiceUnavailable {
                message: format!("Health check returned {}", response.status()),
            });
        }

        Ok(response.json::<HealthStatus>().await?)
    }

    /// 服務可連線但模型未載入時同樣視為不可用
    pub async fn ensure_ready(&self) -> Result<HealthStatus> {
        let health = self.health().await.map_err(|e| match e {
            TriageError::ApiError(inner) => TriageError::ServiceUnavailable {
                message: inner.to_string(),
            },
            other => other,
        })?;

        if !health.is_ready() {
            return Err(TriageError::ServiceUnavailable {
                message: format!(
                    "status '{}', model_loaded={}",
                    health.status, health.model_loaded
                ),
            });
        }

        tracing::info!(
            "✅ Prediction service ready ({} main / {} sub classes)",
            health.main_classes_count,
            health.sub_classes_count
        );
        Ok(health)
    }

    pub async fn categories(&self) -> Result<Categories> {
        let response = self.client.get(&self.categories_url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(TriageError::PredictionError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json::<Categories>().await?)
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, text: &str) -> Result<PredictionResult> {
        let response = self
            .client
            .post(&self.predict_url)
            .json(&PredictRequest { text })
            .send()
            .await?;
        let status = response.status();
        tracing::debug!("📡 Predict response status: {}", status);

        if !status.is_success() {
            return Err(TriageError::PredictionError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await?;
        let parsed: PredictResponse = serde_json::from_str(&body)?;
        Ok(PredictionResult::ranked(parsed.select(self.head)))
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn build_headers(headers: Option<&std::collections::HashMap<String, String>>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers.into_iter().flatten() {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            TriageError::InvalidConfigValueError {
                field: "api.headers".to_string(),
                value: key.clone(),
                reason: e.to_string(),
            }
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            TriageError::InvalidConfigValueError {
                field: format!("api.headers.{}", key),
                value: value.clone(),
                reason: e.to_string(),
            }
        })?;
        map.insert(name, value);
    }
    Ok(map)
}
