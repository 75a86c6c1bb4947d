use crate::config::toml_config::{FallbackConfig, FallbackRule};
use crate::core::Predictor;
use crate::domain::model::{LabelScore, PredictionResult};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 服務無法使用時的本地關鍵字分類
#[derive(Debug, Clone)]
pub struct KeywordFallbackPredictor {
    rules: Vec<FallbackRule>,
    default_label: String,
}

impl KeywordFallbackPredictor {
    pub fn new(config: &FallbackConfig) -> Self {
        let rules = config
            .rules
            .iter()
            .map(|rule| FallbackRule {
                label: rule.label.clone(),
                keywords: rule
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();

        Self {
            rules,
            default_label: config.default_label.clone(),
        }
    }

    fn hits(rule: &FallbackRule, text: &str) -> usize {
        rule.keywords
            .iter()
            .map(|keyword| text.matches(keyword.as_str()).count())
            .sum()
    }
}

#[async_trait]
impl Predictor for KeywordFallbackPredictor {
    async fn predict(&self, text: &str) -> Result<PredictionResult> {
        let lowered = text.to_lowercase();
        let scored: Vec<(&str, usize)> = self
            .rules
            .iter()
            .map(|rule| (rule.label.as_str(), Self::hits(rule, &lowered)))
            .filter(|(_, hits)| *hits > 0)
            .collect();

        let total: usize = scored.iter().map(|(_, hits)| hits).sum();
        if total == 0 {
            return Ok(PredictionResult::ranked(vec![LabelScore {
                label: self.default_label.clone(),
                probability: 0.0,
            }]));
        }

        // 同分時保留規則順序
        Ok(PredictionResult::ranked(
            scored
                .into_iter()
                .map(|(label, hits)| LabelScore {
                    label: label.to_string(),
                    probability: hits as f64 * 100.0 / total as f64,
                })
                .collect(),
        ))
    }

    fn name(&self) -> &str {
        "keyword-fallback"
    }
}
