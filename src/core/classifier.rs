use crate::domain::model::TextColumn;
use crate::utils::error::{Result, TriageError};

/// 欄位名稱（小寫、去空白後）包含任一關鍵字即算符合。關鍵字需已轉小寫。
pub fn header_matches(name: &str, keywords: &[String]) -> bool {
    let normalized = name.trim().to_lowercase();
    !normalized.is_empty() && keywords.iter().any(|k| normalized.contains(k.as_str()))
}

/// 找出回饋文字所在欄位
#[derive(Debug, Clone)]
pub struct ColumnClassifier {
    keywords: Vec<String>,
    explicit: Option<String>,
}

impl ColumnClassifier {
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            explicit: None,
        }
    }

    pub fn with_explicit_column(mut self, column: Option<String>) -> Self {
        self.explicit = column;
        self
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// 依原始欄位順序，第一個符合者勝出（不是「最佳」符合）
    pub fn resolve(&self, headers: &[String]) -> Result<TextColumn> {
        let found = match &self.explicit {
            Some(wanted) => {
                let wanted = wanted.trim().to_lowercase();
                headers
                    .iter()
                    .position(|h| h.trim().to_lowercase() == wanted)
            }
            None => headers
                .iter()
                .position(|h| header_matches(h, &self.keywords)),
        };

        match found {
            Some(index) => {
                tracing::debug!("🔎 Text column resolved to '{}' (#{})", headers[index], index);
                Ok(TextColumn {
                    name: headers[index].clone(),
                    index,
                })
            }
            None => {
                tracing::error!("❌ No text column among headers: {:?}", headers);
                Err(TriageError::NoTextColumnFound {
                    headers: headers.to_vec(),
                })
            }
        }
    }
}
