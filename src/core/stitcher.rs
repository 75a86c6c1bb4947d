use crate::config::toml_config::StitchMode;
use crate::domain::model::{Dataset, Record, StitchReport, TextColumn};

/// 修復因未跳脫換行而被拆成多列的紀錄。
///
/// 主鍵欄（預設第一欄）有值的列視為真正的新紀錄；主鍵欄為空的列視為前一筆紀錄的
/// 文字片段，其非空儲存格以空白串接後，換行附加到前一筆的文字欄。
///
/// 在 `Lenient` 模式下，主鍵欄剛好缺值的真實紀錄也會被當成片段合併，這是已知的取捨。
#[derive(Debug, Clone)]
pub struct Stitcher {
    mode: StitchMode,
    key_column: Option<String>,
}

impl Stitcher {
    pub fn new(mode: StitchMode, key_column: Option<String>) -> Self {
        Self { mode, key_column }
    }

    fn resolve_key<'a>(&'a self, dataset: &'a Dataset) -> Option<&'a str> {
        match &self.key_column {
            Some(wanted) => dataset
                .headers
                .iter()
                .find(|h| h.trim().eq_ignore_ascii_case(wanted.trim()))
                .map(String::as_str)
                .or_else(|| {
                    tracing::warn!(
                        "⚠️ Key column '{}' not found, falling back to the first column",
                        wanted
                    );
                    dataset.headers.first().map(String::as_str)
                }),
            None => dataset.headers.first().map(String::as_str),
        }
    }

    fn is_fragment(&self, record: &Record, key: &str, headers: &[String]) -> bool {
        if !record.is_blank(key) {
            return false;
        }
        match self.mode {
            StitchMode::Off => false,
            StitchMode::Lenient => true,
            StitchMode::Strict => {
                headers.iter().filter(|h| !record.is_blank(h)).count() <= 1
            }
        }
    }

    /// 只對分隔文字來源生效；試算表本身就能保存儲存格內的換行
    pub fn stitch(&self, dataset: &mut Dataset, text_column: &TextColumn) -> StitchReport {
        let mut report = StitchReport::default();

        if !dataset.source.is_delimited() || self.mode == StitchMode::Off {
            return report;
        }

        let key = match self.resolve_key(dataset) {
            Some(key) => key.to_string(),
            None => return report,
        };

        let records = std::mem::take(&mut dataset.records);
        let mut output: Vec<Record> = Vec::with_capacity(records.len());

        for (index, record) in records.into_iter().enumerate() {
            if !self.is_fragment(&record, &key, &dataset.headers) {
                output.push(record);
                continue;
            }

            let fragment = dataset
                .headers
                .iter()
                .map(|h| record.get(h).trim())
                .filter(|value| !value.is_empty())
                .collect::<Vec<_>>()
                .join(" ");

            if fragment.is_empty() {
                report.blank_dropped += 1;
                continue;
            }

            match output.last_mut() {
                Some(owner) => {
                    let merged = match owner.get(&text_column.name) {
                        "" => fragment,
                        existing => format!("{}\n{}", existing, fragment),
                    };
                    owner.set(&text_column.name, merged);
                    report.stitched += 1;
                    tracing::debug!("🧵 Row {} merged into the previous record", index + 1);
                }
                None => {
                    report.orphans_dropped += 1;
                    tracing::debug!("🧵 Row {} dropped: fragment before any record", index + 1);
                }
            }
        }

        dataset.records = output;

        if report.stitched > 0 || report.orphans_dropped > 0 {
            tracing::info!(
                "🧵 Stitched {} fragments ({} orphans, {} blank rows dropped)",
                report.stitched,
                report.orphans_dropped,
                report.blank_dropped
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SourceKind;

    fn dataset(headers: &[&str], rows: &[&[&str]]) -> Dataset {
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        let records = rows
            .iter()
            .map(|row| Record::from_pairs(headers.iter().cloned().zip(row.iter().map(|v| v.to_string()))))
            .collect();
        Dataset::new(headers, records, SourceKind::Delimited { delimiter: ',' })
    }

    fn text(name: &str, index: usize) -> TextColumn {
        TextColumn {
            name: name.to_string(),
            index,
        }
    }

    #[test]
    fn test_fragment_merges_into_previous_record() {
        let mut data = dataset(
            &["key", "text", "other"],
            &[&["1", "hello", ""], &["", "", "world"]],
        );

        let report = Stitcher::new(StitchMode::Lenient, None).stitch(&mut data, &text("text", 1));

        assert_eq!(report.stitched, 1);
        assert_eq!(data.len(), 1);
        assert_eq!(data.records[0].get("key"), "1");
        assert_eq!(data.records[0].get("text"), "hello\nworld");
    }

    #[test]
    fn test_fragment_values_are_space_joined_in_column_order() {
        let mut data = dataset(
            &["id", "comment", "a", "b"],
            &[&["7", "start", "", ""], &["", "", "mid", "end"], &["8", "next", "", ""]],
        );

        let report = Stitcher::new(StitchMode::Lenient, None).stitch(&mut data, &text("comment", 1));

        assert_eq!(report.stitched, 1);
        assert_eq!(data.len(), 2);
        assert_eq!(data.records[0].get("comment"), "start\nmid end");
        assert_eq!(data.records[1].get("comment"), "next");
    }

    #[test]
    fn test_leading_fragment_is_dropped() {
        let mut data = dataset(&["id", "comment"], &[&["", "orphan"], &["1", "kept"]]);

        let report = Stitcher::new(StitchMode::Lenient, None).stitch(&mut data, &text("comment", 1));

        assert_eq!(report.orphans_dropped, 1);
        assert_eq!(report.stitched, 0);
        assert_eq!(data.len(), 1);
        assert_eq!(data.records[0].get("comment"), "kept");
    }

    #[test]
    fn test_stitching_is_idempotent() {
        let mut data = dataset(
            &["id", "comment"],
            &[&["1", "a"], &["", "b"], &["2", "c"]],
        );
        let stitcher = Stitcher::new(StitchMode::Lenient, None);
        stitcher.stitch(&mut data, &text("comment", 1));
        let once = data.clone();

        let report = stitcher.stitch(&mut data, &text("comment", 1));

        assert_eq!(report, StitchReport::default());
        assert_eq!(data, once);
    }

    #[test]
    fn test_lenient_mode_merges_sparse_genuine_record() {
        // 缺 ID 的真實紀錄也會被合併，屬於已記錄的行為
        let mut data = dataset(
            &["id", "comment", "date"],
            &[&["1", "first", "2024-01-01"], &["", "second", "2024-01-02"]],
        );

        Stitcher::new(StitchMode::Lenient, None).stitch(&mut data, &text("comment", 1));

        assert_eq!(data.len(), 1);
        assert_eq!(data.records[0].get("comment"), "first\nsecond 2024-01-02");
    }

    #[test]
    fn test_strict_mode_keeps_sparse_genuine_record() {
        let mut data = dataset(
            &["id", "comment", "date"],
            &[&["1", "first", "2024-01-01"], &["", "second", "2024-01-02"], &["", "tail", ""]],
        );

        let report = Stitcher::new(StitchMode::Strict, None).stitch(&mut data, &text("comment", 1));

        assert_eq!(report.stitched, 1);
        assert_eq!(data.len(), 2);
        assert_eq!(data.records[1].get("comment"), "second\ntail");
    }

    #[test]
    fn test_spreadsheet_sources_bypass_stitching() {
        let mut data = dataset(&["id", "comment"], &[&["1", "a"], &["", "b"]]);
        data.source = SourceKind::Spreadsheet {
            sheet: "Sheet1".to_string(),
            header_row: 0,
        };

        let report = Stitcher::new(StitchMode::Lenient, None).stitch(&mut data, &text("comment", 1));

        assert_eq!(report.stitched, 0);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_configured_key_column() {
        let mut data = dataset(
            &["note", "ticket", "comment"],
            &[&["", "T-1", "a"], &["x", "", "b"]],
        );

        Stitcher::new(StitchMode::Lenient, Some("Ticket".to_string()))
            .stitch(&mut data, &text("comment", 2));

        assert_eq!(data.len(), 1);
        assert_eq!(data.records[0].get("comment"), "a\nx b");
    }
}
