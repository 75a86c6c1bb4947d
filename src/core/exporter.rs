use crate::config::toml_config::ExportFormat;
use crate::domain::model::{Dataset, RunSummary};
use crate::utils::error::{Result, TriageError};
use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, Workbook};
use std::io::Write;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const RESULTS_ENTRY: &str = "results.csv";
pub const SUMMARY_ENTRY: &str = "summary.json";
const SHEET_NAME: &str = "Predictions";
/// Excel 單一儲存格的字元上限
pub const XLSX_MAX_CELL_CHARS: usize = 32_767;

/// 依輸出格式序列化：原始欄位（原順序）+ 兩個預測欄位
#[derive(Debug, Clone, Copy)]
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// 例如 `predictions_20250101T120000.csv`
    pub fn file_name(&self, prefix: &str, at: DateTime<Utc>) -> String {
        format!(
            "{}_{}.{}",
            prefix,
            at.format("%Y%m%dT%H%M%S"),
            self.format.extension()
        )
    }

    pub fn export(&self, dataset: &Dataset, summary: &RunSummary) -> Result<Vec<u8>> {
        let bytes = match self.format {
            ExportFormat::Csv => to_csv(dataset)?,
            ExportFormat::Xlsx => to_xlsx(dataset)?,
            ExportFormat::Zip => to_zip(dataset, summary)?,
        };
        tracing::debug!(
            "💾 Serialized {} rows as {:?} ({} bytes)",
            dataset.len(),
            self.format,
            bytes.len()
        );
        Ok(bytes)
    }
}

/// 含分隔符號、引號或換行的欄位一律加引號，避免產生需要再縫合的檔案
pub fn to_csv(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer.write_record(dataset.output_columns())?;
    for record in &dataset.records {
        writer.write_record(dataset.row_values(record))?;
    }

    writer
        .into_inner()
        .map_err(|err| TriageError::IoError(err.into_error()))
}

pub fn to_xlsx(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let header_format = Format::new().set_bold();
    for (col_index, header) in dataset.output_columns().iter().enumerate() {
        sheet.write_string_with_format(0, col_index as u16, header, &header_format)?;
    }

    let columns = dataset.output_columns();
    for (row_index, record) in dataset.records.iter().enumerate() {
        let row = (row_index + 1) as u32;
        for (col_index, value) in dataset.row_values(record).iter().enumerate() {
            if value.chars().count() > XLSX_MAX_CELL_CHARS {
                tracing::warn!(
                    "⚠️ Row {} column '{}' exceeds {} characters, truncating in the xlsx export",
                    row_index + 1,
                    columns[col_index],
                    XLSX_MAX_CELL_CHARS
                );
                let truncated: String = value.chars().take(XLSX_MAX_CELL_CHARS).collect();
                sheet.write_string(row, col_index as u16, &truncated)?;
            } else {
                sheet.write_string(row, col_index as u16, value)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

pub fn to_zip(dataset: &Dataset, summary: &RunSummary) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    zip.start_file(RESULTS_ENTRY, SimpleFileOptions::default())?;
    zip.write_all(&to_csv(dataset)?)?;

    zip.start_file(SUMMARY_ENTRY, SimpleFileOptions::default())?;
    zip.write_all(serde_json::to_string_pretty(summary)?.as_bytes())?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Record, RecordFailure, SourceKind};
    use calamine::{open_workbook_auto_from_rs, Reader};
    use std::io::Read;

    fn processed_dataset() -> Dataset {
        let mut dataset = Dataset::new(
            vec!["ID".to_string(), "Comments".to_string(), "Date".to_string()],
            vec![
                Record::from_pairs([
                    ("ID", "1"),
                    ("Comments", "needs, \"quotes\"\nand newline"),
                    ("Date", "2024-01-01"),
                    ("Predicted_Subcategory", "Delivery"),
                    ("Subcategory_Confidence", "94.50%"),
                ]),
                // 缺少 Date 的列仍要輸出完整欄位
                Record::from_pairs([
                    ("ID", "2"),
                    ("Comments", ""),
                    ("Predicted_Subcategory", ""),
                    ("Subcategory_Confidence", ""),
                ]),
            ],
            SourceKind::Delimited { delimiter: ',' },
        );
        dataset.synthetic_columns = vec![
            "Predicted_Subcategory".to_string(),
            "Subcategory_Confidence".to_string(),
        ];
        dataset
    }

    fn summary() -> RunSummary {
        let now = Utc::now();
        RunSummary {
            source_file: "feedback.csv".to_string(),
            text_column: "Comments".to_string(),
            total: 2,
            predicted: 1,
            skipped: 1,
            failed: 0,
            stitched: 0,
            orphans_dropped: 0,
            failures: Vec::<RecordFailure>::new(),
            cancelled: false,
            unprocessed: 0,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_csv_has_uniform_columns_and_quotes_special_fields() {
        let bytes = to_csv(&processed_dataset()).unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(bytes.as_slice());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(
            headers,
            vec!["ID", "Comments", "Date", "Predicted_Subcategory", "Subcategory_Confidence"]
        );

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.len(), 5);
        }
        assert_eq!(&rows[0][1], "needs, \"quotes\"\nand newline");
        assert_eq!(&rows[1][2], "");

        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"needs, \"\"quotes\"\"\nand newline\""));
    }

    #[test]
    fn test_xlsx_export_is_readable() {
        let bytes = to_xlsx(&processed_dataset()).unwrap();

        let mut workbook = open_workbook_auto_from_rs(std::io::Cursor::new(bytes)).unwrap();
        let range = workbook.worksheet_range(SHEET_NAME).unwrap().unwrap();
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();

        assert_eq!(rows[0][3], "Predicted_Subcategory");
        assert_eq!(rows[1][3], "Delivery");
        assert_eq!(rows[1][4], "94.50%");
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_xlsx_truncates_oversized_cells() {
        let mut dataset = processed_dataset();
        dataset.records[0].set("Comments", "x".repeat(40_000));

        let bytes = to_xlsx(&dataset).unwrap();

        let mut workbook = open_workbook_auto_from_rs(std::io::Cursor::new(bytes)).unwrap();
        let range = workbook.worksheet_range(SHEET_NAME).unwrap().unwrap();
        let comment = range.get_value((1, 1)).unwrap().to_string();
        assert_eq!(comment.chars().count(), XLSX_MAX_CELL_CHARS);
        assert_eq!(range.get_value((1, 3)).unwrap().to_string(), "Delivery");
    }

    #[test]
    fn test_zip_bundle_contains_results_and_summary() {
        let bytes = to_zip(&processed_dataset(), &summary()).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();

        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec![RESULTS_ENTRY, SUMMARY_ENTRY]);

        let mut summary_json = String::new();
        archive
            .by_name(SUMMARY_ENTRY)
            .unwrap()
            .read_to_string(&mut summary_json)
            .unwrap();
        let parsed: RunSummary = serde_json::from_str(&summary_json).unwrap();
        assert_eq!(parsed.total, 2);
        assert_eq!(parsed.text_column, "Comments");
    }

    #[test]
    fn test_file_name_uses_format_extension() {
        let at = DateTime::parse_from_rfc3339("2025-03-04T05:06:07Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            Exporter::new(ExportFormat::Xlsx).file_name("predictions", at),
            "predictions_20250304T050607.xlsx"
        );
    }
}
