use crate::core::classifier::header_matches;
use crate::domain::model::{Dataset, Record, SourceKind};
use crate::domain::session::InputFile;
use crate::utils::error::{Result, TriageError};
use calamine::{open_workbook_auto_from_rs, DataType, Reader};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::io::Cursor;

const DELIMITER_CANDIDATES: [u8; 4] = [b',', b'\t', b';', b'|'];
const SNIFF_RECORDS: usize = 5;
const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Delimited,
    Spreadsheet,
}

/// 判斷檔案型態：先看宣告的 media type，再看副檔名，最後看檔頭 magic bytes
pub fn detect_kind(input: &InputFile) -> FileKind {
    if let Some(media_type) = &input.media_type {
        let media_type = media_type.to_ascii_lowercase();
        if media_type.starts_with("text/") {
            return FileKind::Delimited;
        }
        if media_type.contains("spreadsheet")
            || media_type.contains("ms-excel")
            || media_type.contains("opendocument")
        {
            return FileKind::Spreadsheet;
        }
    }

    match input.extension().as_deref() {
        Some("csv" | "tsv" | "txt") => return FileKind::Delimited,
        Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => return FileKind::Spreadsheet,
        _ => {}
    }

    // ZIP (xlsx/ods) 或 OLE (xls)
    if input.bytes.starts_with(b"PK\x03\x04")
        || input.bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0])
    {
        FileKind::Spreadsheet
    } else {
        FileKind::Delimited
    }
}

#[derive(Debug, Clone)]
pub struct FileLoader {
    keywords: Vec<String>,
    header_scan_rows: usize,
}

impl FileLoader {
    pub fn new(keywords: Vec<String>, header_scan_rows: usize) -> Self {
        Self {
            keywords,
            header_scan_rows,
        }
    }

    pub fn load(&self, input: &InputFile) -> Result<Dataset> {
        let kind = detect_kind(input);
        tracing::debug!("📄 Loading '{}' as {:?}", input.name, kind);

        let dataset = match kind {
            FileKind::Delimited => load_delimited(input)?,
            FileKind::Spreadsheet => self.load_spreadsheet(input)?,
        };

        if dataset.is_empty() {
            return Err(TriageError::EmptyFile {
                file: input.name.clone(),
            });
        }

        tracing::info!(
            "📄 Loaded {} records with {} columns from '{}'",
            dataset.len(),
            dataset.headers.len(),
            input.name
        );
        Ok(dataset)
    }

    fn load_spreadsheet(&self, input: &InputFile) -> Result<Dataset> {
        let unreadable = |reason: String| TriageError::UnreadableFile {
            file: input.name.clone(),
            reason,
        };

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(input.bytes.clone()))
            .map_err(|err| unreadable(format!("Unable to open the spreadsheet: {err}")))?;

        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
        if sheet_names.is_empty() {
            return Err(TriageError::EmptyFile {
                file: input.name.clone(),
            });
        }

        let mut sheets: Vec<(String, Vec<Vec<String>>)> = Vec::with_capacity(sheet_names.len());
        for sheet_name in sheet_names {
            let range = workbook
                .worksheet_range(&sheet_name)
                .ok_or_else(|| unreadable(format!("Unable to read the worksheet named '{sheet_name}'.")))?
                .map_err(|err| unreadable(format!("Unable to read the worksheet data: {err}")))?;
            let rows = range
                .rows()
                .map(|row| row.iter().map(cell_to_string).collect())
                .collect();
            sheets.push((sheet_name, rows));
        }

        // 逐一掃描工作表的前 N 列，第一個出現關鍵字的工作表勝出
        let located = sheets.iter().enumerate().find_map(|(sheet_index, (_, rows))| {
            rows.iter()
                .take(self.header_scan_rows)
                .position(|row| row.iter().any(|cell| header_matches(cell, &self.keywords)))
                .map(|row_index| (sheet_index, row_index))
        });

        let (sheet_index, header_row) = match located {
            Some(found) => found,
            None => {
                tracing::warn!(
                    "⚠️ No header row matched in the first {} rows of any sheet, using the first row of '{}'",
                    self.header_scan_rows,
                    sheets[0].0
                );
                (0, 0)
            }
        };

        let (sheet_name, rows) = sheets.swap_remove(sheet_index);
        let mut rows = rows.into_iter().skip(header_row);
        let raw_headers = match rows.next() {
            Some(header) => header,
            None => {
                return Err(TriageError::EmptyFile {
                    file: input.name.clone(),
                })
            }
        };

        tracing::debug!(
            "📄 Using sheet '{}' with header at row {}",
            sheet_name,
            header_row + 1
        );

        let data_rows: Vec<Vec<String>> = rows
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .collect();

        Ok(build_dataset(
            raw_headers,
            data_rows,
            SourceKind::Spreadsheet {
                sheet: sheet_name,
                header_row,
            },
        ))
    }
}

fn load_delimited(input: &InputFile) -> Result<Dataset> {
    let bytes = input
        .bytes
        .strip_prefix(b"\xEF\xBB\xBF".as_slice())
        .unwrap_or(&input.bytes);
    let text = std::str::from_utf8(bytes).map_err(|err| TriageError::UnreadableFile {
        file: input.name.clone(),
        reason: format!("File is not valid UTF-8: {err}"),
    })?;

    let delimiter = detect_delimiter(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| TriageError::UnreadableFile {
            file: input.name.clone(),
            reason: format!("Unable to read spreadsheet rows: {err}"),
        })?;
        if record.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    if rows.is_empty() {
        return Err(TriageError::EmptyFile {
            file: input.name.clone(),
        });
    }

    let raw_headers = rows.remove(0);
    Ok(build_dataset(
        raw_headers,
        rows,
        SourceKind::Delimited {
            delimiter: delimiter as char,
        },
    ))
}

/// 以 csv 解析器（會處理引號）試讀前幾筆紀錄猜分隔符號。
/// 每筆欄位數一致且大於 1 者優先，其次比較標題欄位數；同分時逗號優先。
pub fn detect_delimiter(text: &str) -> u8 {
    let mut best = b',';
    let mut best_score = (false, 0usize);
    for candidate in DELIMITER_CANDIDATES {
        let score = delimiter_score(text, candidate);
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }
    best
}

fn delimiter_score(text: &str, delimiter: u8) -> (bool, usize) {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let counts: Vec<usize> = reader
        .records()
        .map_while(|record| record.ok())
        .filter(|record| record.iter().any(|value| !value.trim().is_empty()))
        .take(SNIFF_RECORDS)
        .map(|record| record.len())
        .collect();

    let header_fields = counts.first().copied().unwrap_or(0);
    let consistent = header_fields > 1 && counts.iter().all(|count| *count == header_fields);
    (consistent, header_fields)
}

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::Empty => String::new(),
        DataType::String(value) => value.clone(),
        DataType::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        DataType::DateTime(serial) => {
            excel_serial_to_iso(*serial).unwrap_or_else(|| cell.to_string())
        }
        _ => cell.to_string(),
    }
}

/// Excel 日期序號轉 ISO 字串；整天只輸出日期。1900-03-01 之前的序號不處理閏年錯誤。
fn excel_serial_to_iso(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * MILLIS_PER_DAY as f64).round() as i64;
    let at = epoch.checked_add_signed(chrono::Duration::milliseconds(millis))?;
    if millis % MILLIS_PER_DAY == 0 {
        Some(at.format("%Y-%m-%d").to_string())
    } else {
        Some(at.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}

/// 去除空白、補上空欄名並讓重複欄名唯一
pub fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut headers = Vec::with_capacity(raw.len());

    for (index, name) in raw.into_iter().enumerate() {
        let base = match name.trim() {
            "" => format!("Column_{}", index + 1),
            trimmed => trimmed.to_string(),
        };
        let mut candidate = base.clone();
        let mut suffix = 2;
        while seen.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        seen.insert(candidate.clone());
        headers.push(candidate);
    }

    headers
}

fn build_dataset(raw_headers: Vec<String>, rows: Vec<Vec<String>>, source: SourceKind) -> Dataset {
    let mut raw_headers = raw_headers;

    // 資料列比標題長且多出來的儲存格有內容時，補上欄名而不是丟掉
    let widest = rows
        .iter()
        .map(|row| {
            row.iter()
                .rposition(|cell| !cell.trim().is_empty())
                .map(|i| i + 1)
                .unwrap_or(0)
        })
        .max()
        .unwrap_or(0);
    if widest > raw_headers.len() {
        raw_headers.resize(widest, String::new());
    }

    let headers = normalize_headers(raw_headers);
    let records = rows
        .into_iter()
        .map(|row| {
            let mut values = row.into_iter();
            Record::from_pairs(
                headers
                    .iter()
                    .map(|header| (header.clone(), values.next().unwrap_or_default())),
            )
        })
        .collect();

    Dataset::new(headers, records, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn loader() -> FileLoader {
        FileLoader::new(
            vec!["comment".to_string(), "feedback".to_string()],
            20,
        )
    }

    #[test]
    fn test_detect_kind_prefers_media_type_then_extension_then_magic() {
        let csv = InputFile::new("upload.bin", b"a,b\n1,2\n".to_vec()).with_media_type("text/csv");
        assert_eq!(detect_kind(&csv), FileKind::Delimited);

        let by_ext = InputFile::new("survey.XLSX", b"whatever".to_vec());
        assert_eq!(detect_kind(&by_ext), FileKind::Spreadsheet);

        let by_magic = InputFile::new("upload", b"PK\x03\x04rest".to_vec());
        assert_eq!(detect_kind(&by_magic), FileKind::Spreadsheet);

        let plain = InputFile::new("upload", b"ID,Comments\n".to_vec());
        assert_eq!(detect_kind(&plain), FileKind::Delimited);
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3\n"), b',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3\n"), b'\t');
        assert_eq!(detect_delimiter("a;b;c\n1;2;3\n"), b';');
        assert_eq!(detect_delimiter("single\nvalue\n"), b',');
        assert_eq!(detect_delimiter("a|b\n1|2\n"), b'|');
    }

    #[test]
    fn test_detect_delimiter_ignores_quoted_separators() {
        let content = "ID,Comments\n1,\"late; rude; cold; dirty; loud\"\n2,ok\n";
        assert_eq!(detect_delimiter(content), b',');

        let dataset = loader()
            .load(&InputFile::new("feedback.csv", content.as_bytes().to_vec()))
            .unwrap();
        assert_eq!(dataset.headers, vec!["ID", "Comments"]);
        assert_eq!(dataset.records[0].get("Comments"), "late; rude; cold; dirty; loud");
        assert_eq!(dataset.records[1].get("Comments"), "ok");
    }

    #[test]
    fn test_detect_delimiter_ragged_rows_keep_comma() {
        assert_eq!(detect_delimiter("ID,Comments,Date\n1,hello\n2,world,today\n"), b',');
        assert_eq!(detect_delimiter("a;b\n\"x,y,z\";2\n"), b';');
    }

    #[test]
    fn test_spreadsheet_dates_render_as_iso() {
        assert_eq!(cell_to_string(&DataType::DateTime(45366.0)), "2024-03-15");
        assert_eq!(cell_to_string(&DataType::DateTime(45366.5)), "2024-03-15T12:00:00");
        assert_eq!(cell_to_string(&DataType::Float(3.0)), "3");
    }

    #[test]
    fn test_load_csv_with_quoted_multiline_and_blank_lines() {
        let content = "\u{feff}ID,Comments,Date\n\n1,\"line one\nline two\",2024-01-01\n2,short,2024-01-02\n";
        let input = InputFile::new("feedback.csv", content.as_bytes().to_vec());

        let dataset = loader().load(&input).unwrap();

        assert_eq!(dataset.headers, vec!["ID", "Comments", "Date"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records[0].get("Comments"), "line one\nline two");
        assert_eq!(dataset.records[1].get("ID"), "2");
        assert_eq!(dataset.source, SourceKind::Delimited { delimiter: ',' });
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let content = "ID,Comments,Date\n1,hello\n2,world,today\n";
        let input = InputFile::new("feedback.csv", content.as_bytes().to_vec());

        let dataset = loader().load(&input).unwrap();

        assert_eq!(dataset.records[0].get("Date"), "");
        assert_eq!(dataset.records[0].data.len(), 3);
        assert_eq!(dataset.records[1].get("Date"), "today");
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let input = InputFile::new("feedback.csv", b"ID,Comments\n".to_vec());
        let err = loader().load(&input).unwrap_err();
        assert!(matches!(err, TriageError::EmptyFile { .. }));

        let blank = InputFile::new("feedback.csv", b"\n\n".to_vec());
        assert!(matches!(
            loader().load(&blank).unwrap_err(),
            TriageError::EmptyFile { .. }
        ));
    }

    #[test]
    fn test_invalid_utf8_is_unreadable() {
        let input = InputFile::new("feedback.csv", vec![b'I', b'D', b'\n', 0xFF, 0xFE, 0xFD]);
        let err = loader().load(&input).unwrap_err();
        assert!(matches!(err, TriageError::UnreadableFile { .. }));
    }

    #[test]
    fn test_corrupt_spreadsheet_is_unreadable() {
        let input = InputFile::new("feedback.xlsx", b"PK\x03\x04not really a zip".to_vec());
        let err = loader().load(&input).unwrap_err();
        assert!(matches!(err, TriageError::UnreadableFile { .. }));
    }

    #[test]
    fn test_normalize_headers() {
        let headers = normalize_headers(vec![
            " ID ".to_string(),
            "".to_string(),
            "Note".to_string(),
            "Note".to_string(),
        ]);
        assert_eq!(headers, vec!["ID", "Column_2", "Note", "Note_2"]);
    }

    #[test]
    fn test_spreadsheet_header_found_on_later_sheet_and_row() {
        let mut workbook = Workbook::new();
        let cover = workbook.add_worksheet();
        cover.set_name("Cover").unwrap();
        cover.write_string(0, 0, "Quarterly export").unwrap();

        let data = workbook.add_worksheet();
        data.set_name("Data").unwrap();
        data.write_string(0, 0, "Generated by survey tool").unwrap();
        data.write_string(2, 0, "ID").unwrap();
        data.write_string(2, 1, "Customer Feedback").unwrap();
        data.write_number(3, 0, 101).unwrap();
        data.write_string(3, 1, "Great service\nwould return").unwrap();
        data.write_number(5, 0, 102.5).unwrap();
        data.write_string(5, 1, "Too slow").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let input = InputFile::new("survey.xlsx", bytes);
        let dataset = loader().load(&input).unwrap();

        assert_eq!(
            dataset.source,
            SourceKind::Spreadsheet {
                sheet: "Data".to_string(),
                header_row: 2
            }
        );
        assert_eq!(dataset.headers, vec!["ID", "Customer Feedback"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records[0].get("ID"), "101");
        assert_eq!(dataset.records[0].get("Customer Feedback"), "Great service\nwould return");
        assert_eq!(dataset.records[1].get("ID"), "102.5");
    }

    #[test]
    fn test_spreadsheet_without_keyword_falls_back_to_first_row() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Ref").unwrap();
        sheet.write_string(0, 1, "Body").unwrap();
        sheet.write_string(1, 0, "A1").unwrap();
        sheet.write_string(1, 1, "hello").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let dataset = loader()
            .load(&InputFile::new("plain.xlsx", bytes))
            .unwrap();

        assert_eq!(dataset.headers, vec!["Ref", "Body"]);
        assert_eq!(dataset.records[0].get("Body"), "hello");
    }
}
