// ==========================================
// 评审分配引擎 - 文件解析器实现
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 格式: 无表头，每行按列位置解析
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use std::fs::File;
use std::path::Path;

/// 原始行（line 从 1 开始，用于错误报告）
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub line: usize,
    pub fields: Vec<String>,
    /// 行本身无法解码（编码错误等），由上层逐行拒绝
    pub malformed: Option<String>,
}

impl RawRow {
    pub fn new(line: usize, fields: Vec<String>) -> Self {
        Self {
            line,
            fields,
            malformed: None,
        }
    }

    pub fn malformed(line: usize, message: String) -> Self {
        Self {
            line,
            fields: Vec::new(),
            malformed: Some(message),
        }
    }
}

// ==========================================
// FileParser Trait
// ==========================================
pub trait FileParser {
    fn parse_rows(&self, file_path: &Path) -> ImportResult<Vec<RawRow>>;
}

fn check_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn is_blank(fields: &[String]) -> bool {
    fields.iter().all(|v| v.is_empty())
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl CsvParser {
    /// 从内存流解析（score 流式上传）
    pub fn parse_reader<R: std::io::Read>(&self, reader: R) -> ImportResult<Vec<RawRow>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 列数不一致的行交给上层逐行拒绝
            .from_reader(reader);

        let mut rows = Vec::new();
        for (idx, result) in reader.byte_records().enumerate() {
            let line = idx + 1;
            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    rows.push(RawRow::malformed(line, e.to_string()));
                    continue;
                }
            };

            let decoded: Result<Vec<String>, _> = record
                .iter()
                .enumerate()
                .map(|(col, bytes)| {
                    std::str::from_utf8(bytes)
                        .map(|v| v.trim().to_string())
                        .map_err(|e| format!("第 {} 列不是有效的 UTF-8: {}", col + 1, e))
                })
                .collect();
            let fields = match decoded {
                Ok(fields) => fields,
                Err(message) => {
                    rows.push(RawRow::malformed(line, message));
                    continue;
                }
            };

            // 跳过完全空白的行
            if is_blank(&fields) {
                continue;
            }
            rows.push(RawRow::new(line, fields));
        }
        Ok(rows)
    }
}

impl FileParser for CsvParser {
    fn parse_rows(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        check_exists(file_path)?;

        if let Some(ext) = file_path.extension() {
            if ext != "csv" {
                return Err(ImportError::UnsupportedFormat(
                    ext.to_string_lossy().to_string(),
                ));
            }
        }

        let file = File::open(file_path)?;
        self.parse_reader(file)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_rows(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        check_exists(file_path)?;

        let ext = file_path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext.to_string()));
        }

        let mut workbook = open_workbook_auto(file_path)?;

        // 读取第一个 sheet
        let sheet_names = workbook.sheet_names();
        let Some(sheet_name) = sheet_names.first().cloned() else {
            return Err(ImportError::ExcelParseError("Excel 文件无工作表".to_string()));
        };

        let range = workbook.worksheet_range(&sheet_name)?;

        let mut rows = Vec::new();
        for (idx, data_row) in range.rows().enumerate() {
            let fields: Vec<String> = data_row
                .iter()
                .map(|cell| cell.to_string().trim().to_string())
                .collect();

            if is_blank(&fields) {
                continue;
            }
            rows.push(RawRow::new(idx + 1, fields));
        }
        Ok(rows)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    pub fn parse<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<Vec<RawRow>> {
        let path = file_path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => CsvParser.parse_rows(path),
            "xlsx" | "xls" => ExcelParser.parse_rows(path),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}
