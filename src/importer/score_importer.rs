// ==========================================
// 评审分配引擎 - 评分 / 冲突导入
// ==========================================
// 格式: paper_id, member_profile_id, score（无表头）
// 红线: 单行格式错误只拒绝该行，不中断整个导入
// ==========================================

use crate::domain::edge::{AffinityEdge, ConflictEdge, EXCLUSION_WEIGHT};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{CsvParser, RawRow, UniversalFileParser};
use serde::Serialize;
use std::path::Path;
use tracing::instrument;

/// 亲和度保留的小数位
const SCORE_DECIMALS: i32 = 4;

/// 被拒绝的行
#[derive(Debug, Clone, Serialize)]
pub struct RowRejection {
    pub line: usize,
    pub reason: String,
}

/// 导入报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub accepted: usize,
    pub rejected: Vec<RowRejection>,
}

impl ImportReport {
    fn reject(&mut self, line: usize, err: ImportError) {
        tracing::warn!(line = line, error = %err, "导入行被拒绝");
        self.rejected.push(RowRejection {
            line,
            reason: err.to_string(),
        });
    }
}

/// 四舍五入到 4 位小数并截断到 [0,1]
pub fn normalize_score(raw: f64) -> f64 {
    let factor = 10f64.powi(SCORE_DECIMALS);
    ((raw * factor).round() / factor).clamp(0.0, 1.0)
}

// ==========================================
// ScoreImporter - 评分导入器
// ==========================================
pub struct ScoreImporter;

impl ScoreImporter {
    pub fn new() -> Self {
        Self
    }

    /// 从文件导入亲和度（.csv / .xlsx）
    #[instrument(skip(self, file_path), fields(path = %file_path.as_ref().display()))]
    pub fn import_affinity_file<P: AsRef<Path>>(
        &self,
        file_path: P,
    ) -> ImportResult<(Vec<AffinityEdge>, ImportReport)> {
        let rows = UniversalFileParser.parse(file_path)?;
        Ok(self.affinity_from_rows(&rows))
    }

    /// 从内存流导入亲和度（CSV）
    pub fn import_affinity_stream<R: std::io::Read>(
        &self,
        reader: R,
    ) -> ImportResult<(Vec<AffinityEdge>, ImportReport)> {
        let rows = CsvParser.parse_reader(reader)?;
        Ok(self.affinity_from_rows(&rows))
    }

    /// 从文件导入人工冲突（weight ≥ -1）
    #[instrument(skip(self, file_path), fields(path = %file_path.as_ref().display()))]
    pub fn import_conflict_file<P: AsRef<Path>>(
        &self,
        file_path: P,
    ) -> ImportResult<(Vec<ConflictEdge>, ImportReport)> {
        let rows = UniversalFileParser.parse(file_path)?;
        Ok(self.conflicts_from_rows(&rows))
    }

    pub fn affinity_from_rows(&self, rows: &[RawRow]) -> (Vec<AffinityEdge>, ImportReport) {
        let mut report = ImportReport::default();
        let mut edges = Vec::with_capacity(rows.len());

        for row in rows {
            match parse_triple(row, "score") {
                Ok((paper_id, member_id, raw)) => {
                    edges.push(AffinityEdge::new(paper_id, member_id, normalize_score(raw)));
                    report.accepted += 1;
                }
                Err(e) => report.reject(row.line, e),
            }
        }

        tracing::info!(
            accepted = report.accepted,
            rejected = report.rejected.len(),
            "亲和度导入完成"
        );
        (edges, report)
    }

    pub fn conflicts_from_rows(&self, rows: &[RawRow]) -> (Vec<ConflictEdge>, ImportReport) {
        let mut report = ImportReport::default();
        let mut edges = Vec::with_capacity(rows.len());

        for row in rows {
            let parsed = parse_triple(row, "weight").and_then(|(paper_id, member_id, weight)| {
                if weight < EXCLUSION_WEIGHT {
                    return Err(ImportError::ValueRangeError {
                        row: row.line,
                        field: "weight".to_string(),
                        value: weight,
                        min: EXCLUSION_WEIGHT,
                        max: f64::MAX,
                    });
                }
                Ok(ConflictEdge {
                    paper_id: paper_id.to_string(),
                    member_id: member_id.to_string(),
                    weight,
                    label: Some("Conflict".to_string()),
                })
            });
            match parsed {
                Ok(edge) => {
                    edges.push(edge);
                    report.accepted += 1;
                }
                Err(e) => report.reject(row.line, e),
            }
        }

        tracing::info!(
            accepted = report.accepted,
            rejected = report.rejected.len(),
            "冲突导入完成"
        );
        (edges, report)
    }
}

impl Default for ScoreImporter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_triple<'a>(row: &'a RawRow, value_field: &str) -> ImportResult<(&'a str, &'a str, f64)> {
    if let Some(message) = &row.malformed {
        return Err(ImportError::MalformedRow {
            row: row.line,
            message: message.clone(),
        });
    }
    if row.fields.len() != 3 {
        return Err(ImportError::ArityError {
            row: row.line,
            expected: 3,
            actual: row.fields.len(),
        });
    }
    let paper_id = row.fields[0].as_str();
    let member_id = row.fields[1].as_str();
    for (field, value) in [("paper_id", paper_id), ("member_profile_id", member_id)] {
        if value.is_empty() {
            return Err(ImportError::EmptyField {
                row: row.line,
                field: field.to_string(),
            });
        }
    }

    let raw: f64 = row.fields[2]
        .parse()
        .map_err(|e: std::num::ParseFloatError| ImportError::TypeConversionError {
            row: row.line,
            field: value_field.to_string(),
            message: e.to_string(),
        })?;
    if !raw.is_finite() {
        return Err(ImportError::TypeConversionError {
            row: row.line,
            field: value_field.to_string(),
            message: format!("非有限数 {}", row.fields[2]),
        });
    }
    Ok((paper_id, member_id, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(line: usize, fields: &[&str]) -> RawRow {
        RawRow::new(line, fields.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_normalize_score() {
        assert_eq!(normalize_score(0.123456), 0.1235);
        assert_eq!(normalize_score(1.7), 1.0);
        assert_eq!(normalize_score(-0.2), 0.0);
    }

    #[test]
    fn test_malformed_rows_rejected_individually() {
        let rows = vec![
            row(1, &["P1", "~R1", "0.91234"]),
            row(2, &["P1", "~R2"]),
            row(3, &["P1", "~R3", "high"]),
            row(4, &["", "~R4", "0.3"]),
            row(5, &["P1", "~R5", "NaN"]),
            row(6, &["P2", "~R1", "3"]),
        ];
        let (edges, report) = ScoreImporter::new().affinity_from_rows(&rows);

        assert_eq!(report.accepted, 2);
        assert_eq!(
            report.rejected.iter().map(|r| r.line).collect::<Vec<_>>(),
            vec![2, 3, 4, 5]
        );
        assert_eq!(edges[0].weight, 0.9123);
        assert_eq!(edges[1].weight, 1.0);
    }

    #[test]
    fn test_conflict_rows_below_exclusion_rejected() {
        let rows = vec![row(1, &["P1", "~R1", "-1"]), row(2, &["P1", "~R2", "-3"])];
        let (edges, report) = ScoreImporter::new().conflicts_from_rows(&rows);

        assert_eq!(edges.len(), 1);
        assert!(edges[0].is_exclusion());
        assert_eq!(report.rejected[0].line, 2);
    }

    #[test]
    fn test_stream_import() {
        let data = "P1,~R1,0.5\nP2,~R1,bad\n";
        let (edges, report) = ScoreImporter::new()
            .import_affinity_stream(data.as_bytes())
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(report.rejected.len(), 1);
    }

    #[test]
    fn test_stream_import_rejects_undecodable_row_only() {
        let data: &[u8] = b"P1,~A1,0.5\nP2,~B\xff1,0.4\nP3,~C1,0.3";
        let (edges, report) = ScoreImporter::new().import_affinity_stream(data).unwrap();

        assert_eq!(
            edges.iter().map(|e| e.member_id.as_str()).collect::<Vec<_>>(),
            vec!["~A1", "~C1"]
        );
        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].line, 2);
        assert!(report.rejected[0].reason.contains("UTF-8"));
    }
}
