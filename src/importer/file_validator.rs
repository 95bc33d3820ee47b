// ==========================================
// RTB 绩效报表导入系统 - 文件级校验器
// ==========================================
// 职责: 整文件门禁 —— 表头解析 + 必填字段命中检查
// 约定: 纯判定,无副作用;每文件恰好执行一次,先于任何行级处理
// 红线: 只因必填列缺失而拒绝;可选列缺失仅提示,绝不致命
// ==========================================

use crate::domain::report::ValidationReport;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::ColumnMap;
use csv::ReaderBuilder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

// 缺失必填字段的修复指引模板:
// 左列为规范字段名,右列为报表配置中需要勾选的字面项
const DIMENSION_FIXES: &[(&str, &str)] = &[
    ("day", "Day(位于 Time 维度组)"),
    ("creative_id", "Creative ID"),
    ("billing_id", "Billing ID"),
    ("creative_size", "Creative size"),
];

const METRIC_FIXES: &[(&str, &str)] = &[
    ("reached_queries", "Reached queries"),
    ("impressions", "Impressions"),
];

pub struct FileValidator;

impl FileValidator {
    /// 校验报表文件:存在性 → 表头可读 → 必填字段全命中
    ///
    /// # 返回
    /// - Ok(report): 校验结论(is_valid 可能为 false,含修复指引)
    /// - Err: 文件不存在/不可读/表头不可解析(文件级致命)
    pub fn validate(path: &Path) -> ImportResult<ValidationReport> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| ImportError::HeaderUnreadable(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if header.iter().all(|h| h.is_empty()) {
            return Err(ImportError::HeaderUnreadable(
                "表头行为空".to_string(),
            ));
        }

        let columns = ColumnMap::resolve(&header);
        let row_count_estimate = Self::estimate_row_count(path)?;

        let remediation = if columns.is_valid() {
            None
        } else {
            Some(Self::build_remediation(&columns.required_missing))
        };

        Ok(ValidationReport {
            is_valid: columns.is_valid(),
            columns_found: header,
            columns_mapped: columns.mapped_literals(),
            required_missing: columns.required_missing,
            optional_missing: columns.optional_missing,
            remediation,
            row_count_estimate,
        })
    }

    /// 解析表头并返回行处理用的 ColumnMap(导入阶段复用)
    pub fn resolve_columns(header: &csv::StringRecord) -> ColumnMap {
        let names: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
        ColumnMap::resolve(&names)
    }

    /// 估算数据行数(按行计数,表头行除外)
    fn estimate_row_count(path: &Path) -> ImportResult<usize> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let total = reader.lines().count();
        Ok(total.saturating_sub(1))
    }

    /// 按缺失字段逐项生成修复指引
    ///
    /// 指引必须可直接执行:指出在源报表配置中需要添加的
    /// 具体维度/指标名称,而非泛泛的"缺列"提示
    fn build_remediation(required_missing: &[&'static str]) -> String {
        let mut lines = vec![
            "报表缺少必填列,请在报表控制台 Reports → Create Report 中修正导出配置:".to_string(),
        ];

        let missing_dimensions: Vec<&str> = DIMENSION_FIXES
            .iter()
            .filter(|(canonical, _)| required_missing.contains(canonical))
            .map(|(_, label)| *label)
            .collect();

        if !missing_dimensions.is_empty() {
            lines.push("1. 在 DIMENSIONS 中添加:".to_string());
            for label in missing_dimensions {
                lines.push(format!("   • {}", label));
            }
        }

        let missing_metrics: Vec<&str> = METRIC_FIXES
            .iter()
            .filter(|(canonical, _)| required_missing.contains(canonical))
            .map(|(_, label)| *label)
            .collect();

        if !missing_metrics.is_empty() {
            lines.push("2. 在 METRICS 中添加:".to_string());
            for label in missing_metrics {
                lines.push(format!("   • {}", label));
            }
        }

        lines.push("3. 重新运行报表并下载 CSV 后再次导入".to_string());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_validate_complete_header() {
        let file = write_csv(
            "#Creative ID,#Day,#Billing ID,#Creative size,#Reached queries,#Impressions,#Clicks\n\
             144634,11/29/2025,abc123,300x250,50000,48000,750\n",
        );

        let report = FileValidator::validate(file.path()).unwrap();

        assert!(report.is_valid);
        assert!(report.required_missing.is_empty());
        assert!(report.remediation.is_none());
        assert_eq!(report.row_count_estimate, 1);
        // 未出现的可选字段只进提示列表
        assert!(report.optional_missing.contains(&"country"));
        assert!(!report.optional_missing.contains(&"clicks"));
    }

    #[test]
    fn test_validate_missing_billing_id() {
        let file = write_csv(
            "Day,Creative ID,Creative size,Reached queries,Impressions\n\
             11/29/2025,144634,300x250,50000,48000\n",
        );

        let report = FileValidator::validate(file.path()).unwrap();

        assert!(!report.is_valid);
        assert_eq!(report.required_missing, vec!["billing_id"]);

        let remediation = report.remediation.unwrap();
        assert!(remediation.contains("Billing ID"));
        assert!(remediation.contains("DIMENSIONS"));
    }

    #[test]
    fn test_validate_missing_metric_remediation() {
        let file = write_csv(
            "Day,Creative ID,Billing ID,Creative size,Impressions\n\
             11/29/2025,144634,abc,300x250,48000\n",
        );

        let report = FileValidator::validate(file.path()).unwrap();

        assert!(!report.is_valid);
        assert_eq!(report.required_missing, vec!["reached_queries"]);
        let remediation = report.remediation.unwrap();
        assert!(remediation.contains("METRICS"));
        assert!(remediation.contains("Reached queries"));
    }

    #[test]
    fn test_validate_file_not_found() {
        let result = FileValidator::validate(Path::new("no_such_report.csv"));
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }
}
