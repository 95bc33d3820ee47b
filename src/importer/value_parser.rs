// ==========================================
// RTB 绩效报表导入系统 - 取值解析器
// ==========================================
// 职责: 原始文本 → 类型化取值(日期/整数/金额/布尔)
// 约定: 纯函数,对畸形输入永不 panic/Err;
//       "无值"(None)与"值为零"(Some(0))必须可区分
// ==========================================

use chrono::NaiveDate;

/// 日期格式尝试顺序(首个能完整解析整串的格式获胜)
const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y", // 11/30/2025
    "%m/%d/%y", // 11/30/25
    "%Y-%m-%d", // 2025-11-30
    "%d/%m/%Y", // 30/11/2025
];

/// 解析日期,归一为 NaiveDate(落库时统一 ISO 格式)
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }

    None
}

/// 解析整数,容忍千分位分隔符与空白
pub fn parse_int(raw: &str) -> Option<i64> {
    let cleaned: String = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<i64>().ok()
}

/// 解析金额为整数微元(round(美元 × 1_000_000))
///
/// 容忍千分位分隔符与前置货币符号;用整数微元避免
/// 后续汇总时的浮点累积误差
pub fn parse_money_micros(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .replace(',', "")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        return None;
    }
    let dollars = cleaned.parse::<f64>().ok()?;
    Some((dollars * 1_000_000.0).round() as i64)
}

/// 解析布尔标志(大小写不敏感;空值与未知值一律 false,从不返回 None)
pub fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_uppercase().as_str(), "TRUE" | "1" | "YES")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_formats_equivalent() {
        let expected = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();
        assert_eq!(parse_date("11/30/2025"), Some(expected));
        assert_eq!(parse_date("11/30/25"), Some(expected));
        assert_eq!(parse_date("2025-11-30"), Some(expected));
        assert_eq!(parse_date("30/11/2025"), Some(expected));
    }

    #[test]
    fn test_parse_date_full_string_only() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("   "), None);
        assert_eq!(parse_date("not-a-date"), None);
        assert_eq!(parse_date("13/45/2025"), None); // 非法日历日期
        assert_eq!(parse_date("11/30/2025 extra"), None); // 禁止尾随内容
    }

    #[test]
    fn test_parse_date_day_month_fallback() {
        // 月份位超过 12 时退回 DD/MM/YYYY 解释
        assert_eq!(
            parse_date("30/11/2025"),
            Some(NaiveDate::from_ymd_opt(2025, 11, 30).unwrap())
        );
        // 两种解释都合法时,MM/DD/YYYY 优先
        assert_eq!(
            parse_date("01/02/2025"),
            Some(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap())
        );
    }

    #[test]
    fn test_parse_int_separators() {
        assert_eq!(parse_int("1,234,567"), Some(1_234_567));
        assert_eq!(parse_int("  48000 "), Some(48_000));
        assert_eq!(parse_int("0"), Some(0));
    }

    #[test]
    fn test_parse_int_empty_is_none_not_zero() {
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("  "), None);
        assert_eq!(parse_int("n/a"), None);
    }

    #[test]
    fn test_parse_money_equivalent_spellings() {
        assert_eq!(parse_money_micros("1,234.56"), Some(1_234_560_000));
        assert_eq!(parse_money_micros("$1,234.56"), Some(1_234_560_000));
        assert_eq!(parse_money_micros("1234.56"), Some(1_234_560_000));
    }

    #[test]
    fn test_parse_money_micros_rounding() {
        assert_eq!(parse_money_micros("187.50"), Some(187_500_000));
        assert_eq!(parse_money_micros("0.01"), Some(10_000)); // 四舍五入到微元
        assert_eq!(parse_money_micros(""), None);
        assert_eq!(parse_money_micros("$"), None);
    }

    #[test]
    fn test_parse_bool_membership() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(parse_bool("Yes"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("FALSE"));
        assert!(!parse_bool(""));
        assert!(!parse_bool("unknown"));
    }
}
