// ==========================================
// RTB 绩效报表导入系统 - 字段映射器
// ==========================================
// 职责: 字面表头 → 规范字段名的静态别名表与解析
// 约定: 每文件解析一次生成 ColumnMap,行处理阶段只做下标查找
// ==========================================

use std::collections::HashMap;

// ==========================================
// FieldAlias - 规范字段的别名表项
// ==========================================
// 匹配规则: 与字面表头做精确字符串比较(含导出端可能前置的 '#' 标记),
//          别名列表中首个在表头中出现者获胜
pub struct FieldAlias {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
}

// ===== 必填字段(任一缺失则整文件拒绝) =====
pub const REQUIRED_FIELDS: &[FieldAlias] = &[
    FieldAlias { canonical: "day", aliases: &["#Day", "Day", "#Date", "Date"] },
    FieldAlias { canonical: "creative_id", aliases: &["Creative ID", "#Creative ID"] },
    FieldAlias { canonical: "billing_id", aliases: &["Billing ID", "#Billing ID"] },
    FieldAlias { canonical: "creative_size", aliases: &["Creative size", "#Creative size"] },
    FieldAlias { canonical: "reached_queries", aliases: &["Reached queries", "#Reached queries"] },
    FieldAlias { canonical: "impressions", aliases: &["Impressions", "#Impressions"] },
];

// ===== 可选字段(缺失仅提示,不阻断) =====
pub const OPTIONAL_FIELDS: &[FieldAlias] = &[
    FieldAlias { canonical: "creative_format", aliases: &["Creative format", "#Creative format"] },
    FieldAlias { canonical: "country", aliases: &["Country", "#Country"] },
    FieldAlias { canonical: "platform", aliases: &["Platform", "#Platform"] },
    FieldAlias { canonical: "environment", aliases: &["Environment", "#Environment"] },
    FieldAlias { canonical: "app_id", aliases: &["Mobile app ID", "#Mobile app ID"] },
    FieldAlias { canonical: "app_name", aliases: &["Mobile app name", "#Mobile app name"] },
    FieldAlias { canonical: "publisher_id", aliases: &["Publisher ID", "#Publisher ID"] },
    FieldAlias { canonical: "publisher_name", aliases: &["Publisher name", "#Publisher name"] },
    FieldAlias { canonical: "publisher_domain", aliases: &["Publisher domain", "#Publisher domain"] },
    FieldAlias { canonical: "deal_id", aliases: &["Deal ID", "#Deal ID"] },
    FieldAlias { canonical: "deal_name", aliases: &["Deal name", "#Deal name"] },
    FieldAlias { canonical: "transaction_type", aliases: &["Transaction type", "#Transaction type"] },
    FieldAlias { canonical: "advertiser", aliases: &["Advertiser", "#Advertiser"] },
    FieldAlias { canonical: "buyer_account_id", aliases: &["Buyer account ID", "#Buyer account ID"] },
    FieldAlias { canonical: "buyer_account_name", aliases: &["Buyer account name", "#Buyer account name"] },
    FieldAlias { canonical: "clicks", aliases: &["Clicks", "#Clicks"] },
    FieldAlias {
        canonical: "spend",
        aliases: &[
            "Spend (bidder currency)",
            "Spend _buyer currency_",
            "Spend (buyer currency)",
            "#Spend",
        ],
    },
    FieldAlias { canonical: "video_starts", aliases: &["Video starts", "#Video starts"] },
    FieldAlias { canonical: "video_first_quartile", aliases: &["Video reached first quartile"] },
    FieldAlias { canonical: "video_midpoint", aliases: &["Video reached midpoint"] },
    FieldAlias { canonical: "video_third_quartile", aliases: &["Video reached third quartile"] },
    FieldAlias { canonical: "video_completions", aliases: &["Video completions", "#Video completions"] },
    FieldAlias { canonical: "vast_errors", aliases: &["VAST error count", "#VAST error count"] },
    FieldAlias { canonical: "engaged_views", aliases: &["Engaged views"] },
    FieldAlias { canonical: "active_view_measurable", aliases: &["Active view measurable"] },
    FieldAlias { canonical: "active_view_viewable", aliases: &["Active view viewable"] },
    FieldAlias { canonical: "gma_sdk", aliases: &["GMA SDK"] },
    FieldAlias { canonical: "buyer_sdk", aliases: &["Buyer SDK"] },
];

// ==========================================
// ColumnMap - 单文件的字段解析结果
// ==========================================
// 生命周期: 文件级校验时构建一次,导入全程只读
pub struct ColumnMap {
    index: HashMap<&'static str, usize>,      // 规范字段名 → 表头列下标
    literal: HashMap<&'static str, String>,   // 规范字段名 → 命中的字面表头
    pub required_missing: Vec<&'static str>,  // 未命中的必填字段
    pub optional_missing: Vec<&'static str>,  // 未命中的可选字段
}

impl ColumnMap {
    /// 按静态别名表解析表头
    pub fn resolve(header: &[String]) -> Self {
        let position: HashMap<&str, usize> = header
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim(), idx))
            .collect();

        let mut index = HashMap::new();
        let mut literal = HashMap::new();
        let mut required_missing = Vec::new();
        let mut optional_missing = Vec::new();

        for field in REQUIRED_FIELDS {
            match Self::find_alias(field, &position) {
                Some((alias, idx)) => {
                    index.insert(field.canonical, idx);
                    literal.insert(field.canonical, alias.to_string());
                }
                None => required_missing.push(field.canonical),
            }
        }

        for field in OPTIONAL_FIELDS {
            match Self::find_alias(field, &position) {
                Some((alias, idx)) => {
                    index.insert(field.canonical, idx);
                    literal.insert(field.canonical, alias.to_string());
                }
                None => optional_missing.push(field.canonical),
            }
        }

        Self {
            index,
            literal,
            required_missing,
            optional_missing,
        }
    }

    fn find_alias<'a>(
        field: &'a FieldAlias,
        position: &HashMap<&str, usize>,
    ) -> Option<(&'a str, usize)> {
        for alias in field.aliases.iter().copied() {
            if let Some(idx) = position.get(alias) {
                return Some((alias, *idx));
            }
        }
        None
    }

    /// 必填字段是否全部命中
    pub fn is_valid(&self) -> bool {
        self.required_missing.is_empty()
    }

    /// 字段是否命中表头
    pub fn contains(&self, canonical: &str) -> bool {
        self.index.contains_key(canonical)
    }

    /// 取行记录中该字段的值(去首尾空白,空串视为缺失)
    pub fn get<'a>(&self, record: &'a csv::StringRecord, canonical: &str) -> Option<&'a str> {
        let idx = self.index.get(canonical)?;
        let value = record.get(*idx)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// 规范字段名 → 命中字面表头的快照(供校验结果返回)
    pub fn mapped_literals(&self) -> HashMap<&'static str, String> {
        self.literal.clone()
    }
}
