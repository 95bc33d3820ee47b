// ==========================================
// RTB 绩效报表导入系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口(不包含实现)
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入模块所需的配置读取接口
// 实现者: ConfigManager(从 config_kv 表读取)
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 批量写入配置 =====

    /// 获取批量写入的批大小
    ///
    /// # 默认值
    /// - 1000
    async fn get_batch_size(&self) -> Result<usize, Box<dyn Error>>;

    /// 获取进度日志的行间隔
    ///
    /// # 默认值
    /// - 50000
    ///
    /// # 用途
    /// - 大文件导入时按固定行数输出一次进度
    async fn get_progress_interval_rows(&self) -> Result<usize, Box<dyn Error>>;

    // ===== 行级容错配置 =====

    /// 获取跳过原因示例的保留上限
    ///
    /// # 默认值
    /// - 20
    ///
    /// # 用途
    /// - 行级跳过只保留前 N 条示例供展示,其余仅计数
    async fn get_max_skip_examples(&self) -> Result<usize, Box<dyn Error>>;

    // ===== 异常检测配置 =====

    /// 获取 CTR 异常阈值(点击/展示比)
    ///
    /// # 默认值
    /// - 0.5
    async fn get_ctr_threshold(&self) -> Result<f64, Box<dyn Error>>;

    /// 获取 CTR 异常判定的最小展示量门槛
    ///
    /// # 默认值
    /// - 100
    ///
    /// # 用途
    /// - 小样本免检,避免低展示量行的比例误报
    async fn get_ctr_min_impressions(&self) -> Result<i64, Box<dyn Error>>;

    // ===== 台账保留配置 =====

    /// 获取导入批次台账保留天数
    ///
    /// # 默认值
    /// - 90
    async fn get_batch_retention_days(&self) -> Result<i64, Box<dyn Error>>;
}
