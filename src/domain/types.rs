// ==========================================
// RTB 绩效报表导入系统 - 基础类型定义
// ==========================================
// 职责: 定义导入流程状态机与批次状态枚举
// 红线: 仅类型定义,不含业务逻辑
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// ImportPhase - 单次导入调用的状态机
// ==========================================
// 流转: Pending → Validating → {Rejected | Importing} → {Complete | Failed}
// 约束: Rejected 仅由必填列缺失触发;行级问题不改变文件级状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportPhase {
    Pending,    // 尚未开始
    Validating, // 表头校验中(不触碰数据行)
    Rejected,   // 必填列缺失,整文件拒绝(不产生台账记录)
    Importing,  // 逐行流式导入中
    Complete,   // 导入完成(允许存在行级跳过/异常标记)
    Failed,     // 导入中途致命失败(已提交批次保持生效)
}

impl ImportPhase {
    /// 判断是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportPhase::Rejected | ImportPhase::Complete | ImportPhase::Failed
        )
    }
}

// ==========================================
// ImportStatus - 台账记录的最终状态
// ==========================================
// 对齐: import_history.status 列('complete' / 'failed')
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportStatus {
    Complete,
    Failed,
}

impl ImportStatus {
    /// 数据库存储格式(全小写)
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Complete => "complete",
            ImportStatus::Failed => "failed",
        }
    }

    /// 从数据库字符串解析(未知值按 failed 处理)
    pub fn from_str(raw: &str) -> Self {
        match raw.trim() {
            "complete" => ImportStatus::Complete,
            _ => ImportStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_terminal() {
        assert!(!ImportPhase::Pending.is_terminal());
        assert!(!ImportPhase::Validating.is_terminal());
        assert!(!ImportPhase::Importing.is_terminal());
        assert!(ImportPhase::Rejected.is_terminal());
        assert!(ImportPhase::Complete.is_terminal());
        assert!(ImportPhase::Failed.is_terminal());
    }

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(ImportStatus::from_str("complete"), ImportStatus::Complete);
        assert_eq!(ImportStatus::from_str("failed"), ImportStatus::Failed);
        assert_eq!(ImportStatus::from_str("garbage"), ImportStatus::Failed);
        assert_eq!(ImportStatus::Complete.as_str(), "complete");
    }
}
