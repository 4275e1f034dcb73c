// ==========================================
// 评审分配引擎 - 领域校验错误
// ==========================================
// 工具: thiserror 派生宏
// 红线: 校验失败在求解前即终止，运行不会进入 Running
// ==========================================

use thiserror::Error;

/// 配置与约束模型的校验错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    // ===== 分组错误 =====
    #[error("匹配组为空: {0}")]
    EmptyMatchGroup(String),

    #[error("备选组为空: {0}")]
    EmptyAlternateGroup(String),

    #[error("未找到投稿: {0}")]
    NoPapers(String),

    // ===== 字段错误 =====
    #[error("字段值错误 (field={field}): {message}")]
    InvalidField { field: String, message: String },

    #[error("容量区间错误: min_papers={min} > max_papers={max}")]
    CapacityBounds { min: u32, max: u32 },

    #[error("权重非法 ({kind}, head={head}, tail={tail}): {weight}")]
    InvalidWeight {
        kind: String,
        head: String,
        tail: String,
        weight: f64,
    },
}

impl ValidationError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
