//! # 统一错误处理模块
//!
//! 定义缺陷热力学引擎的所有错误类型，使用 `thiserror` 派生。
//! 所有错误只作用于单次分析请求，不会导致进程退出。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// 引擎统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefectError {
    // ─────────────────────────────────────────────────────────────
    // 输入数据错误
    // ─────────────────────────────────────────────────────────────
    #[error("Cell '{cell}' does not provide required data: {field}")]
    DataUnavailable { cell: String, field: String },

    #[error("Invalid defect specification: {0}")]
    InvalidDefectSpecification(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ─────────────────────────────────────────────────────────────
    // 修正计算错误
    // ─────────────────────────────────────────────────────────────
    #[error("No atom lies farther than {radius:.3} Å from every defect image")]
    NoAtomsBeyondRadius { radius: f64 },

    // ─────────────────────────────────────────────────────────────
    // 化学势稳定区域错误
    // ─────────────────────────────────────────────────────────────
    #[error("Empty stability domain for '{host}': {reason}")]
    EmptyStabilityDomain { host: String, reason: String },

    #[error("Degenerate frontier for competing phase '{phase}': both inequality coefficients are zero")]
    FrontierDegenerate { phase: String },

    #[error("Phase '{phase}' contains species '{species}' which is neither in the host nor fixed")]
    InconsistentComposition { phase: String, species: String },

    // ─────────────────────────────────────────────────────────────
    // 平衡浓度求解错误
    // ─────────────────────────────────────────────────────────────
    #[error("Unable to find a root of the charge neutrality equation at {temperature} K: {reason}")]
    NoEquilibriumRoot { temperature: f64, reason: String },

    #[error("Equilibrium solve at {temperature} K exceeded its deadline of {deadline_ms} ms")]
    DeadlineExceeded { temperature: f64, deadline_ms: u128 },

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),
}

impl DefectError {
    /// 构造缺失数据错误
    pub fn missing(cell: impl Into<String>, field: impl Into<String>) -> Self {
        DefectError::DataUnavailable {
            cell: cell.into(),
            field: field.into(),
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, DefectError>;
