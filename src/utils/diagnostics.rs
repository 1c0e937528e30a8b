//! # 诊断信息
//!
//! 引擎在采用兼容性回退（例如缺少能带数据时把修正置零、丢弃退化的竞争相约束）
//! 或发现输入不一致时产生的非致命诊断。每条诊断都会通过 `tracing::warn!` 记录，
//! 同时随计算结果一起返回给调用方。
//!
//! ## 依赖关系
//! - 被 `corrections/`, `stability/`, `geometry/comparison.rs` 使用

use serde::{Deserialize, Serialize};
use std::fmt;

/// 非致命诊断
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// 启用了能带填充修正但缺陷晶胞没有能带占据数据，能带填充与 PHS 修正均置零
    BandDataMissing { cell: String },

    /// 竞争相约束的两个系数均为零，约束被丢弃
    FrontierDegenerate { phase: String },

    /// 宿主与缺陷晶胞的晶格参数不一致
    LatticeMismatch {
        host: String,
        defect: String,
        max_difference: f64,
    },

    /// 宿主晶胞中的原子在缺陷晶胞中找不到对应原子
    MissingCorrespondence { atom: String },
}

impl Diagnostic {
    /// 记录诊断并返回自身
    pub fn emit(self) -> Self {
        tracing::warn!("{}", self);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::BandDataMissing { cell } => write!(
                f,
                "Cell '{}' has no band occupations: band-filling and PHS corrections set to 0",
                cell
            ),
            Diagnostic::FrontierDegenerate { phase } => write!(
                f,
                "Constraint of phase '{}' has only zero coefficients and was dropped",
                phase
            ),
            Diagnostic::LatticeMismatch {
                host,
                defect,
                max_difference,
            } => write!(
                f,
                "Lattices of '{}' and '{}' differ by up to {:.4} Å",
                host, defect, max_difference
            ),
            Diagnostic::MissingCorrespondence { atom } => write!(
                f,
                "Atom {} has no corresponding atom in the defect cell",
                atom
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_emit() {
        let d = Diagnostic::BandDataMissing {
            cell: "V_Cd q=-1".to_string(),
        }
        .emit();
        assert!(d.to_string().contains("V_Cd q=-1"));
    }
}
