//! # 化学势稳定性分析模块
//!
//! 根据宿主化合物与竞争相的总能量，求出宿主稳定存在的化学势区域。
//!
//! ## 子模块
//! - `constraint`: 单个竞争相的线性约束
//! - `domain`: 稳定区域求解（区间或多边形）
//! - `references`: FERE 元素参考能
//!
//! ## 依赖关系
//! - 使用 `models/calculation.rs` 的 Cell

pub mod constraint;
pub mod domain;
pub mod references;

pub use constraint::{coefficients, Constraint, Side, StabilityAxes};
pub use domain::{
    ChemicalPotentials, DegeneratePolicy, DomainReport, StabilityDomain, StabilitySettings,
};
pub use references::fere_energy;
