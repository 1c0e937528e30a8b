//! # 几何模块
//!
//! 周期性边界下的向量与近邻运算，以及缺陷引入前后的结构比较。
//!
//! ## 依赖关系
//! - 被 `models/structure.rs`, `corrections/alignment.rs` 使用
//! - 子模块: periodic, comparison

pub mod comparison;
pub mod periodic;

pub use comparison::{
    BondVariation, ComparisonSettings, Displacement, GeometryComparator, GeometryComparison,
};
