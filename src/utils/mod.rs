//! # 工具函数模块
//!
//! 提供诊断信息与数值工具（阶跃函数、网格、求根）。
//!
//! ## 依赖关系
//! - 被 `corrections/`, `study/`, `stability/`, `concentrations/` 使用
//! - 子模块: diagnostics, numeric

pub mod diagnostics;
pub mod numeric;

pub use diagnostics::Diagnostic;
