//! # 数据模型模块
//!
//! 定义统一的晶体结构、计算结果与点缺陷数据模型。
//!
//! ## 依赖关系
//! - 被 `corrections/`, `study/`, `stability/`, `concentrations/`, `geometry/` 使用
//! - 子模块: structure, calculation, defect

pub mod calculation;
pub mod defect;
pub mod structure;

pub use calculation::{BandOccupations, Cell, DensityOfStates, KpointBands};
pub use defect::{Defect, DefectKind};
pub use structure::{Atom, AtomLabel, Lattice};
