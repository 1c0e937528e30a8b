//! # 平衡浓度模块
//!
//! 载流子态密度模型、电中性自洽求解以及并行温度扫描。
//!
//! ## 依赖关系
//! - 使用 `study/` 的 MaterialStudy
//! - 子模块: dos, solver, sweep

pub mod dos;
pub mod solver;
pub mod sweep;

pub use dos::{CarrierBands, DosModel};
pub use solver::{ConcentrationsCalculation, EquilibriumState, SolverSettings};
pub use sweep::{SweepAxis, SweepPoint, SweepRange, TemperatureSweep};
