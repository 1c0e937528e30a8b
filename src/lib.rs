//! # Qudefect - 点缺陷热力学引擎
//!
//! 根据宿主晶胞与带电缺陷超胞的第一性原理计算结果，计算：
//! - 形成能随费米能级的变化及有限尺寸修正
//! - 电荷转变能级
//! - 多元化合物的化学势稳定区域
//! - 不同温度下自洽的平衡缺陷与载流子浓度
//! - 缺陷引入前后的结构变化
//!
//! 引擎不做文件解析与绘图，调用方提供已解析的 [`models::Cell`] 数据。
//!
//! ## 依赖关系
//! ```text
//! lib.rs
//!   ├── models/         (晶胞、原子标签、缺陷定义)
//!   ├── geometry/       (周期性工具、结构比较)
//!   ├── corrections/    (势对齐、能带填充、PHS、VBM、Makov–Payne)
//!   ├── study/          (电荷态、缺陷研究、材料研究)
//!   ├── stability/      (化学势稳定区域)
//!   ├── concentrations/ (平衡浓度、温度扫描)
//!   ├── utils/          (数值工具、诊断信息)
//!   └── error.rs        (错误处理)
//! ```

pub mod concentrations;
pub mod corrections;
pub mod error;
pub mod geometry;
pub mod models;
pub mod stability;
pub mod study;
pub mod utils;

pub use error::{DefectError, Result};
