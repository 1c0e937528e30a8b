//! # 晶体结构数据模型
//!
//! 定义晶格、原子以及原子标签（如 `Cd (3)`）的统一表示。
//!
//! ## 依赖关系
//! - 被 `models/calculation.rs`, `models/defect.rs` 使用
//! - 被 `corrections/` 与 `geometry/` 使用
//! - 使用 `geometry/periodic.rs` 的向量运算

use crate::error::{DefectError, Result};
use crate::geometry::periodic::{cross, dot, frac_to_cart};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Å³ 到 m³ 的换算系数
pub const ANGSTROM3_TO_M3: f64 = 1e-30;

/// 晶格参数表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c（Å）
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    /// 从晶格参数 (a, b, c, alpha, beta, gamma) 创建晶格
    /// 角度单位：度
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let cos_gamma = gamma.to_radians().cos();
        let sin_gamma = gamma.to_radians().sin();

        let a_vec = [a, 0.0, 0.0];
        let b_vec = [b * cos_gamma, b * sin_gamma, 0.0];

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3 = (c * c - c1 * c1 - c2 * c2).sqrt();

        Lattice {
            matrix: [a_vec, b_vec, [c1, c2, c3]],
        }
    }

    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 立方晶格
    pub fn cubic(a: f64) -> Self {
        Self::from_vectors([[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]])
    }

    /// 计算晶格体积（Å³，带符号）
    pub fn volume(&self) -> f64 {
        let [a, b, c] = self.matrix;
        dot(&a, &cross(&b, &c))
    }

    /// 晶格体积（m³）
    pub fn volume_m3(&self) -> f64 {
        self.volume().abs() * ANGSTROM3_TO_M3
    }

    /// 分数坐标转笛卡尔坐标
    pub fn to_cartesian(&self, frac: &[f64; 3]) -> [f64; 3] {
        frac_to_cart(frac, &self.matrix)
    }

    /// 笛卡尔坐标转分数坐标
    ///
    /// 退化晶格（体积为零）返回 `None`
    pub fn to_fractional(&self, cart: &[f64; 3]) -> Option<[f64; 3]> {
        let [a, b, c] = self.matrix;
        let volume = self.volume();
        if volume.abs() < 1e-10 {
            return None;
        }
        // 倒格矢（不含 2π）：r_frac_i = (b_i · r)
        let b1 = cross(&b, &c);
        let b2 = cross(&c, &a);
        let b3 = cross(&a, &b);
        Some([
            dot(&b1, cart) / volume,
            dot(&b2, cart) / volume,
            dot(&b3, cart) / volume,
        ])
    }

    /// 两个晶格矩阵分量差的最大值（Å）
    pub fn max_difference(&self, other: &Lattice) -> f64 {
        self.matrix
            .iter()
            .zip(other.matrix.iter())
            .flat_map(|(r1, r2)| r1.iter().zip(r2.iter()).map(|(x, y)| (x - y).abs()))
            .fold(0.0, f64::max)
    }
}

/// 原子信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// 元素符号
    pub element: String,

    /// 分数坐标 [x, y, z]
    pub position: [f64; 3],
}

impl Atom {
    pub fn new(element: impl Into<String>, position: [f64; 3]) -> Self {
        Atom {
            element: element.into(),
            position,
        }
    }
}

static LABEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Z][a-z]{0,2})\s*\(?\s*([0-9]+)\s*\)?\s*$").expect("valid atom label regex")
});

/// 原子标签：元素 + 同种元素内的序号（从 1 开始）
///
/// 接受 `Cd (3)`、`Cd(3)`、`Cd3` 三种写法
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AtomLabel {
    pub species: String,
    pub index: usize,
}

impl AtomLabel {
    pub fn new(species: impl Into<String>, index: usize) -> Self {
        AtomLabel {
            species: species.into(),
            index,
        }
    }

    /// 解析原子标签
    pub fn parse(text: &str) -> Result<Self> {
        let caps = LABEL_PATTERN.captures(text).ok_or_else(|| {
            DefectError::InvalidDefectSpecification(format!(
                "malformed atom label '{}', expected e.g. 'Cd (3)'",
                text
            ))
        })?;

        let index: usize = caps[2].parse().map_err(|_| {
            DefectError::InvalidDefectSpecification(format!("invalid atom index in '{}'", text))
        })?;
        if index == 0 {
            return Err(DefectError::InvalidDefectSpecification(format!(
                "atom indices start at 1, got '{}'",
                text
            )));
        }

        Ok(AtomLabel::new(&caps[1], index))
    }

    /// 紧凑写法（用于标识符），如 `Cd(3)`
    pub fn compact(&self) -> String {
        format!("{}({})", self.species, self.index)
    }
}

impl fmt::Display for AtomLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.species, self.index)
    }
}
