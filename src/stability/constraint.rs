//! # 竞争相线性约束
//!
//! 宿主化合物的生成方程消去一个因变量元素后，每个竞争相给出一条半平面约束
//! a_X·μ_X + a_Y·μ_Y ≤ C。本模块计算系数并判定禁止区所在的一侧。
//!
//! ## 依赖关系
//! - 被 `stability/domain.rs` 使用
//! - 使用 `models/calculation.rs` 的 Cell

use crate::error::{DefectError, Result};
use crate::models::Cell;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 化学势坐标轴
///
/// 二元宿主只有一个自由变量 `y`，此时 `x` 为 `None`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityAxes {
    pub x: Option<String>,
    pub y: String,
    /// 由宿主生成方程确定的元素
    pub dependent: String,
}

impl StabilityAxes {
    pub fn planar(x: impl Into<String>, y: impl Into<String>, dependent: impl Into<String>) -> Self {
        Self {
            x: Some(x.into()),
            y: y.into(),
            dependent: dependent.into(),
        }
    }

    pub fn binary(y: impl Into<String>, dependent: impl Into<String>) -> Self {
        Self {
            x: None,
            y: y.into(),
            dependent: dependent.into(),
        }
    }

    /// 按宿主元素出现顺序选择默认坐标轴
    pub fn default_for(host: &Cell) -> Result<Self> {
        let species = host.species();
        match species.as_slice() {
            [y, dependent] => Ok(Self::binary(y, dependent)),
            [x, y, dependent, ..] => Ok(Self::planar(x, y, dependent)),
            _ => Err(DefectError::InvalidArgument(format!(
                "host '{}' needs at least two species for a stability domain",
                host.name
            ))),
        }
    }

    /// 坐标轴是否属于宿主且互不相同
    pub fn validate(&self, host: &Cell) -> Result<()> {
        let mut names: Vec<&str> = vec![self.y.as_str(), self.dependent.as_str()];
        names.extend(self.x.as_deref());
        for name in &names {
            if host.count_of(name) == 0 {
                return Err(DefectError::InvalidArgument(format!(
                    "axis species '{}' is not part of host '{}'",
                    name, host.name
                )));
            }
        }
        let mut unique = names.clone();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() != names.len() {
            return Err(DefectError::InvalidArgument(
                "stability axes must name distinct species".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_binary(&self) -> bool {
        self.x.is_none()
    }
}

/// 约束的禁止区位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// μ_Y ≤ f(μ_X)，禁止区在上方
    Above,
    /// μ_Y ≥ f(μ_X)，禁止区在下方
    Below,
    /// μ_X ≤ 常数，禁止区在右侧
    Right,
    /// μ_X ≥ 常数，禁止区在左侧
    Left,
}

/// 一个竞争相的约束 a_X·μ_X + a_Y·μ_Y ≤ C
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub phase: String,
    pub a_x: f64,
    pub a_y: f64,
    pub c: f64,
    pub side: Side,
}

impl Constraint {
    /// 由系数构造；两个系数均为零时返回 `None`
    pub fn classify(phase: impl Into<String>, a_x: f64, a_y: f64, c: f64) -> Option<Self> {
        let side = if a_y > 0.0 {
            Side::Above
        } else if a_y < 0.0 {
            Side::Below
        } else if a_x > 0.0 {
            Side::Right
        } else if a_x < 0.0 {
            Side::Left
        } else {
            return None;
        };
        Some(Self {
            phase: phase.into(),
            a_x,
            a_y,
            c,
            side,
        })
    }

    pub fn is_vertical(&self) -> bool {
        matches!(self.side, Side::Left | Side::Right)
    }

    /// 边界线上 μ_X = x 处的 μ_Y（竖直线返回 `None`）
    pub fn frontier(&self, x: f64) -> Option<f64> {
        if self.is_vertical() {
            None
        } else {
            Some((self.c - self.a_x * x) / self.a_y)
        }
    }

    /// 竖直边界的 μ_X
    pub fn vertical_position(&self) -> Option<f64> {
        if self.is_vertical() {
            Some(self.c / self.a_x)
        } else {
            None
        }
    }

    /// 点 (x, y) 是否在允许区内（容差 `tolerance`, eV）
    pub fn admits(&self, x: f64, y: f64, tolerance: f64) -> bool {
        match self.side {
            Side::Above => y <= (self.c - self.a_x * x) / self.a_y + tolerance,
            Side::Below => y >= (self.c - self.a_x * x) / self.a_y - tolerance,
            Side::Right => x <= self.c / self.a_x + tolerance,
            Side::Left => x >= self.c / self.a_x - tolerance,
        }
    }

    /// 不等式文本，如 `mu_In <= -1.2 - 0.5mu_Cd (competition with In2S3)`
    pub fn inequality(&self, axes: &StabilityAxes) -> String {
        let x_axis = axes.x.as_deref().unwrap_or("");
        let body = match self.side {
            Side::Above | Side::Below => {
                let op = if self.side == Side::Above { "<=" } else { ">=" };
                let mut text = format!("mu_{} {} {}", axes.y, op, format_number(self.c / self.a_y));
                if self.a_x != 0.0 {
                    text.push_str(&format_term(-self.a_x / self.a_y, x_axis));
                }
                text
            }
            Side::Right | Side::Left => {
                let op = if self.side == Side::Right { "<=" } else { ">=" };
                format!("mu_{} {} {}", x_axis, op, format_number(self.c / self.a_x))
            }
        };
        format!("{} (competition with {})", body, self.phase)
    }
}

/// 保留三位小数
pub(crate) fn format_number(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{}", rounded)
    }
}

/// 带符号的线性项，如 ` - 0.5mu_Cd`
pub(crate) fn format_term(coefficient: f64, species: &str) -> String {
    let sign = if coefficient < 0.0 { '-' } else { '+' };
    format!(" {} {}mu_{}", sign, format_number(coefficient.abs()), species)
}

/// 一个晶胞的能量项：Δ 模式下为生成焓 E − Σ n_i·μ⁰_i
pub(crate) fn reduced_energy(cell: &Cell, references: Option<&BTreeMap<String, f64>>) -> Result<f64> {
    let energy = cell.require_energy()?;
    let Some(references) = references else {
        return Ok(energy);
    };
    let mut shift = 0.0;
    for (species, count) in cell.population() {
        let mu0 = references.get(&species).ok_or_else(|| {
            DefectError::missing(&cell.name, format!("elemental reference for {}", species))
        })?;
        shift += count as f64 * mu0;
    }
    Ok(energy - shift)
}

/// 化学势固定的元素对能量的贡献 Σ n_F·μ_F
///
/// 既不是坐标轴元素也没有固定化学势的元素会返回 `InconsistentComposition`
pub(crate) fn fixed_sum(cell: &Cell, axes: &StabilityAxes, fixed: &BTreeMap<String, f64>) -> Result<f64> {
    let mut sum = 0.0;
    for (species, count) in cell.population() {
        let on_axis = axes.x.as_deref() == Some(species.as_str())
            || axes.y == species
            || axes.dependent == species;
        if on_axis {
            continue;
        }
        let mu = fixed
            .get(&species)
            .ok_or_else(|| DefectError::InconsistentComposition {
                phase: cell.name.clone(),
                species: species.clone(),
            })?;
        sum += count as f64 * mu;
    }
    Ok(sum)
}

/// 计算竞争相 `phase` 相对宿主 `host` 的约束系数 (a_X, a_Y, C)
///
/// a_X = n_X(P)·n_c(H) − n_X(H)·n_c(P)
/// a_Y = n_Y(P)·n_c(H) − n_Y(H)·n_c(P)
/// C   = n_c(H)·(E_P − S_P) − n_c(P)·(E_H − S_H)
pub fn coefficients(
    host: &Cell,
    phase: &Cell,
    axes: &StabilityAxes,
    fixed: &BTreeMap<String, f64>,
    references: Option<&BTreeMap<String, f64>>,
) -> Result<(f64, f64, f64)> {
    let count = |cell: &Cell, species: Option<&str>| -> f64 {
        species.map(|s| cell.count_of(s) as f64).unwrap_or(0.0)
    };

    let nc_h = count(host, Some(axes.dependent.as_str()));
    let nc_p = count(phase, Some(axes.dependent.as_str()));
    let a_x = count(phase, axes.x.as_deref()) * nc_h - count(host, axes.x.as_deref()) * nc_p;
    let a_y = count(phase, Some(axes.y.as_str())) * nc_h - count(host, Some(axes.y.as_str())) * nc_p;

    let e_h = reduced_energy(host, references)? - fixed_sum(host, axes, fixed)?;
    let e_p = reduced_energy(phase, references)? - fixed_sum(phase, axes, fixed)?;
    let c = nc_h * e_p - nc_p * e_h;

    Ok((a_x, a_y, c))
}
