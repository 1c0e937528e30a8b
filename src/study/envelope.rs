//! # 形成能下包络与转变能级
//!
//! 费米能级采样网格、下包络点与电荷转变能级的检测。转变能级通过在网格上采样
//! 得到，其误差上限为网格间距 `FermiGrid::resolution()`。
//!
//! ## 依赖关系
//! - 被 `study/defect_study.rs`, `study/material_study.rs` 使用
//! - 使用 `utils/numeric.rs` 的 linspace

use crate::error::{DefectError, Result};
use crate::utils::numeric::linspace;

use serde::{Deserialize, Serialize};

/// 费米能级采样网格 (eV)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FermiGrid {
    pub min: f64,
    pub max: f64,
    pub points: usize,
}

impl Default for FermiGrid {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            points: 1001,
        }
    }
}

impl FermiGrid {
    pub fn new(min: f64, max: f64, points: usize) -> Result<Self> {
        let grid = Self { min, max, points };
        grid.validate()?;
        Ok(grid)
    }

    /// 覆盖整个带隙 [0, gap] 的网格
    pub fn across_gap(gap: f64, points: usize) -> Result<Self> {
        Self::new(0.0, gap, points)
    }

    pub fn with_points(mut self, points: usize) -> Self {
        self.points = points;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite() && self.min < self.max) {
            return Err(DefectError::InvalidArgument(format!(
                "Fermi grid range [{}, {}] is empty",
                self.min, self.max
            )));
        }
        if self.points < 2 {
            return Err(DefectError::InvalidArgument(format!(
                "Fermi grid needs at least 2 points, got {}",
                self.points
            )));
        }
        Ok(())
    }

    /// 网格间距，也是转变能级费米能量的误差上限
    pub fn resolution(&self) -> f64 {
        (self.max - self.min) / (self.points.max(2) - 1) as f64
    }

    pub fn values(&self) -> Vec<f64> {
        linspace(self.min, self.max, self.points)
    }
}

/// 下包络上的一点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopePoint {
    /// 最低形成能 (eV)
    pub energy: f64,
    /// 对应的电荷态
    pub charge: i32,
}

/// 在一组 (电荷, 形成能) 中选取最低者，能量完全相同时取 |q| 较小的电荷态
pub fn lowest<I>(candidates: I) -> Option<EnvelopePoint>
where
    I: IntoIterator<Item = (i32, f64)>,
{
    candidates
        .into_iter()
        .fold(None, |best: Option<EnvelopePoint>, (charge, energy)| {
            match best {
                Some(b) if b.energy < energy => Some(b),
                Some(b) if b.energy == energy && b.charge.abs() <= charge.abs() => Some(b),
                _ => Some(EnvelopePoint { energy, charge }),
            }
        })
}

/// 电荷转变能级
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionLevel {
    /// 转变发生处的费米能级 (eV)，误差不超过 `resolution`
    pub fermi_energy: f64,
    /// 该处的形成能 (eV)
    pub formation_energy: f64,
    /// 转变后的电荷态（费米能级较高一侧）
    pub charge_new: i32,
    /// 转变前的电荷态
    pub charge_old: i32,
    /// 采样间距
    pub resolution: f64,
}

/// 从采样的下包络中找出电荷态变化的位置
pub fn detect_transitions(
    fermi: &[f64],
    envelope: &[EnvelopePoint],
    resolution: f64,
) -> Vec<TransitionLevel> {
    fermi
        .iter()
        .zip(envelope)
        .collect::<Vec<_>>()
        .windows(2)
        .filter(|w| w[0].1.charge != w[1].1.charge)
        .map(|w| TransitionLevel {
            fermi_energy: *w[1].0,
            formation_energy: w[1].1.energy,
            charge_new: w[1].1.charge,
            charge_old: w[0].1.charge,
            resolution,
        })
        .collect()
}

/// 形成能曲线：每个电荷态的曲线与下包络
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationCurves {
    pub fermi: Vec<f64>,
    /// (电荷, 形成能曲线)，按电荷升序
    pub states: Vec<(i32, Vec<f64>)>,
    pub envelope: Vec<EnvelopePoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_resolution() {
        let grid = FermiGrid::new(0.0, 2.0, 201).unwrap();
        assert!((grid.resolution() - 0.01).abs() < 1e-12);
        assert_eq!(grid.values().len(), 201);
        assert!(FermiGrid::new(1.0, 1.0, 10).is_err());
        assert!(FermiGrid::new(0.0, 1.0, 1).is_err());
    }

    #[test]
    fn test_lowest_tie_prefers_small_charge() {
        let p = lowest(vec![(2, 1.0), (0, 1.0), (-1, 1.0)]).unwrap();
        assert_eq!(p.charge, 0);
        let p = lowest(vec![(-2, 0.5), (1, 1.0)]).unwrap();
        assert_eq!(p.charge, -2);
        assert!(lowest(Vec::new()).is_none());
    }

    #[test]
    fn test_detect_transitions() {
        let fermi = [0.0, 0.5, 1.0, 1.5];
        let env = [
            EnvelopePoint { energy: 1.0, charge: 1 },
            EnvelopePoint { energy: 1.2, charge: 0 },
            EnvelopePoint { energy: 1.2, charge: 0 },
            EnvelopePoint { energy: 0.9, charge: -1 },
        ];
        let levels = detect_transitions(&fermi, &env, 0.5);
        assert_eq!(levels.len(), 2);
        assert_eq!((levels[0].charge_old, levels[0].charge_new), (1, 0));
        assert_eq!(levels[1].fermi_energy, 1.5);
    }
}
