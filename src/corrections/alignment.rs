//! # 势对齐修正
//!
//! 比较缺陷晶胞与宿主晶胞中每个原子处的平均静电势，只统计距离所有缺陷及其周期像
//! 都大于排除半径的原子，得到平均势差 ΔV。
//!
//! ## 依赖关系
//! - 被 `corrections/pipeline.rs` 使用
//! - 使用 `geometry/periodic.rs` 的周期像与距离
//! - 使用 `models/` 的 Cell 与 Defect

use crate::error::{DefectError, Result};
use crate::geometry::periodic::{image_positions, min_distance};
use crate::models::{Cell, Defect};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 单个原子的势差
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomPotentialShift {
    /// 缺陷晶胞中的原子标签
    pub label: String,
    /// 到最近缺陷（或其像）的距离 (Å)
    pub distance: f64,
    /// V_defect − V_host (eV)
    pub delta_v: f64,
}

/// 势对齐的逐原子数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentProfile {
    pub atoms: Vec<AtomPotentialShift>,
}

impl AlignmentProfile {
    /// 建立逐原子的势差与距离表
    ///
    /// 先去掉直接参与缺陷的原子（空位：宿主中被移除的原子；间隙：缺陷晶胞中新增的原子；
    /// 替位：两者），剩余原子按顺序一一配对。
    pub fn build(host: &Cell, defect_cell: &Cell, defects: &[Defect]) -> Result<Self> {
        let host_potentials = host.require_potentials()?;
        let defect_potentials = defect_cell.require_potentials()?;

        let mut removed_host = HashSet::new();
        let mut removed_defect = HashSet::new();
        let mut centers = Vec::new();
        for defect in defects {
            if let Some(label) = defect.removed_atom() {
                removed_host.insert(host.index_of(label)?);
            }
            if let Some(label) = defect.added_atom() {
                removed_defect.insert(defect_cell.index_of(label)?);
            }
            centers.extend(image_positions(
                &host.lattice,
                &defect.position(host, defect_cell)?,
            ));
        }

        let host_kept: Vec<usize> = (0..host.atoms.len())
            .filter(|i| !removed_host.contains(i))
            .collect();
        let defect_kept: Vec<usize> = (0..defect_cell.atoms.len())
            .filter(|i| !removed_defect.contains(i))
            .collect();

        if host_kept.len() != defect_kept.len() {
            return Err(DefectError::InvalidDefectSpecification(format!(
                "after removing defect atoms '{}' has {} atoms but '{}' has {}",
                host.name,
                host_kept.len(),
                defect_cell.name,
                defect_kept.len()
            )));
        }

        let positions = defect_cell.cartesian_positions();
        let atoms = host_kept
            .iter()
            .zip(&defect_kept)
            .map(|(&h, &d)| AtomPotentialShift {
                label: defect_cell
                    .label_of(d)
                    .map(|l| l.to_string())
                    .unwrap_or_default(),
                distance: min_distance(&positions[d], &centers),
                delta_v: defect_potentials[d] - host_potentials[h],
            })
            .collect();

        Ok(AlignmentProfile { atoms })
    }

    /// 距离大于 `radius` 的原子的平均势差
    pub fn mean_beyond(&self, radius: f64) -> Result<f64> {
        let outside: Vec<f64> = self
            .atoms
            .iter()
            .filter(|a| a.distance > radius)
            .map(|a| a.delta_v)
            .collect();

        if outside.is_empty() {
            return Err(DefectError::NoAtomsBeyondRadius { radius });
        }
        Ok(outside.iter().sum::<f64>() / outside.len() as f64)
    }

    /// ΔV 随排除半径的变化，半径取每个原子的距离（升序）
    ///
    /// 最远的原子之外没有原子，因此不包含该点
    pub fn radius_scan(&self) -> Vec<(f64, f64)> {
        let mut radii: Vec<f64> = self.atoms.iter().map(|a| a.distance).collect();
        radii.sort_by(|a, b| a.total_cmp(b));
        radii.dedup();
        radii
            .into_iter()
            .filter_map(|r| self.mean_beyond(r).ok().map(|v| (r, v)))
            .collect()
    }
}

/// 势对齐 ΔV (eV)
pub fn potential_alignment(
    host: &Cell,
    defect_cell: &Cell,
    defects: &[Defect],
    radius: f64,
) -> Result<f64> {
    AlignmentProfile::build(host, defect_cell, defects)?.mean_beyond(radius)
}
