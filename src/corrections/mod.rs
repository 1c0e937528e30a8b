//! # 有限尺寸修正模块
//!
//! 带电超胞形成能的修正：势对齐、能带填充（Moss–Burstein）、PHS、VBM 与 Makov–Payne，
//! 以及修正所需的配置与能带边移动。
//!
//! ## 依赖关系
//! - 被 `study/` 模块使用
//! - 使用 `models/`, `geometry/`, `utils/`
//! - 子模块: alignment, band_filling, pipeline

pub mod alignment;
pub mod band_filling;
pub mod pipeline;

pub use alignment::{potential_alignment, AlignmentProfile, AtomPotentialShift};
pub use band_filling::{band_filling, BandFilling};
pub use pipeline::{CorrectionInputs, CorrectionReport, Corrections};

use crate::error::{DefectError, Result};
use crate::models::Cell;

use serde::{Deserialize, Serialize};

/// 宿主晶胞的几何类型（决定 Makov–Payne 形状因子）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrystalGeometry {
    Sc,
    Fcc,
    Bcc,
    Hcp,
    #[default]
    Other,
}

impl CrystalGeometry {
    /// 形状因子 c_sh
    pub fn shape_factor(self) -> f64 {
        match self {
            CrystalGeometry::Sc => -0.369,
            CrystalGeometry::Fcc => -0.343,
            CrystalGeometry::Bcc => -0.342,
            CrystalGeometry::Hcp => -0.478,
            CrystalGeometry::Other => -1.0 / 3.0,
        }
    }
}

/// 修正配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionSettings {
    pub potential_alignment: bool,
    pub moss_burstein: bool,
    pub phs: bool,
    pub vbm: bool,
    pub makov_payne: bool,
    pub geometry: CrystalGeometry,
    /// 相对介电常数 ε_r
    pub relative_permittivity: f64,
    /// q = 1、ε_r = 1 时 Makov–Payne 第一项的值 M₁ (eV)
    pub makov_payne_constant: f64,
}

impl Default for CorrectionSettings {
    fn default() -> Self {
        Self {
            potential_alignment: true,
            moss_burstein: true,
            phs: true,
            vbm: true,
            makov_payne: false,
            geometry: CrystalGeometry::Other,
            relative_permittivity: 1.0,
            makov_payne_constant: 0.0,
        }
    }
}

impl CorrectionSettings {
    /// 关闭全部修正
    pub fn none() -> Self {
        Self {
            potential_alignment: false,
            moss_burstein: false,
            phs: false,
            vbm: false,
            makov_payne: false,
            ..Self::default()
        }
    }

    pub fn with_potential_alignment(mut self, enabled: bool) -> Self {
        self.potential_alignment = enabled;
        self
    }

    pub fn with_moss_burstein(mut self, enabled: bool) -> Self {
        self.moss_burstein = enabled;
        self
    }

    pub fn with_phs(mut self, enabled: bool) -> Self {
        self.phs = enabled;
        self
    }

    pub fn with_vbm(mut self, enabled: bool) -> Self {
        self.vbm = enabled;
        self
    }

    /// 启用 Makov–Payne 修正并设置参数
    pub fn with_makov_payne(
        mut self,
        geometry: CrystalGeometry,
        relative_permittivity: f64,
        makov_payne_constant: f64,
    ) -> Self {
        self.makov_payne = true;
        self.geometry = geometry;
        self.relative_permittivity = relative_permittivity;
        self.makov_payne_constant = makov_payne_constant;
        self
    }

    /// 检查参数
    pub fn validate(&self) -> Result<()> {
        if self.makov_payne
            && !(self.relative_permittivity.is_finite() && self.relative_permittivity > 0.0)
        {
            return Err(DefectError::InvalidArgument(format!(
                "relative permittivity must be positive, got {}",
                self.relative_permittivity
            )));
        }
        if self.makov_payne && !self.makov_payne_constant.is_finite() {
            return Err(DefectError::InvalidArgument(
                "Makov-Payne constant must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// 是否需要能带边移动
    pub fn uses_band_edge_shifts(&self) -> bool {
        self.vbm || self.phs
    }
}

/// 能带边修正 ΔVBM、ΔCBM (eV)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandEdgeShifts {
    pub delta_vbm: f64,
    pub delta_cbm: f64,
}

impl BandEdgeShifts {
    /// 由另一泛函的宿主计算 `host_b` 与额外输入得到能带边移动
    ///
    /// VBM 与 PHS 修正都未启用时两者均为 0
    pub fn compute(
        host: &Cell,
        host_b: Option<&Cell>,
        delta_vbm_input: f64,
        delta_cbm_input: f64,
        settings: &CorrectionSettings,
    ) -> Result<Self> {
        if !settings.uses_band_edge_shifts() {
            return Ok(Self::default());
        }
        let (functional_vbm, functional_cbm) = match host_b {
            Some(b) => (
                b.require_vbm()? - host.require_vbm()?,
                b.require_cbm()? - host.require_cbm()?,
            ),
            None => (0.0, 0.0),
        };
        Ok(Self {
            delta_vbm: functional_vbm + delta_vbm_input,
            delta_cbm: functional_cbm + delta_cbm_input,
        })
    }

    /// 修正后的带隙
    pub fn corrected_gap(&self, host: &Cell) -> Result<f64> {
        Ok(host.gap()? - self.delta_vbm + self.delta_cbm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Lattice};

    fn host(vbm: f64, cbm: f64) -> Cell {
        Cell::new("host", Lattice::cubic(5.0), vec![Atom::new("Cd", [0.0; 3])])
            .with_band_edges(vbm, cbm)
    }

    #[test]
    fn test_shape_factors() {
        assert_eq!(CrystalGeometry::Hcp.shape_factor(), -0.478);
        assert!((CrystalGeometry::default().shape_factor() + 1.0 / 3.0).abs() < 1e-15);
    }

    #[test]
    fn test_band_edge_shifts_from_second_functional() {
        let pbe = host(1.0, 2.0);
        let hse = host(0.6, 2.8);
        let settings = CorrectionSettings::default();
        let shifts = BandEdgeShifts::compute(&pbe, Some(&hse), 0.1, 0.0, &settings).unwrap();
        assert!((shifts.delta_vbm - (-0.3)).abs() < 1e-12);
        assert!((shifts.delta_cbm - 0.8).abs() < 1e-12);
        assert!((shifts.corrected_gap(&pbe).unwrap() - 2.1).abs() < 1e-12);
    }

    #[test]
    fn test_band_edge_shifts_disabled() {
        let pbe = host(1.0, 2.0);
        let settings = CorrectionSettings::default().with_vbm(false).with_phs(false);
        let shifts = BandEdgeShifts::compute(&pbe, Some(&host(0.0, 5.0)), 0.5, 0.5, &settings)
            .unwrap();
        assert_eq!(shifts, BandEdgeShifts::default());
    }

    #[test]
    fn test_invalid_permittivity() {
        let settings = CorrectionSettings::default().with_makov_payne(CrystalGeometry::Sc, 0.0, 1.0);
        assert!(matches!(
            settings.validate(),
            Err(DefectError::InvalidArgument(_))
        ));
    }
}
