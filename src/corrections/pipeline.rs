//! # 修正流水线
//!
//! 对单个带电缺陷晶胞计算全部有限尺寸修正：势对齐、能带填充、PHS、VBM 与 Makov–Payne。
//! 每一项都可以单独重算，供 `study/charge_state.rs` 在修改半径或 PHS 载流子数时使用。
//!
//! ## 依赖关系
//! - 被 `study/charge_state.rs` 与 `study/defect_study.rs` 使用
//! - 使用 `corrections/alignment.rs`, `corrections/band_filling.rs`
//! - 使用 `utils/diagnostics.rs` 报告兼容性回退

use super::alignment::potential_alignment;
use super::band_filling::{band_filling, BandFilling};
use super::{BandEdgeShifts, CorrectionSettings};
use crate::error::Result;
use crate::models::{Cell, Defect};
use crate::utils::Diagnostic;

use serde::{Deserialize, Serialize};

/// 晶格参数一致性容差 (Å)
pub const LATTICE_TOLERANCE: f64 = 1e-3;

/// 单个电荷态的修正输入
#[derive(Debug, Clone, Copy)]
pub struct CorrectionInputs<'a> {
    pub host: &'a Cell,
    pub defect_cell: &'a Cell,
    pub defects: &'a [Defect],
    /// 势对齐的排除半径 (Å)
    pub radius: f64,
    /// PHS 中的电子数
    pub z_e: f64,
    /// PHS 中的空穴数
    pub z_h: f64,
    pub shifts: BandEdgeShifts,
    pub settings: &'a CorrectionSettings,
}

impl CorrectionInputs<'_> {
    /// 缺陷电荷，取自缺陷晶胞
    pub fn charge(&self) -> f64 {
        self.defect_cell.charge as f64
    }
}

/// 各项修正 (eV)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Corrections {
    /// 平均势差 ΔV（未乘电荷）
    pub delta_v: f64,
    /// q·ΔV
    pub potential_alignment: f64,
    pub band_filling: BandFilling,
    /// −z_h·ΔVBM
    pub phs_holes: f64,
    /// z_e·ΔCBM
    pub phs_electrons: f64,
    /// q·ΔVBM
    pub vbm: f64,
    pub makov_payne: f64,
}

impl Corrections {
    pub fn total(&self) -> f64 {
        self.potential_alignment
            + self.band_filling.total()
            + self.phs_holes
            + self.phs_electrons
            + self.vbm
            + self.makov_payne
    }
}

/// 修正结果与诊断
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub corrections: Corrections,
    pub diagnostics: Vec<Diagnostic>,
}

/// 势对齐：返回 (ΔV, q·ΔV)
pub fn alignment_terms(inputs: &CorrectionInputs) -> Result<(f64, f64)> {
    if !inputs.settings.potential_alignment {
        return Ok((0.0, 0.0));
    }
    let delta_v = potential_alignment(
        inputs.host,
        inputs.defect_cell,
        inputs.defects,
        inputs.radius,
    )?;
    Ok((delta_v, inputs.charge() * delta_v))
}

/// 能带填充；缺少能带数据时置零并给出诊断
pub fn band_filling_term(
    inputs: &CorrectionInputs,
    delta_v: f64,
) -> Result<(BandFilling, Option<Diagnostic>)> {
    if !inputs.settings.moss_burstein {
        return Ok((BandFilling::default(), None));
    }
    let vbm = inputs.host.require_vbm()?;
    let cbm = inputs.host.require_cbm()?;
    match &inputs.defect_cell.bands {
        Some(bands) => Ok((band_filling(bands, vbm, cbm, delta_v), None)),
        None => {
            let diagnostic = Diagnostic::BandDataMissing {
                cell: inputs.defect_cell.name.clone(),
            }
            .emit();
            Ok((BandFilling::default(), Some(diagnostic)))
        }
    }
}

/// PHS 修正：(−z_h·ΔVBM, z_e·ΔCBM)，仅对带电缺陷且能带填充发现自由载流子时生效
pub fn phs_terms(inputs: &CorrectionInputs, filling: &BandFilling) -> (f64, f64) {
    if !inputs.settings.phs || inputs.defect_cell.charge == 0 || !filling.has_carriers() {
        return (0.0, 0.0);
    }
    (
        -inputs.z_h * inputs.shifts.delta_vbm,
        inputs.z_e * inputs.shifts.delta_cbm,
    )
}

/// VBM 修正 q·ΔVBM
pub fn vbm_term(inputs: &CorrectionInputs) -> f64 {
    if !inputs.settings.vbm {
        return 0.0;
    }
    inputs.charge() * inputs.shifts.delta_vbm
}

/// Makov–Payne 修正 (1 + c_sh(1 − 1/ε_r))·q²·M₁/ε_r
pub fn makov_payne_term(inputs: &CorrectionInputs) -> f64 {
    let settings = inputs.settings;
    if !settings.makov_payne {
        return 0.0;
    }
    let e_r = settings.relative_permittivity;
    let c_sh = settings.geometry.shape_factor();
    let q = inputs.charge();
    (1.0 + c_sh * (1.0 - 1.0 / e_r)) * q * q * settings.makov_payne_constant / e_r
}

/// 宿主与缺陷晶胞的晶格一致性检查
pub fn check_lattices(host: &Cell, defect_cell: &Cell) -> Option<Diagnostic> {
    let max_difference = host.lattice.max_difference(&defect_cell.lattice);
    if max_difference > LATTICE_TOLERANCE {
        Some(
            Diagnostic::LatticeMismatch {
                host: host.name.clone(),
                defect: defect_cell.name.clone(),
                max_difference,
            }
            .emit(),
        )
    } else {
        None
    }
}

/// 计算全部修正
pub fn run(inputs: &CorrectionInputs) -> Result<CorrectionReport> {
    inputs.settings.validate()?;

    let mut diagnostics: Vec<Diagnostic> = check_lattices(inputs.host, inputs.defect_cell)
        .into_iter()
        .collect();

    let (delta_v, potential_alignment) = alignment_terms(inputs)?;
    let (band_filling, missing) = band_filling_term(inputs, delta_v)?;
    diagnostics.extend(missing);
    let (phs_holes, phs_electrons) = phs_terms(inputs, &band_filling);

    let corrections = Corrections {
        delta_v,
        potential_alignment,
        band_filling,
        phs_holes,
        phs_electrons,
        vbm: vbm_term(inputs),
        makov_payne: makov_payne_term(inputs),
    };

    tracing::debug!(
        "Corrections for '{}' (q = {}): PA = {:.4}, MB = {:.4}, PHS = {:.4}, VBM = {:.4}, MP = {:.4}",
        inputs.defect_cell.name,
        inputs.defect_cell.charge,
        corrections.potential_alignment,
        corrections.band_filling.total(),
        corrections.phs_holes + corrections.phs_electrons,
        corrections.vbm,
        corrections.makov_payne
    );

    Ok(CorrectionReport {
        corrections,
        diagnostics,
    })
}
