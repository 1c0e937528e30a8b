//! # 缺陷电荷态
//!
//! 单个带电缺陷超胞的形成能：运行一次修正流水线得到费米能级为零时的形成能 E⁰，
//! 之后 E_form(E_F) = E⁰ + q·E_F。
//!
//! 排除半径与 PHS 载流子数可以修改，修改后只重算依赖它们的修正项。
//!
//! ## 依赖关系
//! - 被 `study/defect_study.rs` 使用
//! - 使用 `corrections/pipeline.rs`

use crate::corrections::pipeline::{self, CorrectionInputs, Corrections};
use crate::corrections::{BandEdgeShifts, CorrectionSettings};
use crate::error::Result;
use crate::models::{Cell, Defect};
use crate::utils::Diagnostic;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 重建一个电荷态所需的全部可调输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeStateInputs {
    /// 势对齐排除半径 (Å)
    pub radius: f64,
    /// PHS 中的电子数
    pub z_e: f64,
    /// PHS 中的空穴数
    pub z_h: f64,
    pub shifts: BandEdgeShifts,
    pub settings: CorrectionSettings,
}

impl ChargeStateInputs {
    pub fn new(radius: f64, z_e: f64, z_h: f64) -> Self {
        Self {
            radius,
            z_e,
            z_h,
            shifts: BandEdgeShifts::default(),
            settings: CorrectionSettings::default(),
        }
    }

    pub fn with_shifts(mut self, shifts: BandEdgeShifts) -> Self {
        self.shifts = shifts;
        self
    }

    pub fn with_settings(mut self, settings: CorrectionSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// 缺陷的一个电荷态
#[derive(Debug, Clone)]
pub struct DefectChargeState {
    host: Arc<Cell>,
    defect_cell: Arc<Cell>,
    defects: Arc<[Defect]>,
    inputs: ChargeStateInputs,
    corrections: Corrections,
    diagnostics: Vec<Diagnostic>,
    energy_zero: f64,
}

impl DefectChargeState {
    /// 计算全部修正并得到 E⁰
    pub fn create(
        host: Arc<Cell>,
        defect_cell: Arc<Cell>,
        defects: Arc<[Defect]>,
        inputs: ChargeStateInputs,
    ) -> Result<Self> {
        let report = pipeline::run(&CorrectionInputs {
            host: &host,
            defect_cell: &defect_cell,
            defects: &defects,
            radius: inputs.radius,
            z_e: inputs.z_e,
            z_h: inputs.z_h,
            shifts: inputs.shifts,
            settings: &inputs.settings,
        })?;

        let mut state = Self {
            host,
            defect_cell,
            defects,
            inputs,
            corrections: report.corrections,
            diagnostics: report.diagnostics,
            energy_zero: 0.0,
        };
        state.energy_zero = state.compute_energy_zero()?;

        tracing::debug!(
            "Charge state {} created: E0 = {:.4} eV",
            state.title(),
            state.energy_zero
        );
        Ok(state)
    }

    fn correction_inputs(&self) -> CorrectionInputs<'_> {
        CorrectionInputs {
            host: &self.host,
            defect_cell: &self.defect_cell,
            defects: &self.defects,
            radius: self.inputs.radius,
            z_e: self.inputs.z_e,
            z_h: self.inputs.z_h,
            shifts: self.inputs.shifts,
            settings: &self.inputs.settings,
        }
    }

    /// E⁰ = E_defect − E_host + Σ Δn·μ + q·VBM_host + Σ 修正
    fn compute_energy_zero(&self) -> Result<f64> {
        let e_defect = self.defect_cell.require_energy()?;
        let e_host = self.host.require_energy()?;
        let vbm = self.host.require_vbm()?;
        let chemical: f64 = self
            .defects
            .iter()
            .map(Defect::chemical_potential_term)
            .sum();
        Ok(e_defect - e_host + chemical + self.charge() as f64 * vbm + self.corrections.total())
    }

    /// 修改排除半径，重算势对齐以及依赖 ΔV 的能带填充与 PHS
    pub fn set_radius(&mut self, radius: f64) -> Result<()> {
        let previous = self.inputs.radius;
        self.inputs.radius = radius;

        let inputs = self.correction_inputs();
        let refreshed = pipeline::alignment_terms(&inputs).and_then(|(delta_v, pa)| {
            let (filling, missing) = pipeline::band_filling_term(&inputs, delta_v)?;
            let phs = pipeline::phs_terms(&inputs, &filling);
            Ok((delta_v, pa, filling, missing, phs))
        });

        let (delta_v, pa, filling, missing, (phs_holes, phs_electrons)) = match refreshed {
            Ok(values) => values,
            Err(e) => {
                self.inputs.radius = previous;
                return Err(e);
            }
        };

        self.corrections.delta_v = delta_v;
        self.corrections.potential_alignment = pa;
        self.corrections.band_filling = filling;
        self.corrections.phs_holes = phs_holes;
        self.corrections.phs_electrons = phs_electrons;
        if let Some(d) = missing {
            if !self.diagnostics.contains(&d) {
                self.diagnostics.push(d);
            }
        }
        self.energy_zero = self.compute_energy_zero()?;
        Ok(())
    }

    /// 修改 PHS 载流子数，只重算 PHS 修正
    pub fn set_z(&mut self, z_e: f64, z_h: f64) -> Result<()> {
        self.inputs.z_e = z_e;
        self.inputs.z_h = z_h;
        let (phs_holes, phs_electrons) =
            pipeline::phs_terms(&self.correction_inputs(), &self.corrections.band_filling);
        self.corrections.phs_holes = phs_holes;
        self.corrections.phs_electrons = phs_electrons;
        self.energy_zero = self.compute_energy_zero()?;
        Ok(())
    }

    /// 费米能级 `e_fermi` 处的形成能
    pub fn formation_energy(&self, e_fermi: f64) -> f64 {
        self.energy_zero + self.charge() as f64 * e_fermi
    }

    /// 缺陷电荷，取自缺陷晶胞
    pub fn charge(&self) -> i32 {
        self.defect_cell.charge
    }

    pub fn energy_zero(&self) -> f64 {
        self.energy_zero
    }

    pub fn corrections(&self) -> &Corrections {
        &self.corrections
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// 当前可调输入（可序列化后用于重建）
    pub fn inputs(&self) -> &ChargeStateInputs {
        &self.inputs
    }

    pub fn host(&self) -> &Arc<Cell> {
        &self.host
    }

    pub fn defect_cell(&self) -> &Arc<Cell> {
        &self.defect_cell
    }

    pub fn defects(&self) -> &Arc<[Defect]> {
        &self.defects
    }

    /// 显示标题，如 `V_{Cd}^{-1}`
    pub fn title(&self) -> String {
        let names: Vec<String> = self.defects.iter().map(Defect::name).collect();
        let label = if names.len() == 1 {
            names[0].clone()
        } else {
            format!("({})", names.join(" & "))
        };
        format!("{}^{{{:+}}}", label, self.charge())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corrections::CrystalGeometry;
    use crate::models::{Atom, BandOccupations, KpointBands, Lattice};

    fn worked_example() -> DefectChargeState {
        let lattice = Lattice::cubic(10.0);
        let host = Cell::new(
            "host",
            lattice.clone(),
            vec![Atom::new("Cd", [0.0; 3]), Atom::new("S", [0.5; 3])],
        )
        .with_energy(-100.0)
        .with_band_edges(2.0, 3.0);
        let defect_cell = Cell::new("vac", lattice, vec![Atom::new("S", [0.5; 3])])
            .with_energy(-95.0)
            .with_charge(1);
        let defects: Arc<[Defect]> = vec![Defect::vacancy("Cd (1)", -5.0).unwrap()].into();
        DefectChargeState::create(
            Arc::new(host),
            Arc::new(defect_cell),
            defects,
            ChargeStateInputs::new(2.0, 0.0, 0.0).with_settings(CorrectionSettings::none()),
        )
        .unwrap()
    }

    fn corrected_state() -> DefectChargeState {
        let lattice = Lattice::cubic(20.0);
        let host = Cell::new(
            "host",
            lattice.clone(),
            vec![
                Atom::new("Cd", [0.5, 0.5, 0.5]),
                Atom::new("S", [0.6, 0.5, 0.5]),
                Atom::new("S", [0.8, 0.5, 0.5]),
            ],
        )
        .with_energy(-100.0)
        .with_band_edges(2.0, 3.5)
        .with_potentials(vec![-40.0, -60.0, -60.0]);
        let defect_cell = Cell::new(
            "vac",
            lattice,
            vec![Atom::new("S", [0.6, 0.5, 0.5]), Atom::new("S", [0.8, 0.5, 0.5])],
        )
        .with_energy(-95.0)
        .with_charge(-1)
        .with_potentials(vec![-59.5, -59.9])
        .with_bands(BandOccupations {
            spin_polarized: false,
            kpoints: vec![KpointBands {
                weight: 1.0,
                energies: vec![1.0, 4.5],
                occupations: vec![2.0, 0.5],
            }],
        });
        let defects: Arc<[Defect]> = vec![Defect::vacancy("Cd (1)", -5.0).unwrap()].into();
        let inputs = ChargeStateInputs::new(1.0, 1.0, 0.0)
            .with_shifts(BandEdgeShifts {
                delta_vbm: -0.1,
                delta_cbm: 0.3,
            })
            .with_settings(
                CorrectionSettings::default().with_makov_payne(CrystalGeometry::Fcc, 9.0, 1.2),
            );
        DefectChargeState::create(Arc::new(host), Arc::new(defect_cell), defects, inputs).unwrap()
    }

    #[test]
    fn test_worked_example_is_twelve_ev() {
        let state = worked_example();
        assert_eq!(state.charge(), 1);
        assert!((state.energy_zero() - 12.0).abs() < 1e-12);
        assert!((state.formation_energy(0.0) - 12.0).abs() < 1e-12);
        assert!((state.formation_energy(1.5) - 13.5).abs() < 1e-12);
        assert_eq!(state.title(), "V_{Cd}^{+1}");
    }

    #[test]
    fn test_set_radius_updates_alignment_and_band_filling() {
        let mut state = corrected_state();
        // 两个原子都在 1 Å 之外：ΔV = (0.5 + 0.1) / 2
        assert!((state.corrections().delta_v - 0.3).abs() < 1e-9);
        // −0.5·(4.5 − 3.5 − ΔV)
        assert!((state.corrections().band_filling.donor_energy - (-0.35)).abs() < 1e-9);
        let makov_payne = state.corrections().makov_payne;

        state.set_radius(3.0).unwrap();
        assert!((state.corrections().delta_v - 0.1).abs() < 1e-9);
        assert!((state.corrections().potential_alignment - (-0.1)).abs() < 1e-9);
        assert!((state.corrections().band_filling.donor_energy - (-0.45)).abs() < 1e-9);
        assert_eq!(state.corrections().makov_payne, makov_payne);
        assert_eq!(state.inputs().radius, 3.0);
    }

    #[test]
    fn test_failed_set_radius_keeps_previous_radius() {
        let mut state = corrected_state();
        let before = state.energy_zero();
        assert!(state.set_radius(50.0).is_err());
        assert_eq!(state.inputs().radius, 1.0);
        assert_eq!(state.energy_zero(), before);
    }

    #[test]
    fn test_set_z_only_touches_phs() {
        let mut state = corrected_state();
        let before = *state.corrections();
        state.set_z(2.0, 1.0).unwrap();
        let after = *state.corrections();
        assert!((after.phs_electrons - 0.6).abs() < 1e-12);
        assert!((after.phs_holes - 0.1).abs() < 1e-12);
        assert_eq!(after.potential_alignment, before.potential_alignment);
        assert_eq!(after.band_filling, before.band_filling);
        let delta = after.phs_electrons + after.phs_holes - before.phs_electrons - before.phs_holes;
        let mut rebuilt = corrected_state();
        rebuilt.set_z(2.0, 1.0).unwrap();
        assert!((rebuilt.energy_zero() - state.energy_zero()).abs() < 1e-12);
        assert!((delta - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_serialized_inputs_reproduce_energy() {
        let mut state = corrected_state();
        state.set_radius(3.0).unwrap();
        state.set_z(0.5, 0.5).unwrap();

        let json = serde_json::to_string(state.inputs()).unwrap();
        let restored: ChargeStateInputs = serde_json::from_str(&json).unwrap();
        let rebuilt = DefectChargeState::create(
            state.host().clone(),
            state.defect_cell().clone(),
            state.defects().clone(),
            restored,
        )
        .unwrap();
        assert!((rebuilt.energy_zero() - state.energy_zero()).abs() < 1e-9);
    }

    #[test]
    fn test_missing_defect_energy_is_error() {
        let state = worked_example();
        let mut cell = (**state.defect_cell()).clone();
        cell.total_energy = None;
        let result = DefectChargeState::create(
            state.host().clone(),
            Arc::new(cell),
            state.defects().clone(),
            state.inputs().clone(),
        );
        assert!(matches!(
            result,
            Err(crate::error::DefectError::DataUnavailable { .. })
        ));
    }
}
