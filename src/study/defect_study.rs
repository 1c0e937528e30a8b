//! # 缺陷研究
//!
//! 同一缺陷（或缺陷复合体）的全部电荷态，共享能带边修正 ΔVBM/ΔCBM 与修正后的带隙。
//! 下包络与转变能级每次按需计算，不做缓存。
//!
//! ## 依赖关系
//! - 被 `study/material_study.rs` 与 `concentrations/` 使用
//! - 使用 `study/charge_state.rs`, `study/envelope.rs`

use super::charge_state::{ChargeStateInputs, DefectChargeState};
use super::envelope::{
    detect_transitions, lowest, EnvelopePoint, FermiGrid, FormationCurves, TransitionLevel,
};
use crate::corrections::{BandEdgeShifts, CorrectionSettings};
use crate::error::{DefectError, Result};
use crate::models::{Cell, Defect};

use std::collections::BTreeMap;
use std::sync::Arc;

/// 同一缺陷的所有电荷态
#[derive(Debug, Clone)]
pub struct DefectStudy {
    host: Arc<Cell>,
    /// 另一泛函的宿主计算，用于能带边修正
    reference_host: Option<Arc<Cell>>,
    defects: Arc<[Defect]>,
    settings: CorrectionSettings,
    delta_vbm_input: f64,
    delta_cbm_input: f64,
    shifts: BandEdgeShifts,
    gap: f64,
    /// 用户提供的其他带隙 (名称, 数值)
    reference_gaps: Vec<(String, f64)>,
    states: BTreeMap<i32, DefectChargeState>,
}

impl DefectStudy {
    pub fn new(host: Arc<Cell>, defects: Vec<Defect>, settings: CorrectionSettings) -> Result<Self> {
        if defects.is_empty() {
            return Err(DefectError::InvalidDefectSpecification(
                "a defect study needs at least one defect".to_string(),
            ));
        }
        settings.validate()?;

        let mut study = Self {
            host,
            reference_host: None,
            defects: defects.into(),
            settings,
            delta_vbm_input: 0.0,
            delta_cbm_input: 0.0,
            shifts: BandEdgeShifts::default(),
            gap: 0.0,
            reference_gaps: Vec::new(),
            states: BTreeMap::new(),
        };
        study.refresh()?;
        Ok(study)
    }

    /// 设置另一泛函的宿主计算（例如杂化泛函），已有电荷态会被重算
    pub fn with_reference_host(mut self, reference_host: Arc<Cell>) -> Result<Self> {
        self.reference_host = Some(reference_host);
        self.refresh()?;
        Ok(self)
    }

    /// 设置额外的 ΔVBM、ΔCBM，已有电荷态会被重算
    pub fn with_band_edge_inputs(mut self, delta_vbm: f64, delta_cbm: f64) -> Result<Self> {
        self.delta_vbm_input = delta_vbm;
        self.delta_cbm_input = delta_cbm;
        self.refresh()?;
        Ok(self)
    }

    pub fn with_reference_gap(mut self, label: impl Into<String>, gap: f64) -> Self {
        self.reference_gaps.push((label.into(), gap));
        self
    }

    /// 重新计算能带边移动、带隙与所有电荷态
    fn refresh(&mut self) -> Result<()> {
        self.shifts = BandEdgeShifts::compute(
            &self.host,
            self.reference_host.as_deref(),
            self.delta_vbm_input,
            self.delta_cbm_input,
            &self.settings,
        )?;
        self.gap = self.shifts.corrected_gap(&self.host)?;

        let mut states = BTreeMap::new();
        for (charge, state) in &self.states {
            let inputs = state.inputs().clone().with_shifts(self.shifts);
            let rebuilt = DefectChargeState::create(
                self.host.clone(),
                state.defect_cell().clone(),
                self.defects.clone(),
                inputs,
            )?;
            states.insert(*charge, rebuilt);
        }
        self.states = states;
        Ok(())
    }

    /// 添加一个电荷态；同一电荷只能出现一次
    pub fn add_charge_state(
        &mut self,
        defect_cell: Arc<Cell>,
        radius: f64,
        z_e: f64,
        z_h: f64,
    ) -> Result<&DefectChargeState> {
        let charge = defect_cell.charge;
        if self.states.contains_key(&charge) {
            return Err(DefectError::InvalidDefectSpecification(format!(
                "defect study '{}' already has a charge state q = {}",
                self.id(),
                charge
            )));
        }

        let inputs = ChargeStateInputs::new(radius, z_e, z_h)
            .with_shifts(self.shifts)
            .with_settings(self.settings.clone());
        let state =
            DefectChargeState::create(self.host.clone(), defect_cell, self.defects.clone(), inputs)?;
        let state: &DefectChargeState = self.states.entry(charge).or_insert(state);
        Ok(state)
    }

    /// 按电荷升序排列的电荷态
    pub fn charge_states(&self) -> impl Iterator<Item = &DefectChargeState> {
        self.states.values()
    }

    pub fn charge_state(&self, charge: i32) -> Option<&DefectChargeState> {
        self.states.get(&charge)
    }

    /// 可变访问，用于修改半径或 PHS 载流子数
    pub fn charge_state_mut(&mut self, charge: i32) -> Option<&mut DefectChargeState> {
        self.states.get_mut(&charge)
    }

    pub fn remove_charge_state(&mut self, charge: i32) -> Option<DefectChargeState> {
        self.states.remove(&charge)
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// 费米能级 `e_fermi` 处的最低形成能及对应电荷态
    pub fn lower_envelope(&self, e_fermi: f64) -> Option<EnvelopePoint> {
        lowest(
            self.states
                .values()
                .map(|s| (s.charge(), s.formation_energy(e_fermi))),
        )
    }

    /// 在网格上采样得到的转变能级，费米能量误差不超过 `grid.resolution()`
    pub fn transition_levels(&self, grid: &FermiGrid) -> Result<Vec<TransitionLevel>> {
        let curves = self.formation_energy_curves(grid)?;
        Ok(detect_transitions(
            &curves.fermi,
            &curves.envelope,
            grid.resolution(),
        ))
    }

    /// 各电荷态的形成能曲线与下包络
    pub fn formation_energy_curves(&self, grid: &FermiGrid) -> Result<FormationCurves> {
        grid.validate()?;
        if self.states.is_empty() {
            return Err(DefectError::InvalidArgument(format!(
                "defect study '{}' has no charge state",
                self.id()
            )));
        }
        let fermi = grid.values();
        let states = self
            .states
            .values()
            .map(|s| {
                (
                    s.charge(),
                    fermi.iter().map(|e| s.formation_energy(*e)).collect(),
                )
            })
            .collect();
        let envelope = fermi
            .iter()
            .filter_map(|e| self.lower_envelope(*e))
            .collect();
        Ok(FormationCurves {
            fermi,
            states,
            envelope,
        })
    }

    /// 每个晶胞的缺陷位点数（取第一个缺陷）
    pub fn sites(&self) -> Result<f64> {
        self.defects[0].sites().ok_or_else(|| {
            DefectError::InvalidDefectSpecification(format!(
                "defect '{}' has no number of sites, required for concentrations",
                self.defects[0].name()
            ))
        })
    }

    /// 唯一标识符：宿主名 + 各缺陷标识符
    pub fn id(&self) -> String {
        let ids: Vec<String> = self.defects.iter().map(Defect::id).collect();
        format!("{}_{}", self.host.name, ids.join("_"))
    }

    /// 显示名称，如 `V_{Cd} & Cd_i`
    pub fn name(&self) -> String {
        self.defects
            .iter()
            .map(Defect::name)
            .collect::<Vec<_>>()
            .join(" & ")
    }

    pub fn host(&self) -> &Arc<Cell> {
        &self.host
    }

    pub fn defects(&self) -> &[Defect] {
        &self.defects
    }

    pub fn settings(&self) -> &CorrectionSettings {
        &self.settings
    }

    pub fn shifts(&self) -> BandEdgeShifts {
        self.shifts
    }

    /// 修正后的带隙 gap_host − ΔVBM + ΔCBM
    pub fn gap(&self) -> f64 {
        self.gap
    }

    /// 用户提供的带隙以及修正后的带隙
    pub fn gaps(&self) -> Vec<(String, f64)> {
        let mut gaps = self.reference_gaps.clone();
        gaps.push(("Calculated gap".to_string(), self.gap));
        gaps
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Atom, Lattice};

    pub(crate) fn host_cell() -> Arc<Cell> {
        Arc::new(
            Cell::new(
                "CdS",
                Lattice::cubic(10.0),
                vec![Atom::new("Cd", [0.0; 3]), Atom::new("S", [0.5; 3])],
            )
            .with_energy(-100.0)
            .with_band_edges(0.0, 2.0),
        )
    }

    pub(crate) fn defect_cell(charge: i32, energy: f64) -> Arc<Cell> {
        Arc::new(
            Cell::new("V_Cd", Lattice::cubic(10.0), vec![Atom::new("S", [0.5; 3])])
                .with_energy(energy)
                .with_charge(charge),
        )
    }

    /// E⁰(q) = energy + 100 + 5
    pub(crate) fn vacancy_study(states: &[(i32, f64)]) -> DefectStudy {
        let defect = Defect::vacancy("Cd (1)", -5.0)
            .unwrap()
            .with_sites(1.0)
            .unwrap();
        let mut study =
            DefectStudy::new(host_cell(), vec![defect], CorrectionSettings::none()).unwrap();
        for (q, e) in states {
            study.add_charge_state(defect_cell(*q, *e), 2.0, 0.0, 0.0).unwrap();
        }
        study
    }

    #[test]
    fn test_duplicate_charge_rejected() {
        let mut study = vacancy_study(&[(0, -104.0)]);
        let err = study
            .add_charge_state(defect_cell(0, -103.0), 2.0, 0.0, 0.0)
            .unwrap_err();
        assert!(matches!(err, DefectError::InvalidDefectSpecification(_)));
    }

    #[test]
    fn test_states_sorted_by_charge() {
        let study = vacancy_study(&[(1, -105.0), (-2, -103.0), (0, -104.0)]);
        let charges: Vec<i32> = study.charge_states().map(|s| s.charge()).collect();
        assert_eq!(charges, vec![-2, 0, 1]);
        assert_eq!(study.id(), "CdS_Vac_Cd(1)");
        assert_eq!(study.name(), "V_{Cd}");
    }

    #[test]
    fn test_envelope_below_every_state() {
        let study = vacancy_study(&[(1, -104.5), (0, -104.0), (-1, -103.0)]);
        let grid = FermiGrid::across_gap(study.gap(), 401).unwrap();
        for e in grid.values() {
            let env = study.lower_envelope(e).unwrap();
            for state in study.charge_states() {
                assert!(env.energy <= state.formation_energy(e) + 1e-12);
            }
        }
    }

    #[test]
    fn test_transition_levels() {
        // E⁰: q=+1 → 0.5, q=0 → 1.0, q=-1 → 2.0
        // (+1/0) 在 0.5 eV，(0/-1) 在 1.0 eV
        let study = vacancy_study(&[(1, -104.5), (0, -104.0), (-1, -103.0)]);
        let grid = FermiGrid::new(0.0, 2.0, 2001).unwrap();
        let levels = study.transition_levels(&grid).unwrap();
        assert_eq!(levels.len(), 2);
        assert!((levels[0].fermi_energy - 0.5).abs() <= grid.resolution() + 1e-12);
        assert_eq!((levels[0].charge_old, levels[0].charge_new), (1, 0));
        assert!((levels[1].fermi_energy - 1.0).abs() <= grid.resolution() + 1e-12);
        assert_eq!((levels[1].charge_old, levels[1].charge_new), (0, -1));
        assert!(levels[0].fermi_energy < levels[1].fermi_energy);
        assert_eq!(levels[0].resolution, grid.resolution());
    }

    #[test]
    fn test_band_edge_inputs_refresh_gap_and_states() {
        let study = vacancy_study(&[(1, -104.5)]);
        let settings = CorrectionSettings::none().with_vbm(true);
        let mut s = DefectStudy::new(host_cell(), study.defects().to_vec(), settings).unwrap();
        s.add_charge_state(defect_cell(1, -104.5), 2.0, 0.0, 0.0).unwrap();
        let e_before = s.charge_state(1).unwrap().energy_zero();
        let s = s.with_band_edge_inputs(-0.2, 0.3).unwrap();
        assert!((s.gap() - 2.5).abs() < 1e-12);
        let e_after = s.charge_state(1).unwrap().energy_zero();
        assert!((e_after - e_before - (-0.2)).abs() < 1e-12);
        assert_eq!(s.gaps().last().unwrap().0, "Calculated gap");
    }

    #[test]
    fn test_sites_required() {
        let defect = Defect::vacancy("Cd (1)", -5.0).unwrap();
        let study = DefectStudy::new(host_cell(), vec![defect], CorrectionSettings::none()).unwrap();
        assert!(study.sites().is_err());
    }
}
