//! # 材料研究
//!
//! 同一宿主晶胞上的多个相互独立的缺陷研究，按标识符排序。
//!
//! ## 依赖关系
//! - 被 `study/mod.rs` 的 Study 与 `concentrations/` 使用
//! - 使用 `study/defect_study.rs`

use super::defect_study::DefectStudy;
use super::envelope::{EnvelopePoint, FermiGrid, FormationCurves, TransitionLevel};
use crate::error::{DefectError, Result};
use crate::models::Cell;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// 修正汇总表的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub study: String,
    pub cell: String,
    pub charge: i32,
    /// 缺陷晶胞总能量 (eV)
    pub cell_energy: f64,
    pub vbm: f64,
    pub potential_alignment: f64,
    pub phs_holes: f64,
    pub phs_electrons: f64,
    pub makov_payne: f64,
    pub band_filling_holes: f64,
    pub band_filling_electrons: f64,
    pub total: f64,
}

/// 共享同一宿主的缺陷研究集合
#[derive(Debug, Clone)]
pub struct MaterialStudy {
    host: Arc<Cell>,
    studies: BTreeMap<String, DefectStudy>,
}

impl MaterialStudy {
    pub fn new(host: Arc<Cell>) -> Self {
        Self {
            host,
            studies: BTreeMap::new(),
        }
    }

    /// 由若干缺陷研究创建，宿主取第一个研究的宿主
    pub fn from_studies(studies: Vec<DefectStudy>) -> Result<Self> {
        let host = studies
            .first()
            .map(|s| s.host().clone())
            .ok_or_else(|| {
                DefectError::InvalidArgument("a material study needs at least one defect study".to_string())
            })?;
        let mut material = Self::new(host);
        for study in studies {
            material.add_study(study)?;
        }
        Ok(material)
    }

    /// 添加缺陷研究，宿主必须一致；重复的标识符加序号区分
    pub fn add_study(&mut self, study: DefectStudy) -> Result<String> {
        let same_host = Arc::ptr_eq(&self.host, study.host()) || *self.host == **study.host();
        if !same_host {
            return Err(DefectError::InvalidDefectSpecification(format!(
                "defect study '{}' uses host '{}' but the material study host is '{}'",
                study.id(),
                study.host().name,
                self.host.name
            )));
        }

        let base = study.id();
        let mut id = base.clone();
        let mut n = 2;
        while self.studies.contains_key(&id) {
            id = format!("{} #{}", base, n);
            n += 1;
        }
        self.studies.insert(id.clone(), study);
        Ok(id)
    }

    /// 按标识符排序的 (标识符, 研究)
    pub fn studies(&self) -> impl Iterator<Item = (&String, &DefectStudy)> {
        self.studies.iter()
    }

    pub fn study(&self, id: &str) -> Option<&DefectStudy> {
        self.studies.get(id)
    }

    pub fn study_mut(&mut self, id: &str) -> Option<&mut DefectStudy> {
        self.studies.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.studies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.studies.is_empty()
    }

    pub fn host(&self) -> &Arc<Cell> {
        &self.host
    }

    /// 修正后的带隙（取第一个研究）
    pub fn gap(&self) -> Result<f64> {
        self.studies
            .values()
            .next()
            .map(DefectStudy::gap)
            .ok_or_else(|| {
                DefectError::InvalidArgument(format!(
                    "material study of '{}' has no defect study",
                    self.host.name
                ))
            })
    }

    /// 每个缺陷研究在 `e_fermi` 处的下包络
    pub fn lower_envelope(&self, e_fermi: f64) -> Vec<(String, EnvelopePoint)> {
        self.studies
            .iter()
            .filter_map(|(id, s)| s.lower_envelope(e_fermi).map(|p| (id.clone(), p)))
            .collect()
    }

    pub fn transition_levels(&self, grid: &FermiGrid) -> Result<Vec<(String, Vec<TransitionLevel>)>> {
        self.studies
            .iter()
            .map(|(id, s)| Ok((id.clone(), s.transition_levels(grid)?)))
            .collect()
    }

    pub fn formation_energy_curves(&self, grid: &FermiGrid) -> Result<Vec<(String, FormationCurves)>> {
        self.studies
            .iter()
            .map(|(id, s)| Ok((id.clone(), s.formation_energy_curves(grid)?)))
            .collect()
    }

    /// 所有电荷态的修正汇总
    pub fn summary(&self) -> Vec<SummaryRow> {
        self.studies
            .iter()
            .flat_map(|(id, study)| {
                study.charge_states().map(move |state| {
                    let c = state.corrections();
                    SummaryRow {
                        study: id.clone(),
                        cell: state.defect_cell().name.clone(),
                        charge: state.charge(),
                        cell_energy: state.defect_cell().total_energy.unwrap_or(f64::NAN),
                        vbm: c.vbm,
                        potential_alignment: c.potential_alignment,
                        phs_holes: c.phs_holes,
                        phs_electrons: c.phs_electrons,
                        makov_payne: c.makov_payne,
                        band_filling_holes: c.band_filling.acceptor_energy,
                        band_filling_electrons: c.band_filling.donor_energy,
                        total: c.total(),
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corrections::CorrectionSettings;
    use crate::models::{Atom, Defect, Lattice};
    use crate::study::defect_study::tests::{host_cell, vacancy_study};

    #[test]
    fn test_host_mismatch_rejected() {
        let mut material = MaterialStudy::new(host_cell());
        material.add_study(vacancy_study(&[(0, -104.0)])).unwrap();

        let other_host = Arc::new(
            Cell::new("ZnS", Lattice::cubic(10.0), vec![Atom::new("Zn", [0.0; 3])])
                .with_energy(-50.0)
                .with_band_edges(0.0, 3.0),
        );
        let defect = Defect::vacancy("Zn (1)", -1.0).unwrap();
        let study = DefectStudy::new(other_host, vec![defect], CorrectionSettings::none()).unwrap();
        assert!(matches!(
            material.add_study(study),
            Err(DefectError::InvalidDefectSpecification(_))
        ));
    }

    #[test]
    fn test_studies_ordered_and_deduplicated() {
        let material = MaterialStudy::from_studies(vec![
            vacancy_study(&[(0, -104.0)]),
            vacancy_study(&[(1, -104.5)]),
        ])
        .unwrap();
        let ids: Vec<&String> = material.studies().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["CdS_Vac_Cd(1)", "CdS_Vac_Cd(1) #2"]);
        assert_eq!(material.lower_envelope(0.0).len(), 2);
    }

    #[test]
    fn test_summary_rows() {
        let material =
            MaterialStudy::from_studies(vec![vacancy_study(&[(0, -104.0), (-1, -103.0)])]).unwrap();
        let rows = material.summary();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].charge, -1);
        assert_eq!(rows[1].cell_energy, -104.0);
        assert_eq!(rows[1].total, 0.0);
    }

    #[test]
    fn test_empty_material_has_no_gap() {
        assert!(MaterialStudy::new(host_cell()).gap().is_err());
        assert!(MaterialStudy::from_studies(Vec::new()).is_err());
    }
}
