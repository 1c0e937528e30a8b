//! # 缺陷研究模块
//!
//! 电荷态、缺陷研究与材料研究，以及形成能下包络和转变能级。
//!
//! ## 依赖关系
//! - 被 `concentrations/` 使用
//! - 使用 `corrections/`, `models/`
//! - 子模块: charge_state, defect_study, material_study, envelope

pub mod charge_state;
pub mod defect_study;
pub mod envelope;
pub mod material_study;

pub use charge_state::{ChargeStateInputs, DefectChargeState};
pub use defect_study::DefectStudy;
pub use envelope::{EnvelopePoint, FermiGrid, FormationCurves, TransitionLevel};
pub use material_study::{MaterialStudy, SummaryRow};

use crate::error::Result;
use crate::models::Cell;

use std::sync::Arc;

/// 单个缺陷研究或材料研究
#[derive(Debug, Clone)]
pub enum Study {
    Defect(DefectStudy),
    Material(MaterialStudy),
}

impl Study {
    pub fn host(&self) -> &Arc<Cell> {
        match self {
            Study::Defect(s) => s.host(),
            Study::Material(m) => m.host(),
        }
    }

    pub fn gap(&self) -> Result<f64> {
        match self {
            Study::Defect(s) => Ok(s.gap()),
            Study::Material(m) => m.gap(),
        }
    }

    /// 各缺陷研究在 `e_fermi` 处的下包络
    pub fn lower_envelope(&self, e_fermi: f64) -> Vec<(String, EnvelopePoint)> {
        match self {
            Study::Defect(s) => s
                .lower_envelope(e_fermi)
                .map(|p| vec![(s.id(), p)])
                .unwrap_or_default(),
            Study::Material(m) => m.lower_envelope(e_fermi),
        }
    }

    pub fn formation_energy_curves(&self, grid: &FermiGrid) -> Result<Vec<(String, FormationCurves)>> {
        match self {
            Study::Defect(s) => Ok(vec![(s.id(), s.formation_energy_curves(grid)?)]),
            Study::Material(m) => m.formation_energy_curves(grid),
        }
    }

    pub fn transition_levels(&self, grid: &FermiGrid) -> Result<Vec<(String, Vec<TransitionLevel>)>> {
        match self {
            Study::Defect(s) => Ok(vec![(s.id(), s.transition_levels(grid)?)]),
            Study::Material(m) => m.transition_levels(grid),
        }
    }
}

impl From<DefectStudy> for Study {
    fn from(study: DefectStudy) -> Self {
        Study::Defect(study)
    }
}

impl From<MaterialStudy> for Study {
    fn from(study: MaterialStudy) -> Self {
        Study::Material(study)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::study::defect_study::tests::vacancy_study;

    #[test]
    fn test_defect_and_material_agree() {
        let single: Study = vacancy_study(&[(1, -104.5), (0, -104.0)]).into();
        let material: Study = MaterialStudy::from_studies(vec![vacancy_study(&[
            (1, -104.5),
            (0, -104.0),
        ])])
        .unwrap()
        .into();

        let grid = FermiGrid::new(0.0, 2.0, 201).unwrap();
        let a = single.transition_levels(&grid).unwrap();
        let b = material.transition_levels(&grid).unwrap();
        assert_eq!(a, b);
        assert_eq!(single.lower_envelope(0.2), material.lower_envelope(0.2));
        assert!((single.gap().unwrap() - 2.0).abs() < 1e-12);
    }
}
