//! # 点缺陷定义
//!
//! 描述缺陷的类型（空位、间隙、替位）、受影响的原子、对应的化学势以及位点数。
//!
//! ## 依赖关系
//! - 被 `corrections/`, `study/`, `geometry/comparison.rs` 使用
//! - 使用 `models/structure.rs` 的 AtomLabel
//! - 使用 `models/calculation.rs` 的 Cell

use crate::error::{DefectError, Result};
use crate::models::calculation::Cell;
use crate::models::structure::AtomLabel;

use serde::{Deserialize, Serialize};
use std::fmt;

/// 缺陷类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefectKind {
    Vacancy,
    Interstitial,
    Substitutional,
}

impl DefectKind {
    /// 该类型需要的原子标签数量
    fn expected_atoms(self) -> usize {
        match self {
            DefectKind::Vacancy | DefectKind::Interstitial => 1,
            DefectKind::Substitutional => 2,
        }
    }
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefectKind::Vacancy => write!(f, "Vacancy"),
            DefectKind::Interstitial => write!(f, "Interstitial"),
            DefectKind::Substitutional => write!(f, "Substitutional"),
        }
    }
}

/// 点缺陷
///
/// 原子标签的含义取决于类型：
/// - 空位：宿主晶胞中被移除的原子
/// - 间隙：缺陷晶胞中新增的原子
/// - 替位：[宿主晶胞中被移除的原子, 缺陷晶胞中新增的原子]
///
/// 反序列化同样经过 [`Defect::validate`] 校验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DefectRecord")]
pub struct Defect {
    kind: DefectKind,
    atoms: Vec<AtomLabel>,
    /// 与 `atoms` 一一对应的化学势 (eV)
    chemical_potentials: Vec<f64>,
    /// 每个晶胞中可容纳该缺陷的位点数
    sites: Option<f64>,
    /// 用户指定的名称
    username: Option<String>,
}

/// 未经校验的缺陷记录
#[derive(Deserialize)]
struct DefectRecord {
    kind: DefectKind,
    atoms: Vec<AtomLabel>,
    chemical_potentials: Vec<f64>,
    #[serde(default)]
    sites: Option<f64>,
    #[serde(default)]
    username: Option<String>,
}

impl TryFrom<DefectRecord> for Defect {
    type Error = DefectError;

    fn try_from(record: DefectRecord) -> Result<Self> {
        let defect = Defect {
            kind: record.kind,
            atoms: record.atoms,
            chemical_potentials: record.chemical_potentials,
            sites: None,
            username: record.username,
        };
        defect.validate()?;
        match record.sites {
            Some(sites) => defect.with_sites(sites),
            None => Ok(defect),
        }
    }
}

impl Defect {
    /// 创建并校验缺陷
    pub fn new(kind: DefectKind, atoms: &[&str], chemical_potentials: &[f64]) -> Result<Self> {
        let atoms = atoms
            .iter()
            .map(|a| AtomLabel::parse(a))
            .collect::<Result<Vec<_>>>()?;

        let defect = Defect {
            kind,
            atoms,
            chemical_potentials: chemical_potentials.to_vec(),
            sites: None,
            username: None,
        };
        defect.validate()?;
        Ok(defect)
    }

    /// 校验原子标签与化学势
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind;
        if self.atoms.len() != kind.expected_atoms() {
            return Err(DefectError::InvalidDefectSpecification(format!(
                "{} requires {} atom label(s), got {}",
                kind,
                kind.expected_atoms(),
                self.atoms.len()
            )));
        }
        if let Some(label) = self.atoms.iter().find(|a| a.index == 0) {
            return Err(DefectError::InvalidDefectSpecification(format!(
                "atom indices start at 1, got '{}'",
                label
            )));
        }
        if self.chemical_potentials.len() != self.atoms.len() {
            return Err(DefectError::InvalidDefectSpecification(format!(
                "{} atom label(s) but {} chemical potential(s)",
                self.atoms.len(),
                self.chemical_potentials.len()
            )));
        }
        if let Some(mu) = self.chemical_potentials.iter().find(|mu| !mu.is_finite()) {
            return Err(DefectError::InvalidDefectSpecification(format!(
                "chemical potential must be finite, got {}",
                mu
            )));
        }
        if kind == DefectKind::Substitutional && self.atoms[0].species == self.atoms[1].species {
            return Err(DefectError::InvalidDefectSpecification(format!(
                "substitution of {} by the same species",
                self.atoms[0]
            )));
        }
        Ok(())
    }

    pub fn vacancy(atom: &str, chemical_potential: f64) -> Result<Self> {
        Self::new(DefectKind::Vacancy, &[atom], &[chemical_potential])
    }

    pub fn interstitial(atom: &str, chemical_potential: f64) -> Result<Self> {
        Self::new(DefectKind::Interstitial, &[atom], &[chemical_potential])
    }

    pub fn substitution(removed: &str, added: &str, mu_removed: f64, mu_added: f64) -> Result<Self> {
        Self::new(
            DefectKind::Substitutional,
            &[removed, added],
            &[mu_removed, mu_added],
        )
    }

    /// 设置位点数（必须为正）
    pub fn with_sites(mut self, sites: f64) -> Result<Self> {
        if !(sites.is_finite() && sites > 0.0) {
            return Err(DefectError::InvalidDefectSpecification(format!(
                "number of sites must be positive, got {}",
                sites
            )));
        }
        self.sites = Some(sites);
        Ok(self)
    }

    pub fn with_username(mut self, name: impl Into<String>) -> Self {
        self.username = Some(name.into());
        self
    }

    pub fn kind(&self) -> DefectKind {
        self.kind
    }

    pub fn atoms(&self) -> &[AtomLabel] {
        &self.atoms
    }

    pub fn chemical_potentials(&self) -> &[f64] {
        &self.chemical_potentials
    }

    pub fn sites(&self) -> Option<f64> {
        self.sites
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// 宿主晶胞中被移除的原子
    pub fn removed_atom(&self) -> Option<&AtomLabel> {
        match self.kind {
            DefectKind::Vacancy | DefectKind::Substitutional => self.atoms.first(),
            DefectKind::Interstitial => None,
        }
    }

    /// 缺陷晶胞中新增的原子
    pub fn added_atom(&self) -> Option<&AtomLabel> {
        match self.kind {
            DefectKind::Interstitial => self.atoms.first(),
            DefectKind::Substitutional => self.atoms.get(1),
            DefectKind::Vacancy => None,
        }
    }

    /// 各元素的原子数变化（缺陷晶胞 − 宿主晶胞）
    pub fn population_delta(&self) -> Vec<(String, i32)> {
        match self.kind {
            DefectKind::Vacancy => vec![(self.atoms[0].species.clone(), -1)],
            DefectKind::Interstitial => vec![(self.atoms[0].species.clone(), 1)],
            DefectKind::Substitutional => vec![
                (self.atoms[0].species.clone(), -1),
                (self.atoms[1].species.clone(), 1),
            ],
        }
    }

    /// 化学势项 Σ Δn_i·μ_i
    pub fn chemical_potential_term(&self) -> f64 {
        self.population_delta()
            .iter()
            .zip(&self.chemical_potentials)
            .map(|((_, dn), mu)| *dn as f64 * mu)
            .sum()
    }

    /// 显示名称，如 `V_{Cd}`, `Cd_i`, `In_{Cd}`
    pub fn name(&self) -> String {
        if let Some(name) = &self.username {
            return name.clone();
        }
        match self.kind {
            DefectKind::Vacancy => format!("V_{{{}}}", self.atoms[0].species),
            DefectKind::Interstitial => format!("{}_i", self.atoms[0].species),
            DefectKind::Substitutional => {
                format!("{}_{{{}}}", self.atoms[1].species, self.atoms[0].species)
            }
        }
    }

    /// 唯一标识符，如 `Vac_Cd(3)`
    pub fn id(&self) -> String {
        if let Some(name) = &self.username {
            return name.clone();
        }
        match self.kind {
            DefectKind::Vacancy => format!("Vac_{}", self.atoms[0].compact()),
            DefectKind::Interstitial => format!("Inter_{}", self.atoms[0].compact()),
            DefectKind::Substitutional => format!(
                "Subs({}_by_{})",
                self.atoms[0].compact(),
                self.atoms[1].compact()
            ),
        }
    }

    /// 缺陷位置（笛卡尔坐标, Å）
    ///
    /// 空位取宿主晶胞中被移除原子的位置，其他类型取缺陷晶胞中新增原子的位置
    pub fn position(&self, host: &Cell, defect_cell: &Cell) -> Result<[f64; 3]> {
        let (cell, label) = match self.kind {
            DefectKind::Vacancy => (host, &self.atoms[0]),
            DefectKind::Interstitial => (defect_cell, &self.atoms[0]),
            DefectKind::Substitutional => (defect_cell, &self.atoms[1]),
        };
        let index = cell.index_of(label)?;
        Ok(cell.lattice.to_cartesian(&cell.atoms[index].position))
    }
}
