//! # 第一性原理计算结果数据模型
//!
//! 存储上游解析器提供的一次计算（宿主晶胞、缺陷晶胞或竞争相）的全部标量/数组量。
//! 引擎只读取这些数据，不做任何文件解析。
//!
//! ## 依赖关系
//! - 被 `corrections/`, `study/`, `stability/`, `concentrations/` 使用
//! - 使用 `models/structure.rs` 的 Lattice, Atom, AtomLabel

use crate::error::{DefectError, Result};
use crate::models::structure::{Atom, AtomLabel, Lattice};

use serde::{Deserialize, Serialize};

/// 单个 k 点（及自旋通道）的能带能量与占据数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpointBands {
    /// k 点权重
    pub weight: f64,
    /// 能带能量（eV）
    pub energies: Vec<f64>,
    /// 占据数
    pub occupations: Vec<f64>,
}

/// k 点加权的能带占据矩阵
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandOccupations {
    /// 自旋极化计算时每个 k 点出现两次（上、下自旋各一次）
    pub spin_polarized: bool,
    pub kpoints: Vec<KpointBands>,
}

impl BandOccupations {
    /// 单个能带的最大占据数
    pub fn max_occupation(&self) -> f64 {
        if self.spin_polarized {
            1.0
        } else {
            2.0
        }
    }
}

/// 总态密度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityOfStates {
    /// 能量网格（eV，等间距）
    pub energies: Vec<f64>,
    /// 每个晶胞的态密度（states/eV）
    pub total: Vec<f64>,
}

/// 一次第一性原理计算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// 计算名称
    pub name: String,

    /// 总能量 (eV)
    pub total_energy: Option<f64>,

    /// 价带顶 (eV)
    pub vbm_energy: Option<f64>,

    /// 导带底 (eV)
    pub cbm_energy: Option<f64>,

    /// 费米能级 (eV)
    pub fermi_energy: Option<f64>,

    /// 晶胞电荷
    pub charge: i32,

    /// 晶格
    pub lattice: Lattice,

    /// 原子列表（同种元素连续排列时，标签序号即出现顺序）
    pub atoms: Vec<Atom>,

    /// 每个原子处的平均静电势 (eV)，与 `atoms` 一一对应
    pub potentials: Option<Vec<f64>>,

    /// 能带占据
    pub bands: Option<BandOccupations>,

    /// 态密度
    pub dos: Option<DensityOfStates>,
}

impl Cell {
    pub fn new(name: impl Into<String>, lattice: Lattice, atoms: Vec<Atom>) -> Self {
        Cell {
            name: name.into(),
            total_energy: None,
            vbm_energy: None,
            cbm_energy: None,
            fermi_energy: None,
            charge: 0,
            lattice,
            atoms,
            potentials: None,
            bands: None,
            dos: None,
        }
    }

    pub fn with_energy(mut self, total_energy: f64) -> Self {
        self.total_energy = Some(total_energy);
        self
    }

    pub fn with_band_edges(mut self, vbm: f64, cbm: f64) -> Self {
        self.vbm_energy = Some(vbm);
        self.cbm_energy = Some(cbm);
        self
    }

    pub fn with_charge(mut self, charge: i32) -> Self {
        self.charge = charge;
        self
    }

    pub fn with_potentials(mut self, potentials: Vec<f64>) -> Self {
        self.potentials = Some(potentials);
        self
    }

    pub fn with_bands(mut self, bands: BandOccupations) -> Self {
        self.bands = Some(bands);
        self
    }

    pub fn with_dos(mut self, dos: DensityOfStates) -> Self {
        self.dos = Some(dos);
        self
    }

    /// 必需的总能量
    pub fn require_energy(&self) -> Result<f64> {
        self.total_energy
            .ok_or_else(|| DefectError::missing(&self.name, "total energy"))
    }

    /// 必需的价带顶
    pub fn require_vbm(&self) -> Result<f64> {
        self.vbm_energy
            .ok_or_else(|| DefectError::missing(&self.name, "VBM energy"))
    }

    /// 必需的导带底
    pub fn require_cbm(&self) -> Result<f64> {
        self.cbm_energy
            .ok_or_else(|| DefectError::missing(&self.name, "CBM energy"))
    }

    /// 必需的静电势（数量必须与原子数一致）
    pub fn require_potentials(&self) -> Result<&[f64]> {
        match &self.potentials {
            Some(p) if p.len() == self.atoms.len() => Ok(p),
            Some(p) => Err(DefectError::missing(
                &self.name,
                format!(
                    "electrostatic potentials ({} values for {} atoms)",
                    p.len(),
                    self.atoms.len()
                ),
            )),
            None => Err(DefectError::missing(&self.name, "electrostatic potentials")),
        }
    }

    /// 带隙
    pub fn gap(&self) -> Result<f64> {
        Ok(self.require_cbm()? - self.require_vbm()?)
    }

    /// 各元素原子数，按首次出现的顺序
    pub fn population(&self) -> Vec<(String, usize)> {
        let mut population: Vec<(String, usize)> = Vec::new();
        for atom in &self.atoms {
            match population.iter_mut().find(|(el, _)| *el == atom.element) {
                Some((_, count)) => *count += 1,
                None => population.push((atom.element.clone(), 1)),
            }
        }
        population
    }

    /// 某元素的原子数
    pub fn count_of(&self, species: &str) -> usize {
        self.atoms.iter().filter(|a| a.element == species).count()
    }

    /// 元素种类（按首次出现的顺序）
    pub fn species(&self) -> Vec<String> {
        self.population().into_iter().map(|(el, _)| el).collect()
    }

    /// 约化化学式，如 Cd8In16S32 -> CdIn2S4
    pub fn reduced_formula(&self) -> String {
        let population = self.population();
        let divisor = population.iter().fold(0, |acc, (_, n)| gcd(acc, *n)).max(1);

        population
            .into_iter()
            .map(|(el, count)| {
                let count = count / divisor;
                if count == 1 {
                    el
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// 根据标签查找原子在 `atoms` 中的索引
    pub fn index_of(&self, label: &AtomLabel) -> Result<usize> {
        label
            .index
            .checked_sub(1)
            .and_then(|rank| {
                self.atoms
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| a.element == label.species)
                    .nth(rank)
            })
            .map(|(i, _)| i)
            .ok_or_else(|| {
                DefectError::InvalidDefectSpecification(format!(
                    "atom '{}' does not exist in cell '{}'",
                    label, self.name
                ))
            })
    }

    /// 第 `index` 个原子的标签
    pub fn label_of(&self, index: usize) -> Option<AtomLabel> {
        let element = &self.atoms.get(index)?.element;
        let rank = self.atoms[..index]
            .iter()
            .filter(|a| a.element == *element)
            .count();
        Some(AtomLabel::new(element.clone(), rank + 1))
    }

    /// 原子的笛卡尔坐标 (Å)
    pub fn cartesian_positions(&self) -> Vec<[f64; 3]> {
        self.atoms
            .iter()
            .map(|a| self.lattice.to_cartesian(&a.position))
            .collect()
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cds_cell() -> Cell {
        let atoms = vec![
            Atom::new("Cd", [0.0, 0.0, 0.0]),
            Atom::new("Cd", [0.5, 0.5, 0.0]),
            Atom::new("S", [0.25, 0.25, 0.25]),
            Atom::new("S", [0.75, 0.75, 0.25]),
        ];
        Cell::new("CdS", Lattice::cubic(5.8), atoms)
            .with_energy(-20.0)
            .with_band_edges(1.0, 2.5)
    }

    #[test]
    fn test_population_and_formula() {
        let cell = cds_cell();
        assert_eq!(
            cell.population(),
            vec![("Cd".to_string(), 2), ("S".to_string(), 2)]
        );
        assert_eq!(cell.reduced_formula(), "CdS");
        assert_eq!(cell.count_of("S"), 2);
        assert_eq!(cell.count_of("In"), 0);
    }

    #[test]
    fn test_labels_and_indices() {
        let cell = cds_cell();
        assert_eq!(cell.index_of(&AtomLabel::new("S", 2)).unwrap(), 3);
        assert_eq!(cell.label_of(2), Some(AtomLabel::new("S", 1)));
        assert!(cell.index_of(&AtomLabel::new("S", 3)).is_err());
    }

    #[test]
    fn test_required_fields() {
        let cell = cds_cell();
        assert!((cell.gap().unwrap() - 1.5).abs() < 1e-12);
        assert!(matches!(
            cell.require_potentials(),
            Err(DefectError::DataUnavailable { .. })
        ));

        let mut no_energy = cds_cell();
        no_energy.total_energy = None;
        assert_eq!(
            no_energy.require_energy(),
            Err(DefectError::missing("CdS", "total energy"))
        );
    }

    #[test]
    fn test_potentials_length_mismatch() {
        let cell = cds_cell().with_potentials(vec![1.0, 2.0]);
        assert!(cell.require_potentials().is_err());
    }

    #[test]
    fn test_spin_max_occupation() {
        let bands = BandOccupations {
            spin_polarized: true,
            kpoints: vec![],
        };
        assert_eq!(bands.max_occupation(), 1.0);
    }
}
