//! # 缺陷引入前后的结构比较
//!
//! 以缺陷位置为中心，在宿主晶胞中取一个配位球，为球内每个原子在缺陷晶胞中
//! 寻找对应原子（缺陷引入后原子会被重新编号），然后给出：
//! - 每个原子的位移
//! - 与 6 个最近邻之间键长的显著变化（相对变化超过阈值）
//!
//! 空位在缺陷晶胞中、间隙原子在宿主晶胞中各以一个虚拟位点 `X (i)` 表示，
//! 以便缺陷位点本身也参与比较。
//!
//! ## 依赖关系
//! - 使用 `geometry/periodic.rs` 的相邻晶胞平移
//! - 使用 `models/` 的 Cell 与 Defect
//! - 使用 `corrections/pipeline.rs` 的晶格一致性检查
//! - 使用 `utils/diagnostics.rs` 报告找不到对应原子的情况

use super::periodic::{add, distance, next_cells};
use crate::corrections::pipeline::check_lattices;
use crate::error::{DefectError, Result};
use crate::models::{Cell, Defect, DefectKind, Lattice};
use crate::utils::Diagnostic;

use serde::{Deserialize, Serialize};

/// 每个原子考察的最近邻数
const NEAREST_NEIGHBOURS: usize = 6;

/// 结构比较参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSettings {
    /// 判定对应原子的半径 (Å)
    pub correspondence_radius: f64,
    /// 配位球半径 (Å)
    pub sphere_radius: f64,
    /// 键长相对变化的显著性阈值 (%)
    pub significance: f64,
}

impl Default for ComparisonSettings {
    fn default() -> Self {
        Self {
            correspondence_radius: 2.0,
            sphere_radius: 7.0,
            significance: 3.5,
        }
    }
}

impl ComparisonSettings {
    pub fn with_correspondence_radius(mut self, radius: f64) -> Self {
        self.correspondence_radius = radius;
        self
    }

    pub fn with_sphere_radius(mut self, radius: f64) -> Self {
        self.sphere_radius = radius;
        self
    }

    pub fn with_significance(mut self, percent: f64) -> Self {
        self.significance = percent;
        self
    }

    fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.correspondence_radius) || !positive(self.sphere_radius) {
            return Err(DefectError::InvalidArgument(format!(
                "comparison radii must be positive, got {} and {}",
                self.correspondence_radius, self.sphere_radius
            )));
        }
        if !(self.significance.is_finite() && self.significance >= 0.0) {
            return Err(DefectError::InvalidArgument(format!(
                "significance threshold must be non-negative, got {}",
                self.significance
            )));
        }
        Ok(())
    }
}

/// 原子位移
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Displacement {
    pub host_atom: String,
    pub defect_atom: String,
    /// 位移 (Å)
    pub distance: f64,
}

/// 键长变化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondVariation {
    /// 宿主晶胞中的键，如 `Cd(1)-S(2)`
    pub host_bond: String,
    pub defect_bond: String,
    /// 引入缺陷前的键长 (Å)
    pub host_length: f64,
    /// 引入缺陷后的键长 (Å)
    pub defect_length: f64,
    /// 绝对变化 (Å)
    pub absolute_change: f64,
    /// 相对变化 (%)
    pub relative_change: f64,
}

/// 比较结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryComparison {
    /// 配位球中心（笛卡尔坐标, Å）
    pub centers: Vec<[f64; 3]>,
    /// 配位球内的宿主位点数
    pub sphere_size: usize,
    pub displacements: Vec<Displacement>,
    pub bond_variations: Vec<BondVariation>,
    pub diagnostics: Vec<Diagnostic>,
}

/// 带标签的位点（分数坐标）
#[derive(Debug, Clone)]
struct Site {
    label: String,
    frac: [f64; 3],
}

/// 配位球内的宿主位点及其在缺陷晶胞中的对应位点（均为笛卡尔坐标）
#[derive(Debug, Clone)]
struct SpherePair {
    host: String,
    host_position: [f64; 3],
    defect: Option<(String, [f64; 3])>,
}

/// 宿主晶胞与缺陷晶胞的结构比较
#[derive(Debug, Clone)]
pub struct GeometryComparator<'a> {
    host: &'a Cell,
    defect_cell: &'a Cell,
    defects: &'a [Defect],
    settings: ComparisonSettings,
}

impl<'a> GeometryComparator<'a> {
    pub fn new(host: &'a Cell, defect_cell: &'a Cell, defects: &'a [Defect]) -> Self {
        Self {
            host,
            defect_cell,
            defects,
            settings: ComparisonSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ComparisonSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn compare(&self) -> Result<GeometryComparison> {
        self.settings.validate()?;
        if self.defects.is_empty() {
            return Err(DefectError::InvalidDefectSpecification(
                "geometry comparison needs at least one defect".to_string(),
            ));
        }

        let lattice = &self.host.lattice;
        let mut diagnostics: Vec<Diagnostic> = check_lattices(self.host, self.defect_cell)
            .into_iter()
            .collect();

        let (centers, host_sites, defect_sites) = self.sites()?;
        let pairs = self.sphere_pairs(&centers, &host_sites, &defect_sites);

        for pair in pairs.iter().filter(|p| p.defect.is_none()) {
            diagnostics.push(
                Diagnostic::MissingCorrespondence {
                    atom: pair.host.clone(),
                }
                .emit(),
            );
        }

        let displacements: Vec<Displacement> = pairs
            .iter()
            .filter_map(|pair| {
                let (defect_atom, position) = pair.defect.as_ref()?;
                Some(Displacement {
                    host_atom: pair.host.clone(),
                    defect_atom: defect_atom.clone(),
                    distance: distance(&pair.host_position, position),
                })
            })
            .collect();
        let bond_variations = self.bond_variations(&pairs);

        tracing::debug!(
            "Compared '{}' to '{}': {} site(s) in sphere, {} significant bond variation(s)",
            self.defect_cell.name,
            self.host.name,
            pairs.len(),
            bond_variations.len()
        );

        Ok(GeometryComparison {
            centers: centers.iter().map(|c| lattice.to_cartesian(c)).collect(),
            sphere_size: pairs.len(),
            displacements,
            bond_variations,
            diagnostics,
        })
    }

    /// 缺陷中心以及宿主、缺陷晶胞的位点（含虚拟位点）
    fn sites(&self) -> Result<(Vec<[f64; 3]>, Vec<Site>, Vec<Site>)> {
        let lattice = &self.host.lattice;
        let labelled = |cell: &Cell| -> Vec<Site> {
            cell.atoms
                .iter()
                .enumerate()
                .filter_map(|(i, atom)| {
                    Some(Site {
                        label: cell.label_of(i)?.compact(),
                        frac: atom.position,
                    })
                })
                .collect()
        };
        let mut host_sites = labelled(self.host);
        let mut defect_sites = labelled(self.defect_cell);

        let mut centers = Vec::with_capacity(self.defects.len());
        for (i, defect) in self.defects.iter().enumerate() {
            let cart = defect.position(self.host, self.defect_cell)?;
            let frac = lattice.to_fractional(&cart).ok_or_else(|| {
                DefectError::InvalidArgument(format!(
                    "host '{}' has a degenerate lattice",
                    self.host.name
                ))
            })?;
            let virtual_site = Site {
                label: format!("X({})", i + 1),
                frac,
            };
            match defect.kind() {
                DefectKind::Vacancy => defect_sites.push(virtual_site),
                DefectKind::Interstitial => host_sites.push(virtual_site),
                DefectKind::Substitutional => {}
            }
            centers.push(frac);
        }
        Ok((centers, host_sites, defect_sites))
    }

    fn sphere_pairs(&self, centers: &[[f64; 3]], host_sites: &[Site], defect_sites: &[Site]) -> Vec<SpherePair> {
        let lattice = &self.host.lattice;
        let mut pairs = Vec::new();

        for site in host_sites {
            // 最靠近某个中心的周期像
            let nearest = centers
                .iter()
                .map(|center| nearest_image(lattice, center, &site.frac, self.settings.sphere_radius))
                .fold(None, |best: Option<([f64; 3], f64)>, cand| match best {
                    Some(b) if b.1 <= cand.1 => Some(b),
                    _ => Some(cand),
                });
            let Some((translation, d)) = nearest else {
                continue;
            };
            if d >= self.settings.sphere_radius {
                continue;
            }

            let defect = defect_sites
                .iter()
                .map(|other| {
                    let (t, d) = nearest_image(
                        lattice,
                        &site.frac,
                        &other.frac,
                        self.settings.correspondence_radius,
                    );
                    (other, t, d)
                })
                .filter(|(_, _, d)| *d < self.settings.correspondence_radius)
                .min_by(|a, b| a.2.total_cmp(&b.2))
                .map(|(other, t, _)| {
                    let frac = add(&add(&other.frac, &t), &translation);
                    (other.label.clone(), lattice.to_cartesian(&frac))
                });

            pairs.push(SpherePair {
                host: site.label.clone(),
                host_position: lattice.to_cartesian(&add(&site.frac, &translation)),
                defect,
            });
        }
        pairs
    }

    fn bond_variations(&self, pairs: &[SpherePair]) -> Vec<BondVariation> {
        let mut variations = Vec::new();
        for (i, pair) in pairs.iter().enumerate() {
            let Some((defect_atom, defect_position)) = &pair.defect else {
                continue;
            };

            let mut neighbours: Vec<(usize, f64)> = pairs
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, other)| (j, distance(&pair.host_position, &other.host_position)))
                .collect();
            neighbours.sort_by(|a, b| a.1.total_cmp(&b.1));
            neighbours.truncate(NEAREST_NEIGHBOURS);

            for (j, host_length) in neighbours {
                let other = &pairs[j];
                let Some((other_defect, other_position)) = &other.defect else {
                    continue;
                };
                let defect_length = distance(defect_position, other_position);
                let relative_change = 100.0 * (defect_length - host_length) / host_length;
                if relative_change.abs() > self.settings.significance {
                    variations.push(BondVariation {
                        host_bond: format!("{}-{}", pair.host, other.host),
                        defect_bond: format!("{}-{}", defect_atom, other_defect),
                        host_length,
                        defect_length,
                        absolute_change: defect_length - host_length,
                        relative_change,
                    });
                }
            }
        }
        variations
    }
}

/// `point` 相对 `focus` 的最近周期像：返回平移矢量与距离 (Å)
///
/// 只考虑 `focus` 距晶胞表面小于 `cutoff` 时的相邻晶胞
fn nearest_image(lattice: &Lattice, focus: &[f64; 3], point: &[f64; 3], cutoff: f64) -> ([f64; 3], f64) {
    let origin = lattice.to_cartesian(focus);
    let direct = ([0.0; 3], distance(&origin, &lattice.to_cartesian(point)));
    next_cells(lattice, focus, cutoff)
        .into_iter()
        .map(|t| (t, distance(&origin, &lattice.to_cartesian(&add(point, &t)))))
        .fold(direct, |best, cand| if cand.1 < best.1 { cand } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Atom;

    /// 边长 10 Å 的晶胞中 2×2×2 的 Si 网格
    fn host() -> Cell {
        let atoms = (0..8)
            .map(|i| {
                let f = |bit: usize| if i & bit != 0 { 0.5 } else { 0.0 };
                Atom::new("Si", [f(4), f(2), f(1)])
            })
            .collect();
        Cell::new("Si8", Lattice::cubic(10.0), atoms)
    }

    /// 去掉原点处的 Si，(0.5, 0, 0) 处的原子沿 x 移动 `shift`（分数坐标）
    fn vacancy_cell(shift: f64) -> Cell {
        let mut atoms = host().atoms[1..].to_vec();
        atoms[3].position[0] += shift;
        Cell::new("V_Si", Lattice::cubic(10.0), atoms)
    }

    #[test]
    fn test_vacancy_relaxation() {
        let host = host();
        let defect_cell = vacancy_cell(-0.03);
        let defects = vec![Defect::vacancy("Si (1)", -5.0).unwrap()];
        let result = GeometryComparator::new(&host, &defect_cell, &defects)
            .compare()
            .unwrap();

        assert_eq!(result.sphere_size, 4);
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.centers, vec![[0.0, 0.0, 0.0]]);

        let vacancy = &result.displacements[0];
        assert_eq!((vacancy.host_atom.as_str(), vacancy.defect_atom.as_str()), ("Si(1)", "X(1)"));
        assert!(vacancy.distance.abs() < 1e-12);

        let moved = result
            .displacements
            .iter()
            .find(|d| d.host_atom == "Si(5)")
            .unwrap();
        assert_eq!(moved.defect_atom, "Si(4)");
        assert!((moved.distance - 0.3).abs() < 1e-9);

        // 只有 Si(1)-Si(5) 键缩短 6%，两个方向各报告一次
        assert_eq!(result.bond_variations.len(), 2);
        for bond in &result.bond_variations {
            assert!((bond.relative_change + 6.0).abs() < 1e-9);
            assert!((bond.host_length - 5.0).abs() < 1e-9);
            assert!((bond.absolute_change + 0.3).abs() < 1e-9);
        }
        assert_eq!(result.bond_variations[0].host_bond, "Si(1)-Si(5)");
        assert_eq!(result.bond_variations[0].defect_bond, "X(1)-Si(4)");
    }

    #[test]
    fn test_threshold_filters_small_changes() {
        let host = host();
        let defect_cell = vacancy_cell(-0.03);
        let defects = vec![Defect::vacancy("Si (1)", -5.0).unwrap()];
        let result = GeometryComparator::new(&host, &defect_cell, &defects)
            .with_settings(ComparisonSettings::default().with_significance(10.0))
            .compare()
            .unwrap();
        assert!(result.bond_variations.is_empty());
        assert_eq!(result.displacements.len(), 4);
    }

    #[test]
    fn test_missing_correspondence_reported() {
        let host = host();
        let defect_cell = vacancy_cell(-0.25);
        let defects = vec![Defect::vacancy("Si (1)", -5.0).unwrap()];
        let result = GeometryComparator::new(&host, &defect_cell, &defects)
            .compare()
            .unwrap();
        assert_eq!(
            result.diagnostics,
            vec![Diagnostic::MissingCorrespondence {
                atom: "Si(5)".to_string()
            }]
        );
        assert_eq!(result.displacements.len(), 3);
    }

    #[test]
    fn test_invalid_settings() {
        let host = host();
        let defect_cell = vacancy_cell(0.0);
        let defects = vec![Defect::vacancy("Si (1)", -5.0).unwrap()];
        let comparator = GeometryComparator::new(&host, &defect_cell, &defects)
            .with_settings(ComparisonSettings::default().with_sphere_radius(0.0));
        assert!(matches!(
            comparator.compare(),
            Err(DefectError::InvalidArgument(_))
        ));
        assert!(GeometryComparator::new(&host, &defect_cell, &[])
            .compare()
            .is_err());
    }
}
