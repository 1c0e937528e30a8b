//! # 能带填充（Moss–Burstein）修正
//!
//! 以 ΔV 对齐后的宿主能带边为参考，统计缺陷晶胞中导带底以上的电子与价带顶以下的空穴，
//! 以及相应的能量修正。
//!
//! ## 依赖关系
//! - 被 `corrections/pipeline.rs` 使用
//! - 使用 `utils/numeric.rs` 的 heaviside

use crate::models::BandOccupations;
use crate::utils::numeric::heaviside;

use serde::{Deserialize, Serialize};

/// 能带填充结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandFilling {
    /// 受主（空穴）修正 (eV)
    pub acceptor_energy: f64,
    /// 施主（电子）修正 (eV)
    pub donor_energy: f64,
    /// 价带中的空穴数
    pub holes: f64,
    /// 导带中的电子数
    pub electrons: f64,
}

impl BandFilling {
    /// 是否存在自由载流子
    pub fn has_carriers(&self) -> bool {
        self.holes != 0.0 || self.electrons != 0.0
    }

    /// 修正总和
    pub fn total(&self) -> f64 {
        self.acceptor_energy + self.donor_energy
    }
}

/// 计算能带填充修正
///
/// `vbm`、`cbm` 为宿主能带边，`delta_v` 为势对齐。自旋极化时每个通道单独列出，
/// 单个能带的最大占据数为 1。
pub fn band_filling(bands: &BandOccupations, vbm: f64, cbm: f64, delta_v: f64) -> BandFilling {
    let vbm_aligned = vbm + delta_v;
    let cbm_aligned = cbm + delta_v;
    let max_occupation = bands.max_occupation();

    let mut result = BandFilling::default();
    for kpoint in &bands.kpoints {
        let w = kpoint.weight;
        for (&energy, &occupation) in kpoint.energies.iter().zip(&kpoint.occupations) {
            let above_cbm = heaviside(energy - cbm_aligned);
            let below_vbm = heaviside(vbm_aligned - energy);
            let empty = max_occupation - occupation;

            result.electrons += w * occupation * above_cbm;
            result.holes += w * empty * below_vbm;
            result.donor_energy -= w * occupation * (energy - cbm_aligned) * above_cbm;
            result.acceptor_energy -= w * empty * (vbm_aligned - energy) * below_vbm;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KpointBands;

    fn bands(spin_polarized: bool, kpoints: Vec<KpointBands>) -> BandOccupations {
        BandOccupations {
            spin_polarized,
            kpoints,
        }
    }

    #[test]
    fn test_no_carriers_in_clean_gap() {
        let b = bands(
            false,
            vec![KpointBands {
                weight: 1.0,
                energies: vec![-1.0, 0.0, 2.0],
                occupations: vec![2.0, 2.0, 0.0],
            }],
        );
        let r = band_filling(&b, 0.5, 1.5, 0.0);
        assert!(!r.has_carriers());
        assert_eq!(r.total(), 0.0);
    }

    #[test]
    fn test_electrons_in_conduction_band() {
        let b = bands(
            false,
            vec![
                KpointBands {
                    weight: 0.5,
                    energies: vec![0.0, 1.7],
                    occupations: vec![2.0, 0.4],
                },
                KpointBands {
                    weight: 0.5,
                    energies: vec![0.0, 1.9],
                    occupations: vec![2.0, 0.2],
                },
            ],
        );
        // CBM' = 1.5 + 0.1
        let r = band_filling(&b, 0.5, 1.5, 0.1);
        assert!((r.electrons - 0.3).abs() < 1e-12);
        let expected = -(0.5 * 0.4 * 0.1 + 0.5 * 0.2 * 0.3);
        assert!((r.donor_energy - expected).abs() < 1e-12);
        assert_eq!(r.holes, 0.0);
    }

    #[test]
    fn test_holes_spin_polarized() {
        let b = bands(
            true,
            vec![
                KpointBands {
                    weight: 1.0,
                    energies: vec![0.2],
                    occupations: vec![0.5],
                },
                KpointBands {
                    weight: 1.0,
                    energies: vec![0.2],
                    occupations: vec![1.0],
                },
            ],
        );
        let r = band_filling(&b, 0.5, 1.5, 0.0);
        assert!((r.holes - 0.5).abs() < 1e-12);
        assert!((r.acceptor_energy - (-0.15)).abs() < 1e-12);
    }

    #[test]
    fn test_state_on_band_edge_counts_half() {
        let b = bands(
            false,
            vec![KpointBands {
                weight: 1.0,
                energies: vec![1.5],
                occupations: vec![1.0],
            }],
        );
        let r = band_filling(&b, 0.5, 1.5, 0.0);
        assert!((r.electrons - 0.5).abs() < 1e-12);
    }
}
