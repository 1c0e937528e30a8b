//! # 载流子态密度模型
//!
//! 价带/导带的态密度（单位 1/(eV·m³)）以及 Fermi–Dirac 占据，
//! 用于计算给定费米能级与温度下的空穴、电子浓度。
//!
//! 能量以宿主价带顶为零点，导带底位于修正后的带隙处。
//!
//! ## 依赖关系
//! - 被 `concentrations/solver.rs` 使用
//! - 使用 `models/calculation.rs` 的 Cell 与 DensityOfStates
//! - 使用 `utils/numeric.rs` 的 linspace 与 trapezoid

use crate::error::{DefectError, Result};
use crate::models::Cell;
use crate::utils::numeric::{linspace, trapezoid};

use serde::{Deserialize, Serialize};

/// 玻尔兹曼常数 (eV/K)
pub const BOLTZMANN: f64 = 8.617e-5;
/// 电子质量 (kg)
pub const ELECTRON_MASS: f64 = 9.109e-31;
/// 约化普朗克常数 (J·s)
pub const HBAR: f64 = 1.055e-34;
/// 元电荷 (C)
pub const ELEMENTARY_CHARGE: f64 = 1.602e-19;

/// 抛物线能带模型在每个能带上覆盖的能量范围 (eV)
const PARABOLIC_RANGE: f64 = 10.0;
/// 抛物线能带模型的能量步长 (eV)
const PARABOLIC_STEP: f64 = 1e-3;

/// 态密度来源
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DosModel {
    /// 抛物线能带，m_e 与 m_h 为以电子质量为单位的有效质量
    Parabolic { m_e: f64, m_h: f64 },
    /// 宿主晶胞的计算态密度
    Tabulated,
}

/// 抛物线能带的态密度 g(E) = (2m·m₀/ħ²)^{3/2}·√|E| / 2π²，单位 1/(eV·m³)
pub fn parabolic_dos(energy: f64, mass: f64) -> f64 {
    let prefactor = (2.0 * mass * ELECTRON_MASS / (HBAR * HBAR)).powf(1.5)
        / (2.0 * std::f64::consts::PI.powi(2));
    prefactor * (energy.abs() * ELEMENTARY_CHARGE).sqrt() * ELEMENTARY_CHARGE
}

/// Fermi–Dirac 占据
pub fn fermi_dirac(energy: f64, fermi_energy: f64, temperature: f64) -> f64 {
    let x = (energy - fermi_energy) / (BOLTZMANN * temperature);
    if x > 0.0 {
        let e = (-x).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + x.exp())
    }
}

/// 价带与导带的离散态密度
#[derive(Debug, Clone, PartialEq)]
pub struct CarrierBands {
    vb_energy: Vec<f64>,
    vb_dos: Vec<f64>,
    cb_energy: Vec<f64>,
    cb_dos: Vec<f64>,
}

impl CarrierBands {
    /// 按模型构造；`gap` 为修正后的带隙
    pub fn build(model: DosModel, host: &Cell, gap: f64) -> Result<Self> {
        match model {
            DosModel::Parabolic { m_e, m_h } => Self::parabolic(m_e, m_h, gap),
            DosModel::Tabulated => Self::tabulated(host, gap),
        }
    }

    /// 抛物线能带：价带 [−10, 0] eV，导带 [gap, gap + 10] eV
    pub fn parabolic(m_e: f64, m_h: f64, gap: f64) -> Result<Self> {
        for (name, mass) in [("electron", m_e), ("hole", m_h)] {
            if !(mass.is_finite() && mass > 0.0) {
                return Err(DefectError::InvalidArgument(format!(
                    "{} effective mass must be positive, got {}",
                    name, mass
                )));
            }
        }
        let n = (PARABOLIC_RANGE / PARABOLIC_STEP).round() as usize + 1;
        let vb_energy = linspace(-PARABOLIC_RANGE, 0.0, n);
        let cb_energy: Vec<f64> = linspace(0.0, PARABOLIC_RANGE, n)
            .into_iter()
            .map(|e| e + gap)
            .collect();

        Ok(Self {
            vb_dos: vb_energy.iter().map(|e| parabolic_dos(*e, m_h)).collect(),
            cb_dos: cb_energy.iter().map(|e| parabolic_dos(e - gap, m_e)).collect(),
            vb_energy,
            cb_energy,
        })
    }

    /// 宿主计算态密度：以价带顶为零点，导带平移到修正后的带隙，并除以晶胞体积
    pub fn tabulated(host: &Cell, gap: f64) -> Result<Self> {
        let dos = host
            .dos
            .as_ref()
            .ok_or_else(|| DefectError::missing(&host.name, "density of states"))?;
        if dos.energies.len() != dos.total.len() || dos.energies.len() < 2 {
            return Err(DefectError::missing(
                &host.name,
                format!(
                    "density of states ({} energies, {} values)",
                    dos.energies.len(),
                    dos.total.len()
                ),
            ));
        }

        let vbm = host.require_vbm()?;
        let host_gap = host.gap()?;
        let volume = host.lattice.volume_m3();
        let shift = gap - host_gap;

        let mut bands = Self {
            vb_energy: Vec::new(),
            vb_dos: Vec::new(),
            cb_energy: Vec::new(),
            cb_dos: Vec::new(),
        };
        for (energy, value) in dos.energies.iter().zip(&dos.total) {
            let energy = energy - vbm;
            if energy <= 0.0 {
                bands.vb_energy.push(energy);
                bands.vb_dos.push(value / volume);
            }
            if energy >= host_gap {
                bands.cb_energy.push(energy + shift);
                bands.cb_dos.push(value / volume);
            }
        }

        if bands.vb_energy.len() < 2 || bands.cb_energy.len() < 2 {
            return Err(DefectError::missing(
                &host.name,
                "density of states covering both band edges",
            ));
        }
        Ok(bands)
    }

    /// 空穴与电子浓度 (m⁻³)
    pub fn carriers(&self, fermi_energy: f64, temperature: f64) -> (f64, f64) {
        let holes: Vec<f64> = self
            .vb_energy
            .iter()
            .zip(&self.vb_dos)
            // 1 − f(E, E_F) = f(E_F, E)
            .map(|(e, g)| g * fermi_dirac(fermi_energy, *e, temperature))
            .collect();
        let electrons: Vec<f64> = self
            .cb_energy
            .iter()
            .zip(&self.cb_dos)
            .map(|(e, g)| g * fermi_dirac(*e, fermi_energy, temperature))
            .collect();
        (
            trapezoid(&self.vb_energy, &holes),
            trapezoid(&self.cb_energy, &electrons),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, DensityOfStates, Lattice};

    #[test]
    fn test_fermi_dirac_limits() {
        assert!((fermi_dirac(1.0, 1.0, 300.0) - 0.5).abs() < 1e-12);
        assert!(fermi_dirac(10.0, 0.0, 300.0) < 1e-100);
        assert!((fermi_dirac(-10.0, 0.0, 300.0) - 1.0).abs() < 1e-12);
        let x = fermi_dirac(1.05, 1.0, 500.0);
        assert!((x + fermi_dirac(0.95, 1.0, 500.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_parabolic_dos_free_electron() {
        // 1 eV 处自由电子态密度约 6.8e27 /(eV·m³)
        let g = parabolic_dos(1.0, 1.0);
        assert!((g / 6.8e27 - 1.0).abs() < 0.01);
        assert_eq!(parabolic_dos(-1.0, 1.0), g);
    }

    #[test]
    fn test_intrinsic_carriers_balance_at_midgap() {
        let bands = CarrierBands::parabolic(0.5, 0.5, 1.5).unwrap();
        let (holes, electrons) = bands.carriers(0.75, 600.0);
        assert!(holes > 0.0);
        assert!((holes / electrons - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_masses() {
        assert!(CarrierBands::parabolic(0.0, 1.0, 1.0).is_err());
        assert!(CarrierBands::parabolic(1.0, f64::NAN, 1.0).is_err());
    }

    fn host_with_dos(dos: Option<DensityOfStates>) -> Cell {
        let mut cell = Cell::new("host", Lattice::cubic(10.0), vec![Atom::new("Si", [0.0; 3])])
            .with_band_edges(0.0, 2.0);
        cell.dos = dos;
        cell
    }

    #[test]
    fn test_tabulated_split_and_shift() {
        let energies: Vec<f64> = (0..49).map(|i| -5.0 + 0.25 * i as f64).collect();
        let total: Vec<f64> = energies
            .iter()
            .map(|e| if *e <= 0.0 || *e >= 2.0 { 1.0 } else { 0.0 })
            .collect();
        let host = host_with_dos(Some(DensityOfStates { energies, total }));

        let bands = CarrierBands::tabulated(&host, 2.0).unwrap();
        assert_eq!(bands.vb_energy.len(), 21);
        assert_eq!(bands.cb_energy.len(), 21);
        assert!((bands.vb_dos[0] / 1e27 - 1.0).abs() < 1e-9);
        let (holes, electrons) = bands.carriers(1.0, 300.0);
        assert!((holes / electrons - 1.0).abs() < 1e-9);

        let wider = CarrierBands::tabulated(&host, 2.5).unwrap();
        assert!((wider.cb_energy[0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_tabulated_requires_dos() {
        let host = host_with_dos(None);
        assert!(matches!(
            CarrierBands::tabulated(&host, 2.0),
            Err(DefectError::DataUnavailable { .. })
        ));
    }
}
