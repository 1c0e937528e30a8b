//! # 平衡缺陷与载流子浓度
//!
//! 自洽求解电中性方程 n_h − n_e + Σ q·c_defect = 0，得到平衡费米能级，
//! 再按两温度（淬火）模型计算室温下的载流子与缺陷浓度：
//!
//! 1. 生长温度 T_g 下求解，得到 E_F(T_g)、各缺陷浓度以及缺陷总电荷
//! 2. 保持缺陷总电荷不变，在室温 T_r 下重新求解，得到 E_F(T_r) 与载流子浓度
//!
//! 缺陷浓度取稀释极限：c = N_sites·exp(−E_form/k_B·T)/V_cell，
//! 电荷取费米能级处形成能最低的电荷态。
//!
//! ## 依赖关系
//! - 使用 `concentrations/dos.rs` 的 CarrierBands
//! - 使用 `study/material_study.rs` 的 MaterialStudy
//! - 使用 `utils/numeric.rs` 的 Brent 求根

use super::dos::{CarrierBands, DosModel, BOLTZMANN};
use crate::error::{DefectError, Result};
use crate::study::MaterialStudy;
use crate::utils::numeric::{brent, BrentOptions, RootError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// m⁻³ 到 cm⁻³ 的换算系数
pub const PER_M3_TO_PER_CM3: f64 = 1e-6;

/// 求根配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// 费米能级的绝对容差 (eV)
    pub tolerance: f64,
    pub max_iterations: usize,
    /// 单次求解的时限
    pub deadline: Option<Duration>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 200,
            deadline: None,
        }
    }
}

impl SolverSettings {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// 两温度模型的求解结果，浓度单位 cm⁻³
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumState {
    pub growth_temperature: f64,
    pub room_temperature: f64,
    /// 生长温度下的平衡费米能级 (eV，相对价带顶)
    pub fermi_growth: f64,
    /// 室温下的平衡费米能级 (eV)
    pub fermi_room: f64,
    /// 室温空穴浓度
    pub holes: f64,
    /// 室温电子浓度
    pub electrons: f64,
    /// 生长温度下冻结的各缺陷浓度，键为缺陷研究标识符
    pub defects: BTreeMap<String, f64>,
    /// 冻结的缺陷总电荷 Σ q·c (e·cm⁻³)
    pub frozen_charge: f64,
}

/// 浓度计算：绑定一个材料研究与一个态密度模型
#[derive(Debug, Clone)]
pub struct ConcentrationsCalculation {
    study: MaterialStudy,
    model: DosModel,
    bands: CarrierBands,
    /// (研究标识符, 位点数)，与 `study.studies()` 顺序一致
    sites: Vec<(String, f64)>,
    gap: f64,
    volume: f64,
    settings: SolverSettings,
}

impl ConcentrationsCalculation {
    pub fn new(study: MaterialStudy, model: DosModel) -> Result<Self> {
        if study.is_empty() {
            return Err(DefectError::InvalidArgument(format!(
                "material study of '{}' has no defect study",
                study.host().name
            )));
        }

        let mut sites = Vec::with_capacity(study.len());
        for (id, defect_study) in study.studies() {
            if defect_study.is_empty() {
                return Err(DefectError::InvalidDefectSpecification(format!(
                    "defect study '{}' has no charge state",
                    id
                )));
            }
            sites.push((id.clone(), defect_study.sites()?));
        }

        let host = study.host();
        let volume = host.lattice.volume_m3();
        if !(volume.is_finite() && volume > 0.0) {
            return Err(DefectError::InvalidArgument(format!(
                "host '{}' has a degenerate lattice",
                host.name
            )));
        }
        let gap = study.gap()?;
        let bands = CarrierBands::build(model, host, gap)?;

        Ok(Self {
            study,
            model,
            bands,
            sites,
            gap,
            volume,
            settings: SolverSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn study(&self) -> &MaterialStudy {
        &self.study
    }

    pub fn model(&self) -> DosModel {
        self.model
    }

    pub fn gap(&self) -> f64 {
        self.gap
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// 空穴与电子浓度 (m⁻³)
    pub fn carriers(&self, fermi_energy: f64, temperature: f64) -> (f64, f64) {
        self.bands.carriers(fermi_energy, temperature)
    }

    /// 各缺陷研究的 (标识符, 电荷, 浓度 m⁻³)
    pub fn defect_concentrations(&self, fermi_energy: f64, temperature: f64) -> Vec<(String, i32, f64)> {
        self.study
            .studies()
            .zip(&self.sites)
            .filter_map(|((id, study), (_, sites))| {
                let point = study.lower_envelope(fermi_energy)?;
                let concentration =
                    sites * (-point.energy / (BOLTZMANN * temperature)).exp() / self.volume;
                Some((id.clone(), point.charge, concentration))
            })
            .collect()
    }

    /// 缺陷总电荷 Σ q·c (e·m⁻³)
    pub fn defect_charge(&self, fermi_energy: f64, temperature: f64) -> f64 {
        self.defect_concentrations(fermi_energy, temperature)
            .iter()
            .map(|(_, q, c)| *q as f64 * c)
            .sum()
    }

    /// 电中性残差 n_h − n_e + Σ q·c；`frozen_charge` 给定时代替缺陷电荷
    pub fn neutrality(&self, fermi_energy: f64, temperature: f64, frozen_charge: Option<f64>) -> f64 {
        let (holes, electrons) = self.carriers(fermi_energy, temperature);
        let defects =
            frozen_charge.unwrap_or_else(|| self.defect_charge(fermi_energy, temperature));
        holes - electrons + defects
    }

    /// 在 (0, gap) 内求平衡费米能级
    pub fn solve_fermi_level(&self, temperature: f64, frozen_charge: Option<f64>) -> Result<f64> {
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(DefectError::InvalidArgument(format!(
                "temperature must be positive, got {}",
                temperature
            )));
        }

        let options = BrentOptions {
            tolerance: self.settings.tolerance,
            max_iterations: self.settings.max_iterations,
            deadline: self.settings.deadline.map(|d| Instant::now() + d),
        };
        let residual = |e: f64| self.neutrality(e, temperature, frozen_charge);

        brent(residual, 0.0, self.gap, &options).map_err(|err| match err {
            RootError::DeadlineExceeded => DefectError::DeadlineExceeded {
                temperature,
                deadline_ms: self
                    .settings
                    .deadline
                    .map(|d| d.as_millis())
                    .unwrap_or_default(),
            },
            other => DefectError::NoEquilibriumRoot {
                temperature,
                reason: other.to_string(),
            },
        })
    }

    /// 两温度模型
    pub fn solve(&self, growth_temperature: f64, room_temperature: f64) -> Result<EquilibriumState> {
        let fermi_growth = self.solve_fermi_level(growth_temperature, None)?;
        let defects = self.defect_concentrations(fermi_growth, growth_temperature);
        let frozen_charge: f64 = defects.iter().map(|(_, q, c)| *q as f64 * c).sum();

        let fermi_room = self.solve_fermi_level(room_temperature, Some(frozen_charge))?;
        let (holes, electrons) = self.carriers(fermi_room, room_temperature);

        tracing::debug!(
            "Equilibrium at T_g = {} K, T_r = {} K: E_F = {:.4} / {:.4} eV",
            growth_temperature,
            room_temperature,
            fermi_growth,
            fermi_room
        );

        Ok(EquilibriumState {
            growth_temperature,
            room_temperature,
            fermi_growth,
            fermi_room,
            holes: holes * PER_M3_TO_PER_CM3,
            electrons: electrons * PER_M3_TO_PER_CM3,
            defects: defects
                .into_iter()
                .map(|(id, _, c)| (id, c * PER_M3_TO_PER_CM3))
                .collect(),
            frozen_charge: frozen_charge * PER_M3_TO_PER_CM3,
        })
    }
}
