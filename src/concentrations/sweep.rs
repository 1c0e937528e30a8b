//! # 温度扫描
//!
//! 在生长温度或室温的等间距网格上重复两温度求解。各温度点相互独立，
//! 在 rayon 线程池中并行计算，结果按温度排序返回，每个点各自携带求解结果。
//!
//! ## 依赖关系
//! - 使用 `concentrations/solver.rs` 的 ConcentrationsCalculation
//! - 使用 `rayon` 进行并行计算

use super::solver::{ConcentrationsCalculation, EquilibriumState};
use crate::error::{DefectError, Result};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// 温度网格 [start, stop]，步长 step（包含两端）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl SweepRange {
    pub fn new(start: f64, stop: f64, step: f64) -> Result<Self> {
        let range = Self { start, stop, step };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.start.is_finite() && self.start > 0.0) {
            return Err(DefectError::InvalidArgument(format!(
                "sweep must start at a positive temperature, got {}",
                self.start
            )));
        }
        if !(self.stop.is_finite() && self.stop >= self.start) {
            return Err(DefectError::InvalidArgument(format!(
                "sweep end {} is below its start {}",
                self.stop, self.start
            )));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(DefectError::InvalidArgument(format!(
                "sweep step must be positive, got {}",
                self.step
            )));
        }
        Ok(())
    }

    pub fn temperatures(&self) -> Vec<f64> {
        let n = ((self.stop - self.start) / self.step + 1e-9).floor() as usize + 1;
        (0..n).map(|i| self.start + self.step * i as f64).collect()
    }
}

/// 扫描的温度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepAxis {
    /// 扫描生长温度，室温固定
    Growth,
    /// 扫描室温，生长温度固定
    Room,
}

/// 扫描配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSweep {
    pub axis: SweepAxis,
    pub range: SweepRange,
    /// 另一个（固定的）温度 (K)
    pub fixed_temperature: f64,
    /// 并行作业数，0 表示使用全部 CPU
    pub jobs: usize,
}

impl TemperatureSweep {
    pub fn growth(range: SweepRange, room_temperature: f64) -> Self {
        Self {
            axis: SweepAxis::Growth,
            range,
            fixed_temperature: room_temperature,
            jobs: 0,
        }
    }

    pub fn room(growth_temperature: f64, range: SweepRange) -> Self {
        Self {
            axis: SweepAxis::Room,
            range,
            fixed_temperature: growth_temperature,
            jobs: 0,
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// (T_g, T_r)
    fn temperatures_at(&self, t: f64) -> (f64, f64) {
        match self.axis {
            SweepAxis::Growth => (t, self.fixed_temperature),
            SweepAxis::Room => (self.fixed_temperature, t),
        }
    }
}

/// 单个扫描点
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    /// 被扫描的温度 (K)
    pub temperature: f64,
    pub result: Result<EquilibriumState>,
}

impl ConcentrationsCalculation {
    /// 并行执行温度扫描，结果按温度升序排列
    pub fn sweep(&self, sweep: &TemperatureSweep) -> Result<Vec<SweepPoint>> {
        sweep.range.validate()?;
        let jobs = if sweep.jobs == 0 {
            num_cpus::get()
        } else {
            sweep.jobs
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| DefectError::ThreadPool(e.to_string()))?;

        let temperatures = sweep.range.temperatures();
        let mut points: Vec<SweepPoint> = pool.install(|| {
            temperatures
                .par_iter()
                .map(|&temperature| {
                    let (t_growth, t_room) = sweep.temperatures_at(temperature);
                    SweepPoint {
                        temperature,
                        result: self.solve(t_growth, t_room),
                    }
                })
                .collect()
        });
        points.sort_by(|a, b| a.temperature.total_cmp(&b.temperature));

        let failed = points.iter().filter(|p| p.result.is_err()).count();
        if failed > 0 {
            tracing::warn!(
                "{} of {} sweep point(s) failed to reach equilibrium",
                failed,
                points.len()
            );
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concentrations::DosModel;
    use crate::study::defect_study::tests::vacancy_study;
    use crate::study::MaterialStudy;

    #[test]
    fn test_range_temperatures() {
        let range = SweepRange::new(300.0, 1000.0, 100.0).unwrap();
        let t = range.temperatures();
        assert_eq!(t.len(), 8);
        assert_eq!(t[0], 300.0);
        assert_eq!(t[7], 1000.0);
        assert_eq!(SweepRange::new(500.0, 500.0, 10.0).unwrap().temperatures(), vec![500.0]);
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(SweepRange::new(0.0, 100.0, 10.0).is_err());
        assert!(SweepRange::new(500.0, 100.0, 10.0).is_err());
        assert!(SweepRange::new(100.0, 500.0, 0.0).is_err());
    }

    #[test]
    fn test_growth_sweep_is_ordered_and_matches_serial() {
        let study = MaterialStudy::from_studies(vec![vacancy_study(&[(1, -105.5)])]).unwrap();
        let calc =
            ConcentrationsCalculation::new(study, DosModel::Parabolic { m_e: 1.0, m_h: 1.0 })
                .unwrap();
        let range = SweepRange::new(600.0, 1000.0, 100.0).unwrap();
        let points = calc
            .sweep(&TemperatureSweep::growth(range, 300.0).with_jobs(3))
            .unwrap();

        let temperatures: Vec<f64> = points.iter().map(|p| p.temperature).collect();
        assert_eq!(temperatures, vec![600.0, 700.0, 800.0, 900.0, 1000.0]);
        for point in &points {
            assert_eq!(point.result, calc.solve(point.temperature, 300.0));
        }
    }

    #[test]
    fn test_failed_points_are_kept() {
        let study = MaterialStudy::from_studies(vec![vacancy_study(&[(-1, -106.0)])]).unwrap();
        let calc =
            ConcentrationsCalculation::new(study, DosModel::Parabolic { m_e: 1.0, m_h: 1.0 })
                .unwrap();
        let range = SweepRange::new(300.0, 400.0, 50.0).unwrap();
        let points = calc.sweep(&TemperatureSweep::room(1000.0, range)).unwrap();
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.result.is_err()));
    }
}
