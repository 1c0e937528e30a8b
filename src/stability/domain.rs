//! # 化学势稳定区域
//!
//! 宿主化合物相对所有竞争相稳定的化学势区域：二元宿主为一条线段，
//! 三元及以上宿主为二维凸多边形（其余元素的化学势由调用方固定）。
//!
//! 多边形顶点由约束线两两求交得到，只保留满足全部约束（容差 0.01 eV）的交点，
//! 最后按绕质心的极角排序。所有遍历均按相名称排序，结果与输入顺序无关。
//!
//! ## 依赖关系
//! - 使用 `stability/constraint.rs` 计算约束
//! - 使用 `stability/references.rs` 的 FERE 参考能
//! - 使用 `utils/diagnostics.rs` 报告被丢弃的退化约束

use super::constraint::{
    coefficients, fixed_sum, format_number, format_term, reduced_energy, Constraint, Side,
    StabilityAxes,
};
use super::references::FERE;
use crate::error::{DefectError, Result};
use crate::models::Cell;
use crate::utils::Diagnostic;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// 退化约束（两个系数都为零）的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegeneratePolicy {
    /// 丢弃该约束并给出诊断
    #[default]
    Drop,
    /// 返回 `FrontierDegenerate` 错误
    Fail,
}

/// 稳定区域求解配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilitySettings {
    /// 坐标轴，`None` 时按宿主元素顺序选择
    pub axes: Option<StabilityAxes>,
    /// 非坐标轴元素的固定化学势 (eV)
    pub fixed: BTreeMap<String, f64>,
    /// 顶点可行性容差 (eV)
    pub tolerance: f64,
    pub degenerate_policy: DegeneratePolicy,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            axes: None,
            fixed: BTreeMap::new(),
            tolerance: 0.01,
            degenerate_policy: DegeneratePolicy::Drop,
        }
    }
}

impl StabilitySettings {
    pub fn with_axes(mut self, axes: StabilityAxes) -> Self {
        self.axes = Some(axes);
        self
    }

    pub fn with_fixed(mut self, species: impl Into<String>, mu: f64) -> Self {
        self.fixed.insert(species.into(), mu);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_degenerate_policy(mut self, policy: DegeneratePolicy) -> Self {
        self.degenerate_policy = policy;
        self
    }
}

/// 稳定区域
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StabilityDomain {
    /// 二元宿主：μ_axis ∈ [low, high]
    Interval {
        axis: String,
        low: f64,
        high: f64,
        lower_phase: String,
        upper_phase: String,
    },
    /// 多元宿主：逆时针排列的多边形顶点 (μ_X, μ_Y)
    Polygon {
        x_axis: String,
        y_axis: String,
        vertices: Vec<[f64; 2]>,
    },
}

/// 求解结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainReport {
    pub axes: StabilityAxes,
    pub domain: StabilityDomain,
    /// 参与求解的约束（按相名称排序）
    pub constraints: Vec<Constraint>,
    pub inequalities: Vec<String>,
    /// 因变量元素的化学势表达式
    pub constraint_equation: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// 宿主化合物与竞争相
#[derive(Debug, Clone)]
pub struct ChemicalPotentials {
    host: Arc<Cell>,
    phases: BTreeMap<String, Arc<Cell>>,
    /// 元素参考能 μ⁰；设置后能量与化学势均相对参考能 (Δμ)
    references: Option<BTreeMap<String, f64>>,
}

impl ChemicalPotentials {
    pub fn new(host: Arc<Cell>) -> Self {
        Self {
            host,
            phases: BTreeMap::new(),
            references: None,
        }
    }

    /// 添加竞争相，以晶胞名称为标识
    pub fn add_phase(&mut self, phase: Arc<Cell>) -> Result<()> {
        if phase.name == self.host.name {
            return Err(DefectError::InvalidArgument(format!(
                "competing phase '{}' has the host's name",
                phase.name
            )));
        }
        if self.phases.contains_key(&phase.name) {
            return Err(DefectError::InvalidArgument(format!(
                "competing phase '{}' added twice",
                phase.name
            )));
        }
        self.phases.insert(phase.name.clone(), phase);
        Ok(())
    }

    pub fn with_phase(mut self, phase: Arc<Cell>) -> Result<Self> {
        self.add_phase(phase)?;
        Ok(self)
    }

    pub fn remove_phase(&mut self, name: &str) -> Option<Arc<Cell>> {
        self.phases.remove(name)
    }

    /// 使用给定的元素参考能 (Δμ 模式)
    pub fn with_references(mut self, references: BTreeMap<String, f64>) -> Self {
        self.references = Some(references);
        self
    }

    /// 使用 FERE 元素参考能 (Δμ 模式)
    pub fn with_fere_references(self) -> Self {
        let references = FERE.iter().map(|(s, e)| (s.to_string(), *e)).collect();
        self.with_references(references)
    }

    pub fn host(&self) -> &Arc<Cell> {
        &self.host
    }

    pub fn phases(&self) -> impl Iterator<Item = &Arc<Cell>> {
        self.phases.values()
    }

    /// 求解稳定区域
    pub fn solve(&self, settings: &StabilitySettings) -> Result<DomainReport> {
        let axes = match &settings.axes {
            Some(axes) => axes.clone(),
            None => StabilityAxes::default_for(&self.host)?,
        };
        axes.validate(&self.host)?;

        if self.phases.is_empty() {
            return Err(self.empty("no competing phase was given"));
        }

        let references = self.references.as_ref();
        let constraint_equation = self.constraint_equation(&axes, settings)?;

        let mut constraints = Vec::new();
        let mut diagnostics = Vec::new();
        for (name, phase) in &self.phases {
            let (a_x, a_y, c) =
                coefficients(&self.host, phase, &axes, &settings.fixed, references)?;
            match Constraint::classify(name.clone(), a_x, a_y, c) {
                Some(constraint) => constraints.push(constraint),
                None => match settings.degenerate_policy {
                    DegeneratePolicy::Fail => {
                        return Err(DefectError::FrontierDegenerate {
                            phase: name.clone(),
                        })
                    }
                    DegeneratePolicy::Drop => diagnostics.push(
                        Diagnostic::FrontierDegenerate {
                            phase: name.clone(),
                        }
                        .emit(),
                    ),
                },
            }
        }

        let domain = if axes.is_binary() {
            self.interval(&axes, &constraints)?
        } else {
            self.polygon(&axes, &constraints, settings.tolerance)?
        };

        tracing::debug!(
            "Stability domain of '{}' from {} constraint(s): {:?}",
            self.host.name,
            constraints.len(),
            domain
        );

        Ok(DomainReport {
            inequalities: constraints.iter().map(|c| c.inequality(&axes)).collect(),
            axes,
            domain,
            constraints,
            constraint_equation,
            diagnostics,
        })
    }

    fn empty(&self, reason: impl Into<String>) -> DefectError {
        DefectError::EmptyStabilityDomain {
            host: self.host.name.clone(),
            reason: reason.into(),
        }
    }

    /// μ_c = (E_H − S_H − n_X·μ_X − n_Y·μ_Y) / n_c
    fn constraint_equation(&self, axes: &StabilityAxes, settings: &StabilitySettings) -> Result<String> {
        let host = &self.host;
        let n_c = host.count_of(&axes.dependent) as f64;
        let constant = (reduced_energy(host, self.references.as_ref())?
            - fixed_sum(host, axes, &settings.fixed)?)
            / n_c;

        let mut equation = format!("mu_{} = {}", axes.dependent, format_number(constant));
        if let Some(x) = &axes.x {
            equation.push_str(&format_term(-(host.count_of(x) as f64) / n_c, x));
        }
        equation.push_str(&format_term(
            -(host.count_of(&axes.y) as f64) / n_c,
            &axes.y,
        ));
        Ok(equation)
    }

    fn interval(&self, axes: &StabilityAxes, constraints: &[Constraint]) -> Result<StabilityDomain> {
        let bound = |side: Side| {
            constraints
                .iter()
                .filter(move |c| c.side == side)
                .map(|c| (c.phase.clone(), c.c / c.a_y))
        };

        let lower = bound(Side::Below).fold(None, |best: Option<(String, f64)>, item| match best {
            Some(b) if b.1 >= item.1 => Some(b),
            _ => Some(item),
        });
        let upper = bound(Side::Above).fold(None, |best: Option<(String, f64)>, item| match best {
            Some(b) if b.1 <= item.1 => Some(b),
            _ => Some(item),
        });

        let (lower_phase, low) = lower.ok_or_else(|| {
            self.empty(format!("no competing phase bounds mu_{} from below", axes.y))
        })?;
        let (upper_phase, high) = upper.ok_or_else(|| {
            self.empty(format!("no competing phase bounds mu_{} from above", axes.y))
        })?;

        if low > high {
            return Err(self.empty(format!(
                "lower bound {:.3} eV ({}) exceeds upper bound {:.3} eV ({})",
                low, lower_phase, high, upper_phase
            )));
        }

        Ok(StabilityDomain::Interval {
            axis: axes.y.clone(),
            low,
            high,
            lower_phase,
            upper_phase,
        })
    }

    fn polygon(
        &self,
        axes: &StabilityAxes,
        constraints: &[Constraint],
        tolerance: f64,
    ) -> Result<StabilityDomain> {
        if is_unbounded(constraints) {
            return Err(self.empty("the competing phases leave the domain unbounded"));
        }

        let mut vertices: Vec<[f64; 2]> = Vec::new();
        for (i, first) in constraints.iter().enumerate() {
            for second in &constraints[i + 1..] {
                let Some(point) = intersection(first, second) else {
                    continue;
                };
                let feasible = constraints
                    .iter()
                    .all(|c| c.admits(point[0], point[1], tolerance));
                let duplicate = vertices
                    .iter()
                    .any(|v| (v[0] - point[0]).abs() < 1e-6 && (v[1] - point[1]).abs() < 1e-6);
                if feasible && !duplicate {
                    vertices.push(point);
                }
            }
        }

        if vertices.len() < 3 {
            return Err(self.empty(format!(
                "only {} feasible vertex(es) found",
                vertices.len()
            )));
        }

        sort_by_polar_angle(&mut vertices);

        Ok(StabilityDomain::Polygon {
            x_axis: axes.x.clone().unwrap_or_default(),
            y_axis: axes.y.clone(),
            vertices,
        })
    }
}

/// 允许区是否无界：存在方向 d ≠ 0 使所有 a·d ≤ 0
///
/// 若存在这样的方向，其中必有一个与某条约束线平行，因此只需检查各约束线的两个方向
fn is_unbounded(constraints: &[Constraint]) -> bool {
    constraints.iter().any(|line| {
        [[-line.a_y, line.a_x], [line.a_y, -line.a_x]]
            .iter()
            .any(|d| {
                constraints
                    .iter()
                    .all(|c| c.a_x * d[0] + c.a_y * d[1] <= 1e-12)
            })
    })
}

/// 两条约束线的交点
///
/// 行列式相对过小时改用二分法在有界区间内求交
fn intersection(first: &Constraint, second: &Constraint) -> Option<[f64; 2]> {
    let det = first.a_x * second.a_y - second.a_x * first.a_y;
    let scale = first.a_x.hypot(first.a_y) * second.a_x.hypot(second.a_y);
    if det == 0.0 {
        return None;
    }
    if det.abs() > 1e-9 * scale {
        let x = (first.c * second.a_y - second.c * first.a_y) / det;
        let y = (first.a_x * second.c - second.a_x * first.c) / det;
        return Some([x, y]);
    }
    bisect_intersection(first, second)
}

/// 化学势的搜索范围 (eV)
const BISECTION_WINDOW: f64 = 1.0e3;

fn bisect_intersection(first: &Constraint, second: &Constraint) -> Option<[f64; 2]> {
    let gap = |x: f64| Some(first.frontier(x)? - second.frontier(x)?);
    let (mut low, mut high) = (-BISECTION_WINDOW, BISECTION_WINDOW);
    let mut f_low = gap(low)?;
    let f_high = gap(high)?;
    if f_low.signum() == f_high.signum() {
        return None;
    }
    for _ in 0..200 {
        let mid = 0.5 * (low + high);
        let f_mid = gap(mid)?;
        if f_mid.signum() == f_low.signum() {
            low = mid;
            f_low = f_mid;
        } else {
            high = mid;
        }
    }
    let x = 0.5 * (low + high);
    Some([x, first.frontier(x)?])
}

/// 按绕质心的极角（逆时针）排序
fn sort_by_polar_angle(vertices: &mut [[f64; 2]]) {
    let n = vertices.len() as f64;
    let cx = vertices.iter().map(|v| v[0]).sum::<f64>() / n;
    let cy = vertices.iter().map(|v| v[1]).sum::<f64>() / n;
    vertices.sort_by(|a, b| {
        let ta = (a[1] - cy).atan2(a[0] - cx);
        let tb = (b[1] - cy).atan2(b[0] - cx);
        ta.total_cmp(&tb)
    });
}
