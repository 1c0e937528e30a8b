//! # 元素参考化学势
//!
//! 拟合元素相参考能（FERE, fitted elemental-phase reference energies），
//! 可作为元素化学势的默认值。
//!
//! ## 数据来源
//! Stevanović et al., Phys. Rev. B 85, 115104 (2012)
//!
//! ## 依赖关系
//! - 被 `stability/domain.rs` 使用
//! - 纯静态数据，无外部依赖

use std::collections::HashMap;
use std::sync::LazyLock;

/// FERE 元素参考能 (eV/atom)
pub static FERE: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    [
        ("Ag", -0.83),
        ("Al", -3.02),
        ("As", -5.06),
        ("Au", -2.23),
        ("Ba", -1.39),
        ("Be", -3.4),
        ("Bi", -4.39),
        ("Ca", -1.64),
        ("Cd", -0.56),
        ("Cl", -1.63),
        ("Co", -4.75),
        ("Cr", -7.22),
        ("Cu", -1.97),
        ("F", -1.7),
        ("Fe", -6.15),
        ("Ga", -2.37),
        ("Ge", -4.14),
        ("Hf", -7.4),
        ("Hg", -0.12),
        ("In", -2.31),
        ("Ir", -5.96),
        ("K", -0.8),
        ("La", -3.66),
        ("Li", -1.65),
        ("Mg", -0.99),
        ("Mn", -7.0),
        ("N", -8.51),
        ("Na", -1.06),
        ("Nb", -6.69),
        ("Ni", -3.57),
        ("O", -4.73),
        ("P", -5.64),
        ("Pd", -3.12),
        ("Pt", -3.95),
        ("Rb", -0.68),
        ("Rh", -4.76),
        ("S", -4.0),
        ("Sb", -4.29),
        ("Sc", -4.63),
        ("Se", -3.55),
        ("Si", -4.99),
        ("Sn", -3.79),
        ("Sr", -1.17),
        ("Ta", -8.82),
        ("Te", -3.25),
        ("Ti", -5.52),
        ("V", -6.42),
        ("Y", -4.81),
        ("Zn", -0.84),
        ("Zr", -5.87),
    ]
    .into_iter()
    .collect()
});

/// 查询元素的 FERE 参考能
pub fn fere_energy(species: &str) -> Option<f64> {
    FERE.get(species).copied()
}
