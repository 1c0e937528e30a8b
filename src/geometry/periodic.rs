//! # 周期性边界工具
//!
//! 向量运算、缺陷周期像的位置以及靠近晶胞表面的原子需要考虑的相邻晶胞平移矢量。
//!
//! ## 依赖关系
//! - 被 `models/structure.rs` 使用（向量运算）
//! - 被 `corrections/alignment.rs` 与 `geometry/comparison.rs` 使用

use crate::models::structure::Lattice;

/// 势对齐中考虑的缺陷像平移（分数坐标）：自身、±c、±a、±b
pub const IMAGE_TRANSLATIONS: [[f64; 3]; 7] = [
    [0.0, 0.0, 0.0],
    [0.0, 0.0, -1.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, -1.0, 0.0],
    [0.0, 1.0, 0.0],
];

/// 向量叉积
pub fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// 向量点积
pub fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// 分数坐标转笛卡尔坐标
pub fn frac_to_cart(frac: &[f64; 3], matrix: &[[f64; 3]; 3]) -> [f64; 3] {
    [
        frac[0] * matrix[0][0] + frac[1] * matrix[1][0] + frac[2] * matrix[2][0],
        frac[0] * matrix[0][1] + frac[1] * matrix[1][1] + frac[2] * matrix[2][1],
        frac[0] * matrix[0][2] + frac[1] * matrix[1][2] + frac[2] * matrix[2][2],
    ]
}

pub fn add(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// 两点间的欧氏距离
pub fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let d = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
    dot(&d, &d).sqrt()
}

/// 缺陷及其 6 个相邻像的笛卡尔坐标
pub fn image_positions(lattice: &Lattice, center: &[f64; 3]) -> Vec<[f64; 3]> {
    IMAGE_TRANSLATIONS
        .iter()
        .map(|t| add(center, &lattice.to_cartesian(t)))
        .collect()
}

/// 点到一组中心的最小距离
pub fn min_distance(point: &[f64; 3], centers: &[[f64; 3]]) -> f64 {
    centers
        .iter()
        .map(|c| distance(point, c))
        .fold(f64::INFINITY, f64::min)
}

/// 原子在分数坐标下到某个晶胞面（axis = 0 或 1）的距离 (Å)
///
/// 把原子沿该轴投影到面上，再换算成笛卡尔距离
fn distance_to_face(lattice: &Lattice, frac: &[f64; 3], axis: usize, face: f64) -> f64 {
    let mut projected = *frac;
    projected[axis] = face;
    distance(
        &lattice.to_cartesian(frac),
        &lattice.to_cartesian(&projected),
    )
}

/// 靠近晶胞表面的原子需要考虑的相邻晶胞平移矢量（分数坐标）
///
/// 对每个距离小于 `cutoff` 的面给出一个单位平移，再加上它们的两两组合与三者之和，
/// 最多 7 个。不包含零平移。
pub fn next_cells(lattice: &Lattice, frac: &[f64; 3], cutoff: f64) -> Vec<[f64; 3]> {
    let mut faces = Vec::new();
    for axis in 0..3 {
        for (face, shift) in [(0.0, -1.0), (1.0, 1.0)] {
            if distance_to_face(lattice, frac, axis, face) < cutoff {
                let mut t = [0.0; 3];
                t[axis] = shift;
                faces.push(t);
            }
        }
    }

    let mut translations = faces.clone();
    for i in 0..faces.len() {
        for j in (i + 1)..faces.len() {
            translations.push(add(&faces[i], &faces[j]));
        }
    }
    if faces.len() == 3 {
        translations.push(add(&add(&faces[0], &faces[1]), &faces[2]));
    }
    translations
}
