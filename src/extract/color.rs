//! HSV 颜色直方图与颜色相关图
//!
//! 输入为 OpenCV 约定的 8 位 HSV 图像，形状 `(rows, cols, 3)`，H ∈ [0, 180)，S ∈ [0, 256)。

use ndarray::{Array1, Array2, ArrayView3};

/// H、S 两个通道的分箱数量
pub type Bins = (usize, usize);

const H_RANGE: usize = 180;
const S_RANGE: usize = 256;

#[inline(always)]
fn bin_of(h: u8, s: u8, (h_bins, s_bins): Bins) -> usize {
    let hi = (h as usize * h_bins / H_RANGE).min(h_bins - 1);
    let si = s as usize * s_bins / S_RANGE;
    hi * s_bins + si
}

/// 二维 H-S 直方图，展平为 `h_bins * s_bins` 长的向量并归一化到 [0, 1]
pub fn color_histogram(hsv: ArrayView3<u8>, bins: Bins) -> Array1<f32> {
    let mut hist = Array1::<f32>::zeros(bins.0 * bins.1);
    for px in hsv.rows() {
        hist[bin_of(px[0], px[1], bins)] += 1.;
    }
    normalize_min_max(&mut hist);
    hist
}

/// 颜色相关图：统计每个像素与其 3x3 邻域（含自身）内像素的颜色分箱共现次数
///
/// 结果为 `n * n` 的共现矩阵（`n = h_bins * s_bins`），展平后归一化到 [0, 1]
pub fn color_correlogram(hsv: ArrayView3<u8>, bins: Bins) -> Array1<f32> {
    let (rows, cols, _) = hsv.dim();
    let n = bins.0 * bins.1;
    let labels =
        Array2::from_shape_fn((rows, cols), |(i, j)| bin_of(hsv[[i, j, 0]], hsv[[i, j, 1]], bins));

    let mut grid = Array1::<f32>::zeros(n * n);
    for i in 0..rows {
        for j in 0..cols {
            let b1 = labels[[i, j]];
            for ni in i.saturating_sub(1)..=(i + 1).min(rows - 1) {
                for nj in j.saturating_sub(1)..=(j + 1).min(cols - 1) {
                    grid[b1 * n + labels[[ni, nj]]] += 1.;
                }
            }
        }
    }
    normalize_min_max(&mut grid);
    grid
}

/// 线性缩放到 [0, 1]，所有元素相等时全部置 0
pub fn normalize_min_max(v: &mut Array1<f32>) {
    let Some(min) = v.iter().copied().reduce(f32::min) else {
        return;
    };
    let max = v.iter().copied().fold(min, f32::max);
    let range = max - min;
    let scale = if range as f64 > f64::EPSILON { 1. / range } else { 0. };
    v.mapv_inplace(|x| (x - min) * scale);
}
