use log::debug;
use ndarray::{ArrayView1, ArrayView2};

use crate::error::{CbirError, Result};
use crate::feature::{FeatureType, FeatureView};

/// 度量无定义时（例如描述符为空）使用的最差距离
pub const WORST_DISTANCE: f64 = f64::MAX;

/// 距离度量，距离越小越相似
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// 卡方距离的变体，用于直方图类特征
    ChiSquareAlt,
    /// 暴力最近邻匹配后的平均欧氏距离，用于描述符类特征
    MeanNearestL2,
}

impl Metric {
    /// 该度量接受的特征值形态
    pub fn accepts(self, value: &FeatureView) -> bool {
        matches!(
            (self, value),
            (Self::ChiSquareAlt, FeatureView::Vector(_))
                | (Self::MeanNearestL2, FeatureView::Matrix(_))
        )
    }

    fn expected_kind(self) -> &'static str {
        match self {
            Self::ChiSquareAlt => "向量",
            Self::MeanNearestL2 => "矩阵",
        }
    }
}

/// 检查特征值的形态是否与特征类型匹配
pub fn check_kind(ty: FeatureType, value: &FeatureView) -> Result<()> {
    let metric = ty.metric();
    if metric.accepts(value) {
        Ok(())
    } else {
        Err(CbirError::FeatureKindMismatch {
            feature: ty,
            expected: metric.expected_kind(),
            actual: value.kind(),
        })
    }
}

/// 计算两个同类型特征值之间的距离
pub fn distance(ty: FeatureType, query: FeatureView, stored: FeatureView) -> Result<f64> {
    check_kind(ty, &query)?;
    check_kind(ty, &stored)?;
    match (query, stored) {
        (FeatureView::Vector(a), FeatureView::Vector(b)) => chi_square_alt(ty, a, b),
        (FeatureView::Matrix(a), FeatureView::Matrix(b)) => mean_nearest_l2(ty, a, b),
        _ => unreachable!("feature kind checked above"),
    }
}

/// 批量打分时使用：任何单条记录上的度量错误都替换为 [`WORST_DISTANCE`]
pub fn score(ty: FeatureType, query: FeatureView, stored: FeatureView) -> f64 {
    match distance(ty, query, stored) {
        Ok(d) if d.is_nan() => WORST_DISTANCE,
        Ok(d) => d,
        Err(e) => {
            debug!("{} 距离无定义，按最差处理: {}", ty, e);
            WORST_DISTANCE
        }
    }
}

/// 卡方距离变体：`2 * Σ (a - b)² / (a + b)`
///
/// `a + b` 接近 0 的项直接跳过，因此两个全零向量的距离为 0
pub fn chi_square_alt(ty: FeatureType, a: ArrayView1<f32>, b: ArrayView1<f32>) -> Result<f64> {
    if a.len() != b.len() {
        return Err(CbirError::DimensionMismatch {
            feature: ty,
            expected: a.len(),
            actual: b.len(),
        });
    }
    let mut sum = 0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        let s = x + y;
        if s.abs() > f64::EPSILON {
            let d = x - y;
            sum += d * d / s;
        }
    }
    Ok(2. * sum)
}

/// 对 `query` 中的每个描述符，在 `train` 中寻找欧氏距离最近的描述符，返回这些最近距离的平均值
pub fn mean_nearest_l2(
    ty: FeatureType,
    query: ArrayView2<f32>,
    train: ArrayView2<f32>,
) -> Result<f64> {
    if query.nrows() == 0 || train.nrows() == 0 {
        return Err(CbirError::EmptyDescriptors);
    }
    if query.ncols() != train.ncols() {
        return Err(CbirError::DimensionMismatch {
            feature: ty,
            expected: query.ncols(),
            actual: train.ncols(),
        });
    }

    let mut total = 0f64;
    for q in query.rows() {
        let mut best = f32::MAX;
        for t in train.rows() {
            let d = squared_l2(q, t);
            if d < best {
                best = d;
            }
        }
        total += (best as f64).sqrt();
    }
    Ok(total / query.nrows() as f64)
}

#[inline(always)]
fn squared_l2(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    match (a.as_slice(), b.as_slice()) {
        (Some(a), Some(b)) => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
        _ => a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum(),
    }
}
