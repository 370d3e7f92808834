use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{CbirError, Result};
use crate::similarity::Metric;

/// SIFT 描述符维数
pub const SIFT_WIDTH: usize = 128;
/// ORB 描述符维数（32 字节，按字节展开为 f32）
pub const ORB_WIDTH: usize = 32;

/// 特征类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeatureType {
    /// HSV 颜色直方图
    Histogram,
    /// HSV 颜色相关图
    Correlogram,
    /// SIFT 描述符
    Sift,
    /// ORB 描述符
    Orb,
}

impl FeatureType {
    pub const ALL: [FeatureType; 4] = [Self::Histogram, Self::Correlogram, Self::Sift, Self::Orb];

    /// 每种特征类型唯一绑定的距离度量
    pub fn metric(self) -> Metric {
        match self {
            Self::Histogram | Self::Correlogram => Metric::ChiSquareAlt,
            Self::Sift | Self::Orb => Metric::MeanNearestL2,
        }
    }

    /// 特征文件中的字段名
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Histogram => "ColorHistogram",
            Self::Correlogram => "ColorCorrelogram",
            Self::Sift => "SIFT",
            Self::Orb => "ORB",
        }
    }

    /// 描述符类特征的固定列数，直方图类返回 None
    pub fn descriptor_width(self) -> Option<usize> {
        match self {
            Self::Sift => Some(SIFT_WIDTH),
            Self::Orb => Some(ORB_WIDTH),
            Self::Histogram | Self::Correlogram => None,
        }
    }

    pub fn is_descriptor(self) -> bool {
        self.descriptor_width().is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Histogram => "HISTOGRAM",
            Self::Correlogram => "CORRELOGRAM",
            Self::Sift => "SIFT",
            Self::Orb => "ORB",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureType {
    type Err = CbirError;

    /// 同时接受 `HISTOGRAM` 和字段名 `ColorHistogram` 两种写法，不区分大小写
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|ty| {
                name.eq_ignore_ascii_case(ty.as_str()) || name.eq_ignore_ascii_case(ty.field_name())
            })
            .ok_or_else(|| CbirError::UnsupportedFeatureType(s.to_owned()))
    }
}

/// 一种特征的取值：直方图类为定长向量，描述符类为变长矩阵
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Vector(Array1<f32>),
    Matrix(Array2<f32>),
}

impl FeatureValue {
    pub fn view(&self) -> FeatureView<'_> {
        match self {
            Self::Vector(v) => FeatureView::Vector(v.view()),
            Self::Matrix(m) => FeatureView::Matrix(m.view()),
        }
    }
}

/// 特征值的借用视图
#[derive(Debug, Clone, Copy)]
pub enum FeatureView<'a> {
    Vector(ArrayView1<'a, f32>),
    Matrix(ArrayView2<'a, f32>),
}

impl FeatureView<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Vector(_) => "向量",
            Self::Matrix(_) => "矩阵",
        }
    }

    /// 向量长度或矩阵列数
    pub fn width(&self) -> usize {
        match self {
            Self::Vector(v) => v.len(),
            Self::Matrix(m) => m.ncols(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Vector(v) => v.shape(),
            Self::Matrix(m) => m.shape(),
        }
    }
}

/// 单张图片的全部特征
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub histogram: Array1<f32>,
    pub correlogram: Array1<f32>,
    pub sift: Array2<f32>,
    pub orb: Array2<f32>,
}

impl FeatureRecord {
    pub fn new(
        histogram: Array1<f32>,
        correlogram: Array1<f32>,
        sift: Array2<f32>,
        orb: Array2<f32>,
    ) -> Self {
        Self { histogram, correlogram, sift, orb }.with_descriptor_widths()
    }

    /// 由 4 个独立提取的特征值组装，形态不符时报错
    pub fn from_values(
        histogram: FeatureValue,
        correlogram: FeatureValue,
        sift: FeatureValue,
        orb: FeatureValue,
    ) -> Result<Self> {
        Ok(Self::new(
            expect_vector(FeatureType::Histogram, histogram)?,
            expect_vector(FeatureType::Correlogram, correlogram)?,
            expect_matrix(FeatureType::Sift, sift)?,
            expect_matrix(FeatureType::Orb, orb)?,
        ))
    }

    pub fn feature(&self, ty: FeatureType) -> FeatureView<'_> {
        match ty {
            FeatureType::Histogram => FeatureView::Vector(self.histogram.view()),
            FeatureType::Correlogram => FeatureView::Vector(self.correlogram.view()),
            FeatureType::Sift => FeatureView::Matrix(self.sift.view()),
            FeatureType::Orb => FeatureView::Matrix(self.orb.view()),
        }
    }

    /// 没有关键点时，描述符矩阵统一表示为 0 行、固定列数
    fn with_descriptor_widths(mut self) -> Self {
        if self.sift.nrows() == 0 {
            self.sift = Array2::zeros((0, SIFT_WIDTH));
        }
        if self.orb.nrows() == 0 {
            self.orb = Array2::zeros((0, ORB_WIDTH));
        }
        self
    }
}

fn expect_vector(feature: FeatureType, value: FeatureValue) -> Result<Array1<f32>> {
    match value {
        FeatureValue::Vector(v) => Ok(v),
        FeatureValue::Matrix(_) => {
            Err(CbirError::FeatureKindMismatch { feature, expected: "向量", actual: "矩阵" })
        }
    }
}

fn expect_matrix(feature: FeatureType, value: FeatureValue) -> Result<Array2<f32>> {
    match value {
        FeatureValue::Matrix(m) => Ok(m),
        FeatureValue::Vector(_) => {
            Err(CbirError::FeatureKindMismatch { feature, expected: "矩阵", actual: "向量" })
        }
    }
}
