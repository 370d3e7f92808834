//! 特征提取器接口
//!
//! 检索引擎本身不关心图片如何解码、特征如何计算，只通过 [`FeatureExtractor`] 获取特征。

pub mod color;
#[cfg(feature = "opencv")]
mod cv;

use std::path::Path;

#[cfg(feature = "opencv")]
pub use self::cv::OpenCvExtractor;
use crate::config::ExtractOptions;
use crate::error::{CbirError, Result};
use crate::feature::{FeatureRecord, FeatureType, FeatureValue};

/// 特征提取器
///
/// 同一个提取器会被多个线程同时用于处理不同的图片，因此要求 `Sync`
pub trait FeatureExtractor: Sync {
    /// 解码后的图片
    type Image;

    /// 从文件解码图片，失败时返回 [`CbirError::UnreadableImage`]
    fn decode(&self, path: &Path) -> Result<Self::Image>;

    /// 从内存解码图片
    fn decode_bytes(&self, bytes: &[u8]) -> Result<Self::Image>;

    /// 提取一种特征
    fn extract(&self, image: &Self::Image, ty: FeatureType) -> Result<FeatureValue>;

    /// 提取全部 4 种特征
    fn extract_record(&self, image: &Self::Image) -> Result<FeatureRecord> {
        FeatureRecord::from_values(
            self.extract(image, FeatureType::Histogram)?,
            self.extract(image, FeatureType::Correlogram)?,
            self.extract(image, FeatureType::Sift)?,
            self.extract(image, FeatureType::Orb)?,
        )
    }
}

/// 未启用 `opencv` 特性时使用的提取器，任何解码都会失败
///
/// 此时仍然可以加载已有的特征文件，并按图片 ID 检索
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableExtractor;

impl FeatureExtractor for UnavailableExtractor {
    type Image = ();

    fn decode(&self, _path: &Path) -> Result<()> {
        Err(CbirError::ExtractorUnavailable)
    }

    fn decode_bytes(&self, _bytes: &[u8]) -> Result<()> {
        Err(CbirError::ExtractorUnavailable)
    }

    fn extract(&self, _image: &(), _ty: FeatureType) -> Result<FeatureValue> {
        Err(CbirError::ExtractorUnavailable)
    }
}

impl From<&ExtractOptions> for UnavailableExtractor {
    fn from(_: &ExtractOptions) -> Self {
        Self
    }
}

#[cfg(feature = "opencv")]
pub type DefaultExtractor = OpenCvExtractor;

#[cfg(not(feature = "opencv"))]
pub type DefaultExtractor = UnavailableExtractor;
