use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::feature::FeatureType;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 检索引擎的错误类型
#[derive(Debug, Error)]
pub enum CbirError {
    /// 图片存在但无法读取或解码，入库时跳过
    #[error("无法解码图片 {}: {reason}", path.display())]
    UnreadableImage { path: PathBuf, reason: String },

    /// 描述符矩阵为空，无法进行匹配
    #[error("描述符矩阵为空")]
    EmptyDescriptors,

    /// 不支持的特征类型名称
    #[error("不支持的特征类型: {0}")]
    UnsupportedFeatureType(String),

    /// 特征文件读写失败
    #[error("特征文件读写失败 {}: {source}", path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// 两个特征的维度不一致
    #[error("{feature} 特征维度不一致: 期望 {expected}，实际 {actual}")]
    DimensionMismatch { feature: FeatureType, expected: usize, actual: usize },

    /// 特征值的形态与特征类型不符（向量 / 矩阵）
    #[error("{feature} 需要{expected}，但传入的是{actual}")]
    FeatureKindMismatch { feature: FeatureType, expected: &'static str, actual: &'static str },

    /// 特征库中不存在该图片
    #[error("特征库中不存在图片: {0}")]
    RecordNotFound(String),

    /// 当前构建不包含特征提取器
    #[error("当前构建未启用 opencv 特性，无法解码图片和提取特征")]
    ExtractorUnavailable,

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

impl CbirError {
    pub fn storage(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::StorageIo { path: path.into(), source: source.into() }
    }

    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::UnreadableImage { path: path.into(), reason: reason.to_string() }
    }

    /// 解码之后的处理失败，此时还不知道图片路径，由调用方通过 [`CbirError::at_path`] 补上
    pub fn extraction(reason: impl ToString) -> Self {
        Self::unreadable(PathBuf::new(), reason)
    }

    /// 为没有路径的 [`CbirError::UnreadableImage`] 补上图片路径，其余错误原样返回
    pub fn at_path(self, path: &Path) -> Self {
        match self {
            Self::UnreadableImage { path: missing, reason } if missing.as_os_str().is_empty() => {
                Self::UnreadableImage { path: path.to_path_buf(), reason }
            }
            other => other,
        }
    }

    /// 单张图片 / 单条记录级别的错误，只影响自身，不应中断整批操作
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnreadableImage { .. }
                | Self::EmptyDescriptors
                | Self::StorageIo { .. }
                | Self::DimensionMismatch { .. }
        )
    }
}

pub type Result<T, E = CbirError> = std::result::Result<T, E>;
