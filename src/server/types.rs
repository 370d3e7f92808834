use std::collections::BTreeMap;

use axum::body::Bytes;
use axum_typed_multipart::TryFromMultipart;
use serde::{Deserialize, Serialize};

use crate::feature::FeatureType;
use crate::topk::Match;

/// 上传图片检索的请求参数
#[derive(TryFromMultipart)]
pub struct SearchRequest {
    /// 图片文件
    pub file: Bytes,
    /// 特征类型
    pub feature: String,
    /// 结果数量，不填使用服务端默认值
    pub k: Option<usize>,
}

/// 按图片 ID 检索的请求参数
#[derive(Debug, Deserialize)]
pub struct SearchByIdRequest {
    pub id: String,
    pub feature: String,
    pub k: Option<usize>,
}

/// 检索响应
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    /// 检索耗时，单位为毫秒
    pub time: u128,
    /// 按距离升序排列的结果
    pub result: Vec<Match>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    /// 特征库记录数
    pub records: usize,
    /// 各特征类型的累计检索次数
    pub queries: BTreeMap<FeatureType, u64>,
}
