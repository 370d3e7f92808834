use std::path::Path;
use std::time::Instant;

use log::debug;
use rayon::prelude::*;

use crate::error::{CbirError, Result};
use crate::extract::FeatureExtractor;
use crate::feature::{FeatureType, FeatureView};
use crate::metrics;
use crate::similarity::{check_kind, score};
use crate::store::FeatureStore;
use crate::topk::{Candidate, QueryResult, TopK};

/// Top-K 检索
///
/// 对特征库中的每条记录恰好打分一次，结果按 `(距离, ID)` 升序排列
pub struct Searcher<'a> {
    store: &'a FeatureStore,
}

impl<'a> Searcher<'a> {
    pub fn new(store: &'a FeatureStore) -> Self {
        Self { store }
    }

    pub fn query(&self, query: FeatureView, ty: FeatureType, k: usize) -> Result<QueryResult> {
        check_kind(ty, &query)?;
        // 查询的维度必须与库中记录一致
        if let Some(expected) = self.store.feature_width(ty) {
            let actual = query.width();
            if actual != expected {
                return Err(CbirError::DimensionMismatch { feature: ty, expected, actual });
            }
        }

        let start = Instant::now();
        let result = if k == 0 || self.store.is_empty() {
            vec![]
        } else {
            let top = self
                .store
                .records()
                .par_iter()
                .fold(
                    || TopK::new(k),
                    |mut top, (id, record)| {
                        top.push(Candidate::new(score(ty, query, record.feature(ty)), id));
                        top
                    },
                )
                .reduce(|| TopK::new(k), TopK::merge);
            top.into_sorted_vec().into_iter().map(Candidate::to_match).collect()
        };

        let elapsed = start.elapsed();
        debug!("{} 检索 {} 条记录耗时 {:.2?}", ty, self.store.len(), elapsed);
        metrics::inc_query(ty, elapsed.as_secs_f64());
        Ok(result)
    }

    /// 特征类型名称在扫描前解析，未知名称直接失败
    pub fn query_by_name(&self, query: FeatureView, name: &str, k: usize) -> Result<QueryResult> {
        let ty = name.parse()?;
        self.query(query, ty, k)
    }

    /// 以库中已有的一条记录作为查询
    pub fn query_by_id(&self, id: &str, name: &str, k: usize) -> Result<QueryResult> {
        let ty: FeatureType = name.parse()?;
        let record = self.store.get(id).ok_or_else(|| CbirError::RecordNotFound(id.to_owned()))?;
        self.query(record.feature(ty), ty, k)
    }

    /// 解码并提取查询图片的特征后检索
    pub fn query_image<E: FeatureExtractor>(
        &self,
        extractor: &E,
        path: &Path,
        name: &str,
        k: usize,
    ) -> Result<QueryResult> {
        let ty: FeatureType = name.parse()?;
        let image = extractor.decode(path)?;
        let value = extractor.extract(&image, ty).map_err(|e| e.at_path(path))?;
        self.query(value.view(), ty, k)
    }

    pub fn query_bytes<E: FeatureExtractor>(
        &self,
        extractor: &E,
        bytes: &[u8],
        name: &str,
        k: usize,
    ) -> Result<QueryResult> {
        let ty: FeatureType = name.parse()?;
        let image = extractor.decode_bytes(bytes)?;
        let value = extractor.extract(&image, ty).map_err(|e| e.at_path(Path::new("<memory>")))?;
        self.query(value.view(), ty, k)
    }
}
