use std::sync::Arc;
use std::time::Instant;

use crate::cli::server::ServerCommand;
use crate::error::Result;
use crate::extract::DefaultExtractor;
use crate::metrics;
use crate::searcher::Searcher;
use crate::store::FeatureStore;

use super::types::{SearchResponse, StatsResponse};

/// 应用状态
pub struct AppState {
    /// 只读的特征库
    pub store: FeatureStore,
    /// 查询图片使用的特征提取器
    pub extractor: DefaultExtractor,
    /// 默认返回的结果数量
    pub count: usize,
    /// 鉴权 token
    pub token: String,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(store: FeatureStore, opts: &ServerCommand) -> Arc<Self> {
        Arc::new(AppState {
            store,
            extractor: DefaultExtractor::from(&opts.extract),
            count: opts.count,
            token: opts.token.clone(),
        })
    }

    pub fn check_token(&self, token: &str) -> bool {
        !self.token.is_empty() && self.token == token
    }

    pub fn search_bytes(&self, bytes: &[u8], feature: &str, k: Option<usize>) -> Result<SearchResponse> {
        let start = Instant::now();
        let result = Searcher::new(&self.store).query_bytes(
            &self.extractor,
            bytes,
            feature,
            k.unwrap_or(self.count),
        )?;
        Ok(SearchResponse { time: start.elapsed().as_millis(), result })
    }

    pub fn search_id(&self, id: &str, feature: &str, k: Option<usize>) -> Result<SearchResponse> {
        let start = Instant::now();
        let result = Searcher::new(&self.store).query_by_id(id, feature, k.unwrap_or(self.count))?;
        Ok(SearchResponse { time: start.elapsed().as_millis(), result })
    }

    pub fn stats(&self) -> StatsResponse {
        StatsResponse { records: self.store.len(), queries: metrics::query_counts() }
    }
}
