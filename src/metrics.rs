use std::collections::BTreeMap;
use std::sync::LazyLock;

use prometheus::*;

use crate::feature::FeatureType;

static METRIC_QUERY_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("cbir_query_count", "count of the similarity queries", &["feature"])
        .unwrap()
});

static METRIC_QUERY_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "cbir_query_duration",
        "duration of the full store scan in seconds",
        &["feature"]
    )
    .unwrap()
});

static METRIC_INGEST_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("cbir_ingest_count", "count of the ingested images", &["outcome"])
        .unwrap()
});

/// 入库结果
#[derive(Debug, Clone, Copy)]
pub enum IngestOutcome {
    /// 提取并写入成功
    Stored,
    /// 提取成功但写入特征文件失败
    Unpersisted,
    /// 图片无法读取或提取失败
    Skipped,
}

impl IngestOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Unpersisted => "unpersisted",
            Self::Skipped => "skipped",
        }
    }
}

/// 记录一次检索
pub fn inc_query(ty: FeatureType, duration: f64) {
    METRIC_QUERY_COUNT.with_label_values(&[ty.as_str()]).inc();
    METRIC_QUERY_DURATION.with_label_values(&[ty.as_str()]).observe(duration);
}

pub fn inc_ingest(outcome: IngestOutcome) {
    METRIC_INGEST_COUNT.with_label_values(&[outcome.as_str()]).inc();
}

/// 各特征类型的累计检索次数
pub fn query_counts() -> BTreeMap<FeatureType, u64> {
    FeatureType::ALL
        .into_iter()
        .map(|ty| (ty, METRIC_QUERY_COUNT.with_label_values(&[ty.as_str()]).get()))
        .collect()
}
