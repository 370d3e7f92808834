mod add;
mod build;
mod search;
pub mod server;
mod show;

pub use add::*;
pub use build::*;
pub use search::*;
pub use server::*;
pub use show::*;

use crate::config::Opts;
use crate::extract::FeatureExtractor;
use crate::store::{FeatureStore, FeatureStoreBuilder, InitOutcome};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 按全局选项打开一个空的特征库
pub fn open_store(opts: &Opts) -> anyhow::Result<FeatureStore> {
    Ok(FeatureStoreBuilder::new(opts.feature_dir.clone())
        .policy(opts.cache_policy)
        .suffix(&opts.suffix)
        .open()?)
}

/// 打开特征库并完成冷启动 / 热启动
pub fn init_store<E: FeatureExtractor>(opts: &Opts, extractor: &E) -> anyhow::Result<FeatureStore> {
    let mut store = open_store(opts)?;
    let outcome = tokio::task::block_in_place(|| store.initialize(&opts.image_dir, extractor))?;
    match outcome {
        InitOutcome::Built(report) => {
            log::info!("特征库已建立，共 {} 条记录（跳过 {} 张图片）", store.len(), report.skipped)
        }
        InitOutcome::Loaded { loaded, refreshed } => log::info!(
            "特征库已加载 {} 条记录，重新提取 {} 张图片",
            loaded,
            refreshed.ingested()
        ),
    }
    Ok(store)
}
