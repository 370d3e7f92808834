use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use tokio::task::block_in_place;

use crate::cli::{SubCommandExtend, init_store};
use crate::config::{ExtractOptions, Opts};
use crate::extract::DefaultExtractor;

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    /// 追加的图片目录，已存在的同名图片会被覆盖
    pub path: PathBuf,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let extractor = DefaultExtractor::from(&self.extract);
        let mut store = init_store(opts, &extractor)?;
        let report = block_in_place(|| store.ingest_additional(&self.path, &extractor))?;
        info!("追加 {} 张图片，跳过 {} 张，当前共 {} 条记录", report.ingested(), report.skipped, store.len());
        Ok(())
    }
}
