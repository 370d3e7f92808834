use anyhow::Result;
use clap::Parser;
use log::info;

use crate::Opts;
use crate::cli::{SubCommandExtend, init_store};
use crate::config::ExtractOptions;
use crate::extract::DefaultExtractor;

#[derive(Parser, Debug, Clone)]
pub struct BuildCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
}

impl SubCommandExtend for BuildCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let extractor = DefaultExtractor::from(&self.extract);
        let store = init_store(opts, &extractor)?;
        info!("特征目录: {}，共 {} 条记录", store.dir().path().display(), store.len());
        Ok(())
    }
}
