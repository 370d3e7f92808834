use anyhow::Result;
use clap::Parser;

use crate::cli::{SubCommandExtend, open_store};
use crate::config::Opts;
use crate::error::CbirError;
use crate::feature::FeatureType;

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    /// 图片 ID
    pub id: String,
}

impl SubCommandExtend for ShowCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let mut store = open_store(opts)?;
        tokio::task::block_in_place(|| store.load());
        let record = store.get(&self.id).ok_or_else(|| CbirError::RecordNotFound(self.id.clone()))?;

        for ty in FeatureType::ALL {
            println!("{:<12}{:?}", ty.as_str(), record.feature(ty).shape());
        }
        Ok(())
    }
}
