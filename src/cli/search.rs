use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::task::block_in_place;

use crate::cli::{SubCommandExtend, init_store};
use crate::config::{ExtractOptions, Opts, SearchOptions};
use crate::extract::DefaultExtractor;
use crate::feature::FeatureType;
use crate::results::write_results;
use crate::searcher::Searcher;
use crate::topk::Match;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 被搜索的图片路径
    #[arg(required_unless_present = "id")]
    pub image: Option<PathBuf>,
    /// 使用库中已有图片的特征作为查询
    #[arg(long, value_name = "ID", conflicts_with = "image")]
    pub id: Option<String>,
    /// 同时将结果写入文本文件，每行 `<ID> <距离>`
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        // 特征类型先于任何 IO 校验
        let ty = self.search.feature.as_str();
        ty.parse::<FeatureType>()?;

        let extractor = DefaultExtractor::from(&self.extract);
        let store = init_store(opts, &extractor)?;
        let searcher = Searcher::new(&store);

        let result = block_in_place(|| match (&self.id, &self.image) {
            (Some(id), _) => searcher.query_by_id(id, ty, self.search.count),
            (None, Some(image)) => searcher.query_image(&extractor, image, ty, self.search.count),
            (None, None) => Ok(vec![]),
        })?;

        if let Some(path) = &self.output {
            write_results(path, &result)?;
        }
        print_result(&result, self.output_format)
    }
}

fn print_result(result: &[Match], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for m in result {
                println!("{:.4}\t{}", m.distance, m.id);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
