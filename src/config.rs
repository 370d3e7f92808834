use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;
use crate::codec::RECORD_SUFFIX;
use crate::extract::color::Bins;

static DEFAULT_FEATURE_DIR: LazyLock<String> = LazyLock::new(|| {
    match ProjectDirs::from("", "cbir", "cbir") {
        Some(dirs) => dirs.config_dir().join("features").to_string_lossy().into_owned(),
        None => "features".to_string(),
    }
});

#[derive(Parser, Debug, Clone)]
pub struct ExtractOptions {
    /// 颜色直方图的 H、S 分箱数量
    #[arg(long, value_name = "HxS", value_parser = parse_bins, default_value = "50x60")]
    pub hist_bins: Bins,
    /// 颜色相关图的 H、S 分箱数量，特征长度为分箱总数的平方
    #[arg(long, value_name = "HxS", value_parser = parse_bins, default_value = "8x8")]
    pub correlogram_bins: Bins,
    /// SIFT 特征点最大保留数量，0 表示不限制
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub sift_nfeatures: u32,
    /// ORB 特征点最大保留数量
    #[arg(long, value_name = "N", default_value_t = 500)]
    pub orb_nfeatures: u32,
    /// 图片最大尺寸，宽或高超过这个尺寸时等比缩放
    #[arg(short = 'S', long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "1920x1080")]
    pub max_size: (i32, i32),
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            hist_bins: (50, 60),
            correlogram_bins: (8, 8),
            sift_nfeatures: 0,
            orb_nfeatures: 500,
            max_size: (1920, 1080),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 使用的特征类型：HISTOGRAM、CORRELOGRAM、SIFT、ORB
    #[arg(short = 't', long, value_name = "TYPE", default_value = "HISTOGRAM")]
    pub feature: String,
    /// 返回的结果数量
    #[arg(short = 'k', long, value_name = "K", default_value_t = 10)]
    pub count: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "cbir", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 特征文件目录
    #[arg(short, long, default_value = DEFAULT_FEATURE_DIR.as_str())]
    pub feature_dir: FeatureDir,
    /// 图片目录
    #[arg(short, long, default_value = "images")]
    pub image_dir: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,png")]
    pub suffix: String,
    /// 特征缓存的有效性判断方式
    #[arg(long, value_enum, default_value_t = CachePolicy::PerImage)]
    pub cache_policy: CachePolicy,
    /// 并行线程数，默认为 CPU 核数
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 提取或加载图片目录的全部特征
    Build(BuildCommand),
    /// 将另一个目录的图片追加到特征库
    Add(AddCommand),
    /// 检索相似图片
    Search(SearchCommand),
    /// 查看一条特征记录
    Show(ShowCommand),
    /// 启动 HTTP 检索服务
    Server(ServerCommand),
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// 按图片内容哈希判断，变化或缺失的图片会被重新提取
    #[default]
    PerImage,
    /// 目录中存在任意特征文件即只加载，不再提取
    Directory,
}

/// 特征文件目录
#[derive(Debug, Clone)]
pub struct FeatureDir {
    path: PathBuf,
}

impl FeatureDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回图片特征文件的路径
    pub fn record(&self, id: &str) -> PathBuf {
        self.path.join(format!("{id}{RECORD_SUFFIX}"))
    }

    /// 返回缓存清单的路径
    pub fn manifest(&self) -> PathBuf {
        self.path.join("manifest.json")
    }

    /// 从特征文件路径还原图片 ID，不是特征文件时返回 None
    pub fn id_of(path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        let id = name.strip_suffix(RECORD_SUFFIX)?;
        (!id.is_empty()).then(|| id.to_string())
    }
}

impl FromStr for FeatureDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

fn parse_pair<T: FromStr>(s: &str, what: &str) -> anyhow::Result<(T, T)> {
    let Some((a, b)) = s.split_once('x') else {
        return Err(anyhow::anyhow!("无效的{}: {}", what, s));
    };
    match (a.trim().parse(), b.trim().parse()) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        _ => Err(anyhow::anyhow!("无效的{}: {}", what, s)),
    }
}

fn parse_size(s: &str) -> anyhow::Result<(i32, i32)> {
    let (w, h) = parse_pair::<i32>(s, "尺寸")?;
    if w <= 0 || h <= 0 {
        return Err(anyhow::anyhow!("无效的尺寸: {}", s));
    }
    Ok((w, h))
}

fn parse_bins(s: &str) -> anyhow::Result<Bins> {
    let (h, sat) = parse_pair::<usize>(s, "分箱数量")?;
    if h == 0 || h > 180 || sat == 0 || sat > 256 {
        return Err(anyhow::anyhow!("分箱数量超出范围 (H: 1-180, S: 1-256): {}", s));
    }
    Ok((h, sat))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use rstest::*;

    use super::*;

    #[test]
    fn test_opts_are_consistent() {
        Opts::command().debug_assert();
    }

    #[rstest]
    #[case("50x60", Some((50, 60)))]
    #[case("8x8", Some((8, 8)))]
    #[case("0x8", None)]
    #[case("181x8", None)]
    #[case("8", None)]
    #[case("ax8", None)]
    fn test_parse_bins(#[case] input: &str, #[case] expected: Option<Bins>) {
        assert_eq!(parse_bins(input).ok(), expected);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1920x1080").unwrap(), (1920, 1080));
        assert!(parse_size("-1x10").is_err());
    }

    #[test]
    fn test_feature_dir_paths() {
        let dir = FeatureDir::new("/tmp/features");
        let record = dir.record("cat 01");
        assert_eq!(record, Path::new("/tmp/features/cat 01_features.npz"));
        assert_eq!(FeatureDir::id_of(&record).as_deref(), Some("cat 01"));
        assert_eq!(FeatureDir::id_of(&dir.manifest()), None);
        assert_eq!(FeatureDir::id_of(Path::new("_features.npz")), None);
    }

    #[test]
    fn test_search_defaults() {
        let opts = Opts::parse_from(["cbir", "search", "--id", "a"]);
        let SubCommand::Search(cmd) = opts.subcmd else { panic!("expected search") };
        assert_eq!(cmd.search.count, 10);
        assert_eq!(cmd.search.feature, "HISTOGRAM");
        assert_eq!(opts.cache_policy, CachePolicy::PerImage);
    }
}
