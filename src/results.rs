//! 检索结果的文本格式：每行 `<图片 ID> <距离>`，顺序与检索结果一致

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{BoxError, CbirError, Result};
use crate::topk::Match;

pub fn format_results<W: Write>(mut writer: W, results: &[Match]) -> std::io::Result<()> {
    for m in results {
        writeln!(writer, "{} {}", m.id, m.distance)?;
    }
    writer.flush()
}

pub fn write_results(path: impl AsRef<Path>, results: &[Match]) -> Result<()> {
    let path = path.as_ref();
    let write = || -> std::io::Result<()> {
        let file = File::create(path)?;
        format_results(BufWriter::new(file), results)
    };
    write().map_err(|e| CbirError::storage(path, e))
}

/// 图片 ID 中可能包含空格，按最后一个空格切分
pub fn parse_results(text: &str) -> Result<Vec<Match>, BoxError> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| -> Result<Match, BoxError> {
            let (id, distance) =
                line.rsplit_once(' ').ok_or_else(|| format!("无效的结果行: {line:?}"))?;
            Ok(Match::new(id, distance.trim().parse::<f64>()?))
        })
        .collect()
}

pub fn read_results(path: impl AsRef<Path>) -> Result<Vec<Match>> {
    let path = path.as_ref();
    let read = || -> Result<Vec<Match>, BoxError> { parse_results(&fs::read_to_string(path)?) };
    read().map_err(|e| CbirError::storage(path, e))
}
