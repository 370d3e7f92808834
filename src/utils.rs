use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use indicatif::ProgressStyle;
use log::warn;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::{CbirError, Result};

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// 将逗号分隔的后缀名列表编译为大小写不敏感的正则表达式
pub fn suffix_regex(suffix: &str) -> Result<Regex> {
    let parts = suffix
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| regex::escape(s.trim_start_matches('.')))
        .collect::<Vec<_>>();
    if parts.is_empty() {
        return Err(CbirError::Config(format!("后缀名列表为空: {suffix:?}")));
    }
    Regex::new(&format!("(?i)^(?:{})$", parts.join("|")))
        .map_err(|e| CbirError::Config(e.to_string()))
}

/// 图片 ID 为去掉扩展名的文件名
pub fn image_id(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// 扫描目录（不递归）下所有后缀匹配的图片，返回按 ID 排序的 `(ID, 路径)`
///
/// 多个文件对应同一个 ID 时（如 `a.jpg` 与 `a.png`），只保留路径排序靠后的一个
pub fn scan_images(dir: &Path, suffix: &Regex) -> Result<Vec<(String, PathBuf)>> {
    let mut images = BTreeMap::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            // 目录本身无法读取时整体失败，其余条目只跳过
            Err(e) if e.depth() == 0 => return Err(CbirError::storage(dir, e)),
            Err(e) => {
                warn!("跳过无法访问的文件: {e}");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(ext) = path.extension() else {
            continue;
        };
        if !suffix.is_match(&ext.to_string_lossy()) {
            continue;
        }
        let Some(id) = image_id(path) else {
            continue;
        };
        if let Some(old) = images.insert(id.clone(), path.to_path_buf()) {
            warn!("图片 ID 重复: {id}，忽略 {}", old.display());
        }
    }
    Ok(images.into_iter().collect())
}

/// 计算文件内容的 BLAKE3 哈希
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let data = fs::read(path)?;
    Ok(blake3::hash(&data).to_hex().to_string())
}
