//! 特征库：图片 ID 到特征记录的映射
//!
//! 生命周期：[`FeatureStoreBuilder`] 构造空库 → [`FeatureStore::initialize`] 冷启动提取或热启动加载 →
//! 只读检索。入库需要 `&mut FeatureStore`，检索只需要 `&FeatureStore`。

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{debug, info, warn};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::codec::{read_record, write_record};
use crate::config::{CachePolicy, FeatureDir};
use crate::error::{BoxError, CbirError, Result};
use crate::extract::FeatureExtractor;
use crate::feature::{FeatureRecord, FeatureType};
use crate::metrics::{self, IngestOutcome};
use crate::utils::{hash_file, pb_style, scan_images, suffix_regex};

pub struct FeatureStoreBuilder {
    dir: FeatureDir,
    policy: CachePolicy,
    suffix: String,
}

impl FeatureStoreBuilder {
    pub fn new(dir: FeatureDir) -> Self {
        Self { dir, policy: CachePolicy::default(), suffix: "jpg,png".to_string() }
    }

    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 逗号分隔的图片后缀名
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn open(self) -> Result<FeatureStore> {
        Ok(FeatureStore {
            suffix: suffix_regex(&self.suffix)?,
            dir: self.dir,
            policy: self.policy,
            records: BTreeMap::new(),
            manifest: Manifest::default(),
        })
    }
}

/// 一批图片的入库统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// 提取并写入成功的图片
    pub stored: usize,
    /// 已加入内存但特征文件写入失败的图片
    pub unpersisted: usize,
    /// 无法读取或提取失败而跳过的图片
    pub skipped: usize,
}

impl IngestReport {
    /// 加入内存的图片数量
    pub fn ingested(&self) -> usize {
        self.stored + self.unpersisted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// 特征目录为空，从图片目录提取
    Built(IngestReport),
    /// 从特征目录加载，`refreshed` 为重新提取的过期图片
    Loaded { loaded: usize, refreshed: IngestReport },
}

/// 缓存清单：图片 ID → 图片内容的 BLAKE3 哈希
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
struct Manifest(BTreeMap<String, String>);

impl Manifest {
    fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let read = || -> Result<Self, BoxError> {
            Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
        };
        read().unwrap_or_else(|e| {
            warn!("缓存清单损坏，将重新建立 {}: {}", path.display(), e);
            Self::default()
        })
    }

    fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let write = || -> Result<(), BoxError> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
            drop(writer);
            fs::rename(&tmp, path)?;
            Ok(())
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            CbirError::storage(path, e)
        })
    }
}

/// 向量特征的长度组合，同一个库中的全部记录必须一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Schema {
    histogram: usize,
    correlogram: usize,
}

impl Schema {
    fn of(record: &FeatureRecord) -> Self {
        Self { histogram: record.histogram.len(), correlogram: record.correlogram.len() }
    }

    /// 出现次数最多的长度组合，次数相同时取较小的组合
    fn majority<'a>(records: impl IntoIterator<Item = &'a FeatureRecord>) -> Option<Self> {
        let mut counts = BTreeMap::new();
        for record in records {
            *counts.entry(Self::of(record)).or_insert(0usize) += 1;
        }
        counts.into_iter().rev().max_by_key(|(_, count)| *count).map(|(schema, _)| schema)
    }
}

/// 特征应有的宽度；没有参照记录时，向量特征不做限制
fn expected_width(schema: Option<Schema>, ty: FeatureType) -> Option<usize> {
    match (ty, schema) {
        (FeatureType::Histogram, Some(schema)) => Some(schema.histogram),
        (FeatureType::Correlogram, Some(schema)) => Some(schema.correlogram),
        _ => ty.descriptor_width(),
    }
}

/// 每种特征的长度 / 列数必须与参照一致
fn check_schema(schema: Option<Schema>, record: &FeatureRecord) -> Result<()> {
    for ty in FeatureType::ALL {
        let Some(expected) = expected_width(schema, ty) else { continue };
        let actual = record.feature(ty).width();
        if actual != expected {
            return Err(CbirError::DimensionMismatch { feature: ty, expected, actual });
        }
    }
    Ok(())
}

/// 单张图片的处理结果，在汇合点统一写入内存
struct Extracted {
    id: String,
    hash: String,
    record: FeatureRecord,
    persisted: Result<()>,
}

pub struct FeatureStore {
    dir: FeatureDir,
    policy: CachePolicy,
    suffix: Regex,
    records: BTreeMap<String, FeatureRecord>,
    manifest: Manifest,
}

impl FeatureStore {
    pub fn dir(&self) -> &FeatureDir {
        &self.dir
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FeatureRecord> {
        self.records.get(id)
    }

    /// 按 ID 字典序遍历全部记录
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureRecord)> {
        self.records.iter().map(|(id, record)| (id.as_str(), record))
    }

    pub(crate) fn records(&self) -> &BTreeMap<String, FeatureRecord> {
        &self.records
    }

    /// 某种特征在库中的宽度：向量的长度或描述符的列数。空库的向量特征为 `None`
    pub fn feature_width(&self, ty: FeatureType) -> Option<usize> {
        expected_width(self.schema(), ty)
    }

    fn schema(&self) -> Option<Schema> {
        self.records.values().next().map(Schema::of)
    }

    /// 冷启动或热启动
    ///
    /// 特征目录中没有任何特征文件时，提取 `image_dir` 下的全部图片并持久化；否则加载全部特征文件。
    /// [`CachePolicy::PerImage`] 下还会重新提取内容发生变化或缺少特征文件的图片。
    pub fn initialize<E: FeatureExtractor>(
        &mut self,
        image_dir: &Path,
        extractor: &E,
    ) -> Result<InitOutcome> {
        let files = self.record_files();
        if files.is_empty() {
            info!("特征目录为空，开始提取图片特征: {}", image_dir.display());
            self.records.clear();
            self.manifest = Manifest::default();
            let images = scan_images(image_dir, &self.suffix)?;
            let report = self.ingest_images(images, extractor)?;
            return Ok(InitOutcome::Built(report));
        }

        let loaded = self.load_files(files);
        let refreshed = match self.policy {
            CachePolicy::Directory => IngestReport::default(),
            CachePolicy::PerImage => self.refresh(image_dir, extractor)?,
        };
        Ok(InitOutcome::Loaded { loaded, refreshed })
    }

    /// 只加载特征目录中已有的特征文件，不做任何提取
    pub fn load(&mut self) -> usize {
        let files = self.record_files();
        self.load_files(files)
    }

    /// 提取另一个目录中的全部图片，同 ID 的记录会被覆盖
    pub fn ingest_additional<E: FeatureExtractor>(
        &mut self,
        image_dir: &Path,
        extractor: &E,
    ) -> Result<IngestReport> {
        info!("追加图片: {}", image_dir.display());
        let images = scan_images(image_dir, &self.suffix)?;
        self.ingest_images(images, extractor)
    }

    /// 直接写入一条内存记录，不做持久化
    pub fn insert(&mut self, id: impl Into<String>, record: FeatureRecord) -> Result<()> {
        check_schema(self.schema(), &record)?;
        self.records.insert(id.into(), record);
        Ok(())
    }

    /// 特征目录下的全部特征文件，目录不存在时为空
    fn record_files(&self) -> Vec<(String, PathBuf)> {
        if !self.dir.path().is_dir() {
            return vec![];
        }
        WalkDir::new(self.dir.path())
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let id = FeatureDir::id_of(entry.path())?;
                Some((id, entry.into_path()))
            })
            .collect()
    }

    fn load_files(&mut self, files: Vec<(String, PathBuf)>) -> usize {
        info!("从特征目录加载 {} 个特征文件: {}", files.len(), self.dir.path().display());
        self.records.clear();
        self.manifest = Manifest::load(&self.dir.manifest());

        let pb = ProgressBar::new(files.len() as u64).with_style(pb_style());
        let decoded = files
            .into_par_iter()
            .progress_with(pb.clone())
            .map(|(id, path)| (id, read_record(&path)))
            .collect::<Vec<_>>();
        pb.finish_and_clear();

        // 以多数记录的长度为准
        let schema = Schema::majority(decoded.iter().filter_map(|(_, record)| record.as_ref().ok()));
        debug!("特征长度: {schema:?}");
        for (id, record) in decoded {
            let checked = record.and_then(|record| check_schema(schema, &record).map(|()| record));
            match checked {
                Ok(record) => {
                    self.records.insert(id, record);
                }
                Err(e) => warn!("跳过特征记录 {id}: {e}"),
            }
        }
        info!("加载完成，共 {} 条记录", self.records.len());
        self.records.len()
    }

    /// 重新提取内容发生变化或缺少特征记录的图片
    fn refresh<E: FeatureExtractor>(
        &mut self,
        image_dir: &Path,
        extractor: &E,
    ) -> Result<IngestReport> {
        let images = match scan_images(image_dir, &self.suffix) {
            Ok(images) => images,
            Err(e) => {
                warn!("无法扫描图片目录，跳过过期检查: {e}");
                return Ok(IngestReport::default());
            }
        };

        let mut stale = vec![];
        let mut adopted = false;
        for (id, path) in images {
            let hash = match hash_file(&path) {
                Ok(hash) => hash,
                Err(e) => {
                    warn!("无法读取图片 {}: {}", path.display(), e);
                    continue;
                }
            };
            match (self.records.contains_key(&id), self.manifest.0.get(&id)) {
                (true, Some(old)) if *old == hash => {}
                // 清单中没有记录时信任已有的特征文件
                (true, None) => {
                    self.manifest.0.insert(id, hash);
                    adopted = true;
                }
                _ => stale.push((id, path)),
            }
        }

        if stale.is_empty() {
            if adopted {
                self.save_manifest();
            }
            debug!("没有需要更新的图片");
            return Ok(IngestReport::default());
        }

        info!("{} 张图片需要重新提取", stale.len());
        match self.ingest_images(stale, extractor) {
            Err(CbirError::ExtractorUnavailable) => {
                warn!("{}，跳过过期图片的更新", CbirError::ExtractorUnavailable);
                if adopted {
                    self.save_manifest();
                }
                Ok(IngestReport::default())
            }
            other => other,
        }
    }

    /// 并行提取一批图片，每张图片各自写入自己的特征文件，最后在汇合点更新内存和缓存清单
    fn ingest_images<E: FeatureExtractor>(
        &mut self,
        images: Vec<(String, PathBuf)>,
        extractor: &E,
    ) -> Result<IngestReport> {
        fs::create_dir_all(self.dir.path()).map_err(|e| CbirError::storage(self.dir.path(), e))?;

        let dir = &self.dir;
        let reference = self.schema();
        let pb = ProgressBar::new(images.len() as u64).with_style(pb_style());
        let outcomes = images
            .into_par_iter()
            .progress_with(pb.clone())
            .map(|(id, path)| {
                let outcome = extract_one(extractor, &path).and_then(|(hash, record)| {
                    // 与库中已有记录长度不一致的特征不落盘
                    check_schema(reference, &record)?;
                    let persisted = write_record(dir.record(&id), &record);
                    Ok(Extracted { id: id.clone(), hash, record, persisted })
                });
                (id, path, outcome)
            })
            .collect::<Vec<_>>();
        pb.finish_with_message("特征提取完成");

        // 空库没有参照，以这一批中的多数为准
        let schema = reference.or_else(|| {
            let batch = outcomes.iter().filter_map(|(_, _, outcome)| outcome.as_ref().ok());
            Schema::majority(batch.map(|extracted| &extracted.record))
        });

        let mut report = IngestReport::default();
        let mut fatal = None;
        for (id, path, outcome) in outcomes {
            let extracted = match outcome {
                Ok(extracted) => extracted,
                Err(e) if e.is_recoverable() => {
                    warn!("跳过图片 {}: {}", path.display(), e);
                    metrics::inc_ingest(IngestOutcome::Skipped);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    fatal.get_or_insert(e);
                    continue;
                }
            };
            if let Err(e) = check_schema(schema, &extracted.record) {
                warn!("跳过图片 {}: {}", path.display(), e);
                if extracted.persisted.is_ok() {
                    let file = self.dir.record(&id);
                    if let Err(e) = fs::remove_file(&file) {
                        warn!("无法删除特征文件 {}: {}", file.display(), e);
                    }
                }
                metrics::inc_ingest(IngestOutcome::Skipped);
                report.skipped += 1;
                continue;
            }

            match extracted.persisted {
                Ok(()) => {
                    self.manifest.0.insert(id, extracted.hash);
                    metrics::inc_ingest(IngestOutcome::Stored);
                    report.stored += 1;
                }
                Err(e) => {
                    warn!("特征文件写入失败，仅保留在内存中: {e}");
                    self.manifest.0.remove(&id);
                    metrics::inc_ingest(IngestOutcome::Unpersisted);
                    report.unpersisted += 1;
                }
            }
            self.records.insert(extracted.id, extracted.record);
        }

        self.save_manifest();
        if let Some(e) = fatal {
            return Err(e);
        }
        info!(
            "入库完成: 成功 {}，未持久化 {}，跳过 {}",
            report.stored, report.unpersisted, report.skipped
        );
        Ok(report)
    }

    fn save_manifest(&self) {
        if let Err(e) = self.manifest.save(&self.dir.manifest()) {
            warn!("{e}");
        }
    }
}

fn extract_one<E: FeatureExtractor>(extractor: &E, path: &Path) -> Result<(String, FeatureRecord)> {
    let hash = hash_file(path).map_err(|e| CbirError::unreadable(path, e))?;
    let image = extractor.decode(path)?;
    let record = extractor.extract_record(&image).map_err(|e| e.at_path(path))?;
    Ok((hash, record))
}
