#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use cbir::error::{CbirError, Result};
use cbir::extract::FeatureExtractor;
use cbir::feature::{FeatureRecord, FeatureType, FeatureValue, ORB_WIDTH, SIFT_WIDTH};
use ndarray::{Array1, Array2};

/// 测试用提取器：特征直接由文件内容决定
///
/// 文件名以 `broken` 开头的图片无法解码，内容以 `flat` 开头的图片解码后无法提取特征
pub struct StubExtractor {
    decoded: AtomicUsize,
    histogram_len: usize,
}

impl Default for StubExtractor {
    fn default() -> Self {
        Self::with_histogram_len(4)
    }
}

impl StubExtractor {
    pub fn with_histogram_len(histogram_len: usize) -> Self {
        Self { decoded: AtomicUsize::new(0), histogram_len }
    }

    pub fn decoded(&self) -> usize {
        self.decoded.load(Ordering::SeqCst)
    }
}

impl FeatureExtractor for StubExtractor {
    type Image = Vec<u8>;

    fn decode(&self, path: &Path) -> Result<Vec<u8>> {
        let name = path.file_name().unwrap().to_string_lossy();
        if name.starts_with("broken") {
            return Err(CbirError::unreadable(path, "stub: broken image"));
        }
        let data = fs::read(path).map_err(|e| CbirError::unreadable(path, e))?;
        self.decode_bytes(&data)
    }

    fn decode_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        self.decoded.fetch_add(1, Ordering::SeqCst);
        Ok(bytes.to_vec())
    }

    fn extract(&self, image: &Vec<u8>, ty: FeatureType) -> Result<FeatureValue> {
        if image.starts_with(b"flat") {
            return Err(CbirError::extraction("stub: no color"));
        }
        let first = image.first().copied().unwrap_or(0) as f32;
        Ok(match ty {
            FeatureType::Histogram => {
                FeatureValue::Vector(Array1::from_shape_fn(self.histogram_len, |i| {
                    image.get(i).copied().unwrap_or(0) as f32 / 255.
                }))
            }
            FeatureType::Correlogram => {
                let mut v = Array1::zeros(16);
                v[image.len() % 16] = 1.;
                FeatureValue::Vector(v)
            }
            FeatureType::Sift => {
                FeatureValue::Matrix(Array2::from_elem((image.len() % 3, SIFT_WIDTH), first))
            }
            FeatureType::Orb => FeatureValue::Matrix(Array2::from_elem((1, ORB_WIDTH), first)),
        })
    }
}

pub fn write_image(dir: &Path, name: &str, content: &[u8]) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), content).unwrap();
}

/// 只有一维直方图的记录，其余特征为空
pub fn histogram_record(values: &[f32]) -> FeatureRecord {
    FeatureRecord::new(
        Array1::from(values.to_vec()),
        Array1::zeros(values.len()),
        Array2::zeros((0, SIFT_WIDTH)),
        Array2::zeros((0, ORB_WIDTH)),
    )
}
