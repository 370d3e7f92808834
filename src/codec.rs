//! 单张图片特征记录的持久化
//!
//! 每张图片对应一个 `<id>_features.npz` 文件，内含 4 个命名数组：
//! `ColorHistogram`、`ColorCorrelogram`（一维 f32）和 `SIFT`、`ORB`（二维 f32）。

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use ndarray::{Array1, Array2, Ix1, Ix2, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter};

use crate::error::{BoxError, CbirError, Result};
use crate::feature::{FeatureRecord, FeatureType};

/// 特征文件名后缀
pub const RECORD_SUFFIX: &str = "_features.npz";

/// 将记录编码写入任意输出流
pub fn encode<W: Write + Seek>(writer: W, record: &FeatureRecord) -> Result<W, BoxError> {
    let mut npz = NpzWriter::new(writer);
    npz.add_array(FeatureType::Histogram.field_name(), &record.histogram)?;
    npz.add_array(FeatureType::Correlogram.field_name(), &record.correlogram)?;
    npz.add_array(FeatureType::Sift.field_name(), &record.sift)?;
    npz.add_array(FeatureType::Orb.field_name(), &record.orb)?;
    Ok(npz.finish()?)
}

/// 从任意输入流解码一条记录，缺少任何一个字段都视为损坏
pub fn decode<R: Read + Seek>(reader: R) -> Result<FeatureRecord, BoxError> {
    let mut npz = NpzReader::new(reader)?;
    let names = npz.names()?;

    // NOTE: 不同版本的 npz 写入方可能会在数组名后追加 `.npy`，这里按下标读取以避免歧义
    let index_of = |ty: FeatureType| -> Result<usize, BoxError> {
        names
            .iter()
            .position(|name| name.strip_suffix(".npy").unwrap_or(name) == ty.field_name())
            .ok_or_else(|| format!("缺少字段 {}", ty.field_name()).into())
    };

    let histogram: Array1<f32> =
        npz.by_index::<OwnedRepr<f32>, Ix1>(index_of(FeatureType::Histogram)?)?;
    let correlogram: Array1<f32> =
        npz.by_index::<OwnedRepr<f32>, Ix1>(index_of(FeatureType::Correlogram)?)?;
    let sift: Array2<f32> = npz.by_index::<OwnedRepr<f32>, Ix2>(index_of(FeatureType::Sift)?)?;
    let orb: Array2<f32> = npz.by_index::<OwnedRepr<f32>, Ix2>(index_of(FeatureType::Orb)?)?;

    Ok(FeatureRecord::new(histogram, correlogram, sift, orb))
}

/// 写入特征文件
///
/// 先写到临时文件再重命名，避免中途失败留下半个文件被下次启动误加载
pub fn write_record(path: impl AsRef<Path>, record: &FeatureRecord) -> Result<()> {
    let path = path.as_ref();
    let tmp = path.with_extension("npz.tmp");
    let write = || -> Result<(), BoxError> {
        let file = File::create(&tmp)?;
        let mut writer = encode(BufWriter::new(file), record)?;
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

/// 读取特征文件
pub fn read_record(path: impl AsRef<Path>) -> Result<FeatureRecord> {
    let path = path.as_ref();
    let read = || -> Result<FeatureRecord, BoxError> {
        let file = File::open(path)?;
        decode(BufReader::new(file))
    };
    read().map_err(|e| CbirError::storage(path, e))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use ndarray::{Array, array};
    use rand::prelude::*;
    use tempfile::TempDir;

    use super::*;
    use crate::feature::{ORB_WIDTH, SIFT_WIDTH};

    fn random_record(rng: &mut StdRng, sift_rows: usize, orb_rows: usize) -> FeatureRecord {
        FeatureRecord::new(
            Array::from_shape_fn(3000, |_| rng.random::<f32>()),
            Array::from_shape_fn(4096, |_| rng.random::<f32>()),
            Array::from_shape_fn((sift_rows, SIFT_WIDTH), |_| rng.random_range(0f32..255.)),
            Array::from_shape_fn((orb_rows, ORB_WIDTH), |_| rng.random_range(0..=255u8) as f32),
        )
    }

    #[test]
    fn test_roundtrip_in_memory() {
        let mut rng = StdRng::seed_from_u64(7);
        let record = random_record(&mut rng, 17, 230);

        let buf = encode(Cursor::new(Vec::new()), &record).unwrap().into_inner();
        let decoded = decode(Cursor::new(buf)).unwrap();

        assert_eq!(decoded, record);
    }

    #[test]
    fn test_roundtrip_zero_keypoints() {
        let mut rng = StdRng::seed_from_u64(8);
        let record = random_record(&mut rng, 0, 0);

        let buf = encode(Cursor::new(Vec::new()), &record).unwrap().into_inner();
        let decoded = decode(Cursor::new(buf)).unwrap();

        assert_eq!(decoded.sift.dim(), (0, SIFT_WIDTH));
        assert_eq!(decoded.orb.dim(), (0, ORB_WIDTH));
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_roundtrip_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(format!("a{}", RECORD_SUFFIX));
        let record = FeatureRecord::new(
            array![0.0, 0.25, 1.0],
            array![1.0, f32::MIN_POSITIVE, 0.0],
            Array2::from_elem((1, SIFT_WIDTH), 1.5),
            Array2::zeros((0, ORB_WIDTH)),
        );

        write_record(&path, &record).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("npz.tmp").exists());
        assert_eq!(read_record(&path).unwrap(), record);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_record(dir.path().join("nope_features.npz")).unwrap_err();
        assert!(matches!(err, CbirError::StorageIo { .. }));
    }

    #[test]
    fn test_read_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad_features.npz");
        fs::write(&path, b"definitely not a zip archive").unwrap();
        assert!(matches!(read_record(&path), Err(CbirError::StorageIo { .. })));
    }

    #[test]
    fn test_write_into_missing_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("a_features.npz");
        let record = FeatureRecord::new(
            array![1.0],
            array![1.0],
            Array2::zeros((0, SIFT_WIDTH)),
            Array2::zeros((0, ORB_WIDTH)),
        );
        assert!(matches!(write_record(&path, &record), Err(CbirError::StorageIo { .. })));
    }
}
