use std::cell::RefCell;
use std::path::Path;

use log::debug;
use ndarray::{Array2, ArrayView3};
use opencv::core::{self, KeyPoint, Mat, Ptr, Size, Vector};
use opencv::features2d::{ORB, SIFT};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};

use super::FeatureExtractor;
use super::color::{color_correlogram, color_histogram};
use crate::config::ExtractOptions;
use crate::error::{CbirError, Result};
use crate::feature::{FeatureRecord, FeatureType, FeatureValue, ORB_WIDTH, SIFT_WIDTH};

// SIFT / ORB 检测器不能跨线程共享，每个线程各自缓存一份
thread_local! {
    static SIFT_DETECTOR: RefCell<Option<Ptr<SIFT>>> = const { RefCell::new(None) };
    static ORB_DETECTOR: RefCell<Option<Ptr<ORB>>> = const { RefCell::new(None) };
}

/// 基于 OpenCV 的特征提取器
#[derive(Debug, Clone)]
pub struct OpenCvExtractor {
    opts: ExtractOptions,
}

impl From<&ExtractOptions> for OpenCvExtractor {
    fn from(opts: &ExtractOptions) -> Self {
        Self { opts: opts.clone() }
    }
}

impl OpenCvExtractor {
    /// 宽高超过限制时等比缩小
    fn adjust_image_size(&self, img: Mat) -> opencv::Result<Mat> {
        let (max_width, max_height) = self.opts.max_size;
        if img.cols() <= max_width && img.rows() <= max_height {
            return Ok(img);
        }
        let scale =
            (max_height as f64 / img.rows() as f64).min(max_width as f64 / img.cols() as f64);
        let mut output = Mat::default();
        imgproc::resize(
            &img,
            &mut output,
            Size::default(),
            scale,
            scale,
            imgproc::InterpolationFlags::INTER_AREA as i32,
        )?;
        Ok(output)
    }

    fn finish_decode(&self, img: Mat, path: &Path) -> Result<Mat> {
        if img.empty() {
            return Err(CbirError::unreadable(path, "OpenCV 无法解码"));
        }
        self.adjust_image_size(img).map_err(|e| CbirError::unreadable(path, e))
    }

    fn to_hsv(image: &Mat) -> opencv::Result<Mat> {
        let mut hsv = Mat::default();
        imgproc::cvt_color_def(image, &mut hsv, imgproc::COLOR_BGR2HSV)?;
        Ok(hsv)
    }

    fn color_features(&self, hsv: &Mat) -> Result<(FeatureValue, FeatureValue)> {
        let (rows, cols) = (hsv.rows() as usize, hsv.cols() as usize);
        let data = hsv.data_bytes().map_err(cv_err)?;
        let view = ArrayView3::from_shape((rows, cols, 3), data)
            .map_err(CbirError::extraction)?;
        Ok((
            FeatureValue::Vector(color_histogram(view, self.opts.hist_bins)),
            FeatureValue::Vector(color_correlogram(view, self.opts.correlogram_bins)),
        ))
    }

    fn sift(&self, image: &Mat) -> Result<FeatureValue> {
        SIFT_DETECTOR.with(|cell| -> Result<FeatureValue> {
            let mut slot = cell.borrow_mut();
            let mut sift = match slot.take() {
                Some(sift) => sift,
                None => {
                    let mut sift = SIFT::create_def().map_err(cv_err)?;
                    sift.set_n_features(self.opts.sift_nfeatures as i32).map_err(cv_err)?;
                    sift
                }
            };
            let des = detect_and_compute(&mut sift, image);
            *slot = Some(sift);
            Ok(FeatureValue::Matrix(descriptors_to_array(&des?, SIFT_WIDTH)?))
        })
    }

    fn orb(&self, image: &Mat) -> Result<FeatureValue> {
        ORB_DETECTOR.with(|cell| -> Result<FeatureValue> {
            let mut slot = cell.borrow_mut();
            let mut orb = match slot.take() {
                Some(orb) => orb,
                None => {
                    let mut orb = ORB::create_def().map_err(cv_err)?;
                    orb.set_max_features(self.opts.orb_nfeatures as i32).map_err(cv_err)?;
                    orb
                }
            };
            let des = detect_and_compute(&mut orb, image);
            *slot = Some(orb);
            Ok(FeatureValue::Matrix(descriptors_to_array(&des?, ORB_WIDTH)?))
        })
    }
}

impl FeatureExtractor for OpenCvExtractor {
    type Image = Mat;

    fn decode(&self, path: &Path) -> Result<Mat> {
        let filename = path.to_string_lossy();
        let img = imgcodecs::imread(&filename, imgcodecs::IMREAD_COLOR)
            .map_err(|e| CbirError::unreadable(path, e))?;
        self.finish_decode(img, path)
    }

    fn decode_bytes(&self, bytes: &[u8]) -> Result<Mat> {
        let path = Path::new("<memory>");
        let mat = Mat::from_slice(bytes).map_err(|e| CbirError::unreadable(path, e))?;
        let img = imgcodecs::imdecode(&mat, imgcodecs::IMREAD_COLOR)
            .map_err(|e| CbirError::unreadable(path, e))?;
        self.finish_decode(img, path)
    }

    fn extract(&self, image: &Mat, ty: FeatureType) -> Result<FeatureValue> {
        match ty {
            FeatureType::Histogram | FeatureType::Correlogram => {
                let hsv = Self::to_hsv(image).map_err(cv_err)?;
                let (histogram, correlogram) = self.color_features(&hsv)?;
                Ok(if ty == FeatureType::Histogram { histogram } else { correlogram })
            }
            FeatureType::Sift => self.sift(image),
            FeatureType::Orb => self.orb(image),
        }
    }

    /// 直方图和相关图共用同一次 HSV 转换
    fn extract_record(&self, image: &Mat) -> Result<FeatureRecord> {
        let hsv = Self::to_hsv(image).map_err(cv_err)?;
        let (histogram, correlogram) = self.color_features(&hsv)?;
        let sift = self.sift(image)?;
        let orb = self.orb(image)?;
        FeatureRecord::from_values(histogram, correlogram, sift, orb)
    }
}

fn detect_and_compute<T: Feature2DTrait>(detector: &mut T, image: &Mat) -> Result<Mat> {
    let mask = Mat::default();
    let mut kps = Vector::<KeyPoint>::new();
    let mut des = Mat::default();
    detector.detect_and_compute(image, &mask, &mut kps, &mut des, false).map_err(cv_err)?;
    debug!("检测到 {} 个特征点", kps.len());
    Ok(des)
}

/// 描述符统一转为 f32 矩阵，没有特征点时返回 0 行矩阵
fn descriptors_to_array(des: &Mat, width: usize) -> Result<Array2<f32>> {
    if des.rows() == 0 {
        return Ok(Array2::zeros((0, width)));
    }
    let mut converted = Mat::default();
    des.convert_to(&mut converted, core::CV_32F, 1., 0.).map_err(cv_err)?;
    let data = converted.data_typed::<f32>().map_err(cv_err)?;
    let shape = (converted.rows() as usize, converted.cols() as usize);
    Array2::from_shape_vec(shape, data.to_vec()).map_err(CbirError::extraction)
}

fn cv_err(e: opencv::Error) -> CbirError {
    CbirError::extraction(e)
}
