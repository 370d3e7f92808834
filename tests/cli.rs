use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::TempDir;
use cbir::codec::write_record;
use cbir::config::FeatureDir;
use cbir::feature::{FeatureRecord, ORB_WIDTH, SIFT_WIDTH};
use cbir::results::read_results;
use ndarray::{Array2, array};
use predicates::prelude::*;
use rstest::*;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

/// 预先写好 3 条特征记录的目录，以及一个空的图片目录
#[fixture]
fn dirs() -> (TempDir, FeatureDir, std::path::PathBuf) {
    let root = TempDir::new().unwrap();
    let features = FeatureDir::new(root.path().join("features"));
    let images = root.path().join("images");
    std::fs::create_dir_all(features.path()).unwrap();
    std::fs::create_dir_all(&images).unwrap();
    for (id, value) in [("a", 0.0f32), ("b", 0.5), ("c c", 2.0)] {
        let record = FeatureRecord::new(
            array![value, 1.0],
            array![1.0, value],
            Array2::zeros((0, SIFT_WIDTH)),
            Array2::from_elem((1, ORB_WIDTH), value),
        );
        write_record(features.record(id), &record).unwrap();
    }
    (root, features, images)
}

#[rstest]
fn search_by_id(dirs: (TempDir, FeatureDir, std::path::PathBuf)) -> Result<()> {
    let (_root, features, images) = dirs;
    cargo_run!("cbir", "-f", features.path(), "-i", &images, "search", "--id", "a", "-t", "HISTOGRAM", "-k", "2")
        .success()
        .stdout(predicate::str::starts_with("0.0000\ta\n"))
        .stdout(predicate::str::contains("\tb\n"))
        .stdout(predicate::str::contains("c c").not());
    Ok(())
}

#[rstest]
fn search_writes_result_file(dirs: (TempDir, FeatureDir, std::path::PathBuf)) -> Result<()> {
    let (root, features, images) = dirs;
    let output = root.path().join("result.txt");
    cargo_run!(
        "cbir", "-f", features.path(), "-i", &images, "search", "--id", "c c", "-t", "orb", "-o", &output
    )
    .success();

    let result = read_results(&output)?;
    let ids: Vec<_> = result.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["c c", "b", "a"]);
    assert_eq!(result[0].distance, 0.0);
    Ok(())
}

#[rstest]
fn search_json_output(dirs: (TempDir, FeatureDir, std::path::PathBuf)) -> Result<()> {
    let (_root, features, images) = dirs;
    cargo_run!(
        "cbir", "-f", features.path(), "-i", &images, "search", "--id", "b", "-t", "SIFT", "--output-format", "json"
    )
    .success()
    .stdout(predicate::str::contains("\"id\": \"a\""))
    .stdout(predicate::str::contains("1.7976931348623157e308"));
    Ok(())
}

#[rstest]
fn search_rejects_unknown_feature(dirs: (TempDir, FeatureDir, std::path::PathBuf)) -> Result<()> {
    let (_root, features, images) = dirs;
    cargo_run!("cbir", "-f", features.path(), "-i", &images, "search", "--id", "a", "-t", "INVALID_TYPE")
        .failure()
        .stderr(predicate::str::contains("INVALID_TYPE"));
    Ok(())
}

#[rstest]
fn search_unknown_id(dirs: (TempDir, FeatureDir, std::path::PathBuf)) -> Result<()> {
    let (_root, features, images) = dirs;
    cargo_run!("cbir", "-f", features.path(), "-i", &images, "search", "--id", "nope")
        .failure()
        .stderr(predicate::str::contains("nope"));
    Ok(())
}

#[cfg(not(feature = "opencv"))]
#[rstest]
fn search_image_needs_opencv(dirs: (TempDir, FeatureDir, std::path::PathBuf)) -> Result<()> {
    let (_root, features, images) = dirs;
    let query = images.join("query.jpg");
    std::fs::write(&query, b"jpeg")?;
    cargo_run!("cbir", "-f", features.path(), "-i", &images, "search", &query)
        .failure()
        .stderr(predicate::str::contains("opencv"));
    Ok(())
}

#[rstest]
fn show_record_shapes(dirs: (TempDir, FeatureDir, std::path::PathBuf)) -> Result<()> {
    let (_root, features, images) = dirs;
    cargo_run!("cbir", "-f", features.path(), "-i", &images, "show", "a")
        .success()
        .stdout(predicate::str::contains("HISTOGRAM   [2]"))
        .stdout(predicate::str::contains("SIFT        [0, 128]"))
        .stdout(predicate::str::contains("ORB         [1, 32]"));
    Ok(())
}
