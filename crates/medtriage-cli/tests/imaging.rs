use assert_cmd::cargo::cargo_bin_cmd;
use image::{Rgb, RgbImage};
use serde_json::{json, Value};
use std::{error::Error, fs, path::Path};
use tempfile::tempdir;

/// Left half bright red, right half dull.
fn write_photo(path: &Path) -> Result<(), Box<dyn Error>> {
    let img = RgbImage::from_fn(64, 48, |x, _| {
        if x < 32 {
            Rgb([250, 40, 40])
        } else {
            Rgb([120, 40, 40])
        }
    });
    img.save(path)?;
    Ok(())
}

/// Two classes; class 1 responds to red.
fn write_model(path: &Path) -> Result<(), Box<dyn Error>> {
    let model = json!({
        "pool": 8,
        "conv_weights": [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
        "conv_bias": [0.0, 0.0],
        "head_weights": [[0.0, 1.0], [4.0, 0.0]],
        "head_bias": [0.0, 0.0]
    });
    fs::write(path, serde_json::to_string(&model)?)?;
    Ok(())
}

#[test]
fn skin_classification_reports_scabies_with_overlay() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let photo = dir.path().join("arm.png");
    let model = dir.path().join("skin.json");
    let overlay = dir.path().join("overlay.png");
    write_photo(&photo)?;
    write_model(&model)?;

    let mut cmd = cargo_bin_cmd!("medtriage");
    cmd.args([
        "image-classify",
        "--input",
        photo.to_str().expect("utf8 path"),
        "--kind",
        "skin",
        "--model",
        model.to_str().expect("utf8 path"),
        "--overlay-out",
        overlay.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output)?;
    assert_eq!(report["kind"], "skin");
    assert_eq!(report["label"], "Scabies");
    assert_eq!(report["heatmap_applied"], true);
    assert!(report["treatment"].is_string());
    assert!(report["enhanced"].is_string());

    let written = image::open(&overlay)?;
    assert_eq!((written.width(), written.height()), (64, 48));
    Ok(())
}

#[test]
fn gradcam_explains_requested_class() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let photo = dir.path().join("xray.png");
    let model = dir.path().join("bone.json");
    let out = dir.path().join("cam.png");
    write_photo(&photo)?;
    write_model(&model)?;

    let mut cmd = cargo_bin_cmd!("medtriage");
    cmd.args([
        "gradcam",
        "--input",
        photo.to_str().expect("utf8 path"),
        "--model",
        model.to_str().expect("utf8 path"),
        "--out",
        out.to_str().expect("utf8 path"),
        "--class",
        "1",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["class_index"], 1);
    assert_eq!(summary["width"], 64);
    assert!(out.exists());
    Ok(())
}

#[test]
fn gradcam_rejects_unknown_class() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let photo = dir.path().join("xray.png");
    let model = dir.path().join("bone.json");
    write_photo(&photo)?;
    write_model(&model)?;

    let mut cmd = cargo_bin_cmd!("medtriage");
    cmd.args([
        "gradcam",
        "--input",
        photo.to_str().expect("utf8 path"),
        "--model",
        model.to_str().expect("utf8 path"),
        "--out",
        dir.path().join("cam.png").to_str().expect("utf8 path"),
        "--class",
        "7",
    ]);
    cmd.assert().failure();
    Ok(())
}

#[test]
fn undecodable_upload_fails() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let photo = dir.path().join("broken.png");
    let model = dir.path().join("skin.json");
    fs::write(&photo, b"not an image")?;
    write_model(&model)?;

    let mut cmd = cargo_bin_cmd!("medtriage");
    cmd.args([
        "image-classify",
        "--input",
        photo.to_str().expect("utf8 path"),
        "--kind",
        "bone",
        "--model",
        model.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().failure().get_output().stderr.clone();
    assert!(String::from_utf8_lossy(&output).contains("failed to parse input"));
    Ok(())
}

#[test]
fn brain_measures_boxed_region() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let scan = dir.path().join("mri.png");
    RgbImage::from_fn(100, 100, |x, y| {
        if (40..60).contains(&x) && (40..60).contains(&y) {
            Rgb([230, 230, 230])
        } else {
            Rgb([15, 15, 15])
        }
    })
    .save(&scan)?;
    let boxes = dir.path().join("boxes.json");
    fs::write(
        &boxes,
        serde_json::to_string(&json!([
            { "label": "no_tumor", "confidence": 0.9, "bbox": [0, 0, 20, 20] },
            { "label": "glioma", "confidence": 0.7, "bbox": [30, 30, 70, 70] }
        ]))?,
    )?;
    let annotated = dir.path().join("annotated.png");

    let mut cmd = cargo_bin_cmd!("medtriage");
    cmd.args([
        "brain",
        "--input",
        scan.to_str().expect("utf8 path"),
        "--detections",
        boxes.to_str().expect("utf8 path"),
        "--annotated-out",
        annotated.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output)?;
    assert_eq!(report["label"], "glioma");
    let size = report["tumor_size_percent"].as_f64().unwrap_or_default();
    assert!((size - 4.0).abs() < 0.5, "tumor size {}", size);
    assert!(annotated.exists());
    Ok(())
}

#[test]
fn brain_stretches_faint_regions_before_thresholding() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let scan = dir.path().join("faint.png");
    // a 20x20 lesion only ten grey levels above its surroundings
    RgbImage::from_fn(100, 100, |x, y| {
        if (40..60).contains(&x) && (40..60).contains(&y) {
            Rgb([110, 110, 110])
        } else {
            Rgb([100, 100, 100])
        }
    })
    .save(&scan)?;
    let boxes = dir.path().join("boxes.json");
    fs::write(
        &boxes,
        serde_json::to_string(&json!([
            { "label": "pituitary", "confidence": 0.55, "bbox": [30, 30, 70, 70] }
        ]))?,
    )?;

    let mut cmd = cargo_bin_cmd!("medtriage");
    cmd.args([
        "brain",
        "--input",
        scan.to_str().expect("utf8 path"),
        "--detections",
        boxes.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output)?;
    assert_eq!(report["label"], "pituitary");
    let size = report["tumor_size_percent"].as_f64().unwrap_or_default();
    assert!((size - 4.0).abs() < 0.5, "tumor size {}", size);
    Ok(())
}
