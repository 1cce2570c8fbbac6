use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs, path::Path};
use tempfile::tempdir;

/// Flat recording with one impulse, written as comma-separated text.
fn write_recording(path: &Path, len: usize, peak: usize) -> std::io::Result<()> {
    let text = (0..len)
        .map(|i| if i == peak { "4.0" } else { "0.0" })
        .collect::<Vec<_>>()
        .join(",");
    fs::write(path, text)
}

#[test]
fn extract_prints_window_of_requested_length() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let recording = dir.path().join("beat.csv");
    write_recording(&recording, 200, 120)?;

    let mut cmd = cargo_bin_cmd!("medtriage");
    cmd.args([
        "ecg-extract",
        "--target-len",
        "16",
        "--input",
        recording.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let window: Value = serde_json::from_slice(&output)?;
    assert_eq!(window["samples"].as_array().map(Vec::len), Some(16));
    assert_eq!(window["method"], "centered");
    let peak = window["peak"].as_u64().expect("peak index");
    assert!((118..=122).contains(&peak), "peak {}", peak);
    Ok(())
}

#[test]
fn extract_reads_stdin_and_config() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("triage.toml");
    fs::write(&config, "[extractor]\ntarget_len = 12\n")?;

    let mut cmd = cargo_bin_cmd!("medtriage");
    cmd.args(["--config", config.to_str().expect("utf8 path"), "ecg-extract"])
        .write_stdin("0 0 0 1 5 1 0 0 0 0 0 0 0 0 0 0");
    let output = cmd.assert().success().get_output().stdout.clone();
    let window: Value = serde_json::from_slice(&output)?;
    assert_eq!(window["samples"].as_array().map(Vec::len), Some(12));
    Ok(())
}

#[test]
fn extract_reports_which_file_failed_to_parse() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let recording = dir.path().join("notes.csv");
    fs::write(&recording, "lead,ii\nmissing,data")?;

    let mut cmd = cargo_bin_cmd!("medtriage");
    cmd.args([
        "ecg-extract",
        "--input",
        recording.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().failure().get_output().stderr.clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(stderr.contains("failed to parse"), "{}", stderr);
    assert!(stderr.contains("notes.csv"), "{}", stderr);
    Ok(())
}

#[test]
fn classify_without_model_fails() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let recording = dir.path().join("beat.csv");
    write_recording(&recording, 300, 150)?;

    let mut cmd = cargo_bin_cmd!("medtriage");
    cmd.args([
        "ecg-classify",
        "--input",
        recording.to_str().expect("utf8 path"),
        "--model",
        dir.path().join("missing.json").to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().failure().get_output().stderr.clone();
    assert!(String::from_utf8_lossy(&output).contains("model unavailable"));
    Ok(())
}

#[test]
fn classify_reports_label_and_plot() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let recording = dir.path().join("beat.csv");
    write_recording(&recording, 300, 150)?;
    let config = dir.path().join("triage.toml");
    fs::write(
        &config,
        "[extractor]\ntarget_len = 8\n\n[plot]\nwidth = 300\nheight = 100\n",
    )?;
    // class 0 ("Normal Sinus Rhythm") only looks at the window centre
    let model = dir.path().join("ecg.json");
    let mut weights = vec![vec![0.0f32; 8]; 5];
    for w in &mut weights[0][2..7] {
        *w = 8.0;
    }
    let bias = vec![0.0f32; 5];
    fs::write(
        &model,
        serde_json::to_string(&serde_json::json!({ "weights": weights, "bias": bias }))?,
    )?;

    let mut cmd = cargo_bin_cmd!("medtriage");
    cmd.args([
        "--config",
        config.to_str().expect("utf8 path"),
        "ecg-classify",
        "--input",
        recording.to_str().expect("utf8 path"),
        "--model",
        model.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output)?;
    assert_eq!(report["label"], "Normal Sinus Rhythm");
    assert_eq!(report["class_index"], 0);
    assert_eq!(report["scores"].as_array().map(Vec::len), Some(5));
    assert!(report["plot"]
        .as_str()
        .unwrap_or_default()
        .starts_with("data:image/png;base64,"));
    Ok(())
}

#[test]
fn plot_writes_png_with_one_panel_per_row() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let recording = dir.path().join("beat.csv");
    write_recording(&recording, 600, 300)?;
    let config = dir.path().join("triage.toml");
    fs::write(&config, "[plot]\nwidth = 320\nheight = 90\n")?;
    let out = dir.path().join("ecg.png");

    let mut cmd = cargo_bin_cmd!("medtriage");
    cmd.args([
        "--config",
        config.to_str().expect("utf8 path"),
        "ecg-plot",
        "--input",
        recording.to_str().expect("utf8 path"),
        "--out",
        out.to_str().expect("utf8 path"),
        "--rows",
        "2",
        "--no-grid",
    ]);
    cmd.assert().success();
    let png = image::open(&out)?;
    assert_eq!((png.width(), png.height()), (320, 180));
    Ok(())
}
