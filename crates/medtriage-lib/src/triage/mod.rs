//! Request-level pipelines tying parsing, models and rendering together.
//!
//! Heavy collaborators (detection networks, contrast enhancement, the DICOM
//! archive) sit behind the traits in this module so the pipelines stay
//! synchronous and testable with in-memory stand-ins.

pub mod brain;
pub mod ecg;
pub mod enhance;
pub mod imaging;

use crate::config::ArchiveConfig;
use crate::error::{ModelError, TriageError};
use crate::io::image::decode_image;
use image::RgbImage;
use log::{info, warn};
use serde::{Deserialize, Serialize};

pub use brain::{analyze_brain, BrainAnalysis, BrainReport};
pub use ecg::{EcgPipeline, EcgReport};
pub use enhance::ContrastStretch;
pub use imaging::{ImageAnalysis, ImageKind, ImagePipeline, ImageReport};

pub trait ImageEnhancer {
    fn enhance(&self, image: &RgbImage) -> RgbImage;
}

/// Identifiers assigned by the archive to a stored instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveUpload {
    pub instance_id: String,
    pub study_uid: String,
    pub frame_count: u32,
}

/// DICOM storage with a rendered preview per instance.
pub trait ArchiveClient {
    /// Stores the file; uploads sharing a `batch_id` are grouped into one study.
    fn upload(&self, bytes: &[u8], batch_id: Option<&str>) -> anyhow::Result<ArchiveUpload>;
    fn fetch_preview(&self, instance_id: &str) -> Option<RgbImage>;
}

/// One labelled box, corners in pixel coordinates `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: [u32; 4],
}

pub trait BoxDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, ModelError>;
}

/// Decoded upload plus archive links when it went through the archive.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub image: RgbImage,
    pub study_uid: Option<String>,
    pub viewer_url: Option<String>,
    pub frame_count: Option<u32>,
}

pub fn is_dicom(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".dcm")
}

/// Turns an uploaded file into an RGB image.
///
/// `.dcm` files are stored in the archive and its rendered preview is used;
/// anything else must decode as a regular image.
pub fn load_upload(
    filename: &str,
    bytes: &[u8],
    batch_id: Option<&str>,
    archive: Option<&dyn ArchiveClient>,
    cfg: &ArchiveConfig,
) -> Result<LoadedImage, TriageError> {
    if !is_dicom(filename) {
        return Ok(LoadedImage {
            image: decode_image(bytes)?,
            study_uid: None,
            viewer_url: None,
            frame_count: None,
        });
    }
    let archive = archive
        .ok_or_else(|| TriageError::Archive("no archive configured for DICOM uploads".into()))?;
    let upload = archive
        .upload(bytes, batch_id)
        .map_err(|e| TriageError::Archive(format!("upload of {} failed: {:#}", filename, e)))?;
    info!(
        "stored {} as instance {} in study {} ({} frames)",
        filename, upload.instance_id, upload.study_uid, upload.frame_count
    );
    let image = archive.fetch_preview(&upload.instance_id).ok_or_else(|| {
        warn!("archive has no preview for instance {}", upload.instance_id);
        TriageError::Archive(format!("no preview for instance {}", upload.instance_id))
    })?;
    Ok(LoadedImage {
        image,
        viewer_url: Some(cfg.viewer_url(&upload.study_uid)),
        study_uid: Some(upload.study_uid),
        frame_count: Some(upload.frame_count),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::image::encode_png;
    use image::Rgb;
    use anyhow::bail;

    struct MemoryArchive {
        fail: bool,
    }

    impl ArchiveClient for MemoryArchive {
        fn upload(&self, bytes: &[u8], batch_id: Option<&str>) -> anyhow::Result<ArchiveUpload> {
            if self.fail {
                bail!("connection refused");
            }
            Ok(ArchiveUpload {
                instance_id: format!("inst-{}", bytes.len()),
                study_uid: batch_id.unwrap_or("1.2.3").to_string(),
                frame_count: 1,
            })
        }

        fn fetch_preview(&self, _instance_id: &str) -> Option<RgbImage> {
            Some(RgbImage::from_pixel(4, 3, Rgb([9, 9, 9])))
        }
    }

    #[test]
    fn dicom_goes_through_archive_with_viewer_link() {
        let archive = MemoryArchive { fail: false };
        let loaded = load_upload(
            "scan.DCM",
            b"DICM",
            Some("9.8.7"),
            Some(&archive),
            &ArchiveConfig::default(),
        )
        .unwrap();
        assert_eq!(loaded.image.dimensions(), (4, 3));
        assert_eq!(loaded.study_uid.as_deref(), Some("9.8.7"));
        assert_eq!(
            loaded.viewer_url.as_deref(),
            Some("http://localhost:8042/ohif/viewer?StudyInstanceUIDs=9.8.7")
        );
    }

    #[test]
    fn archive_failure_is_reported() {
        let archive = MemoryArchive { fail: true };
        let err = load_upload("a.dcm", b"x", None, Some(&archive), &ArchiveConfig::default())
            .unwrap_err();
        assert!(matches!(err, TriageError::Archive(msg) if msg.contains("connection refused")));
        let err = load_upload("a.dcm", b"x", None, None, &ArchiveConfig::default()).unwrap_err();
        assert!(matches!(err, TriageError::Archive(_)));
    }

    #[test]
    fn plain_images_are_decoded_directly() {
        let png = encode_png(&RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))).unwrap();
        let loaded = load_upload("xray.png", &png, None, None, &ArchiveConfig::default()).unwrap();
        assert_eq!(loaded.image.dimensions(), (2, 2));
        assert!(loaded.viewer_url.is_none());
        assert!(matches!(
            load_upload("xray.png", b"garbage", None, None, &ArchiveConfig::default()),
            Err(TriageError::Parse(_))
        ));
    }
}
