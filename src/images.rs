use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat};

use crate::error::ApiError;

pub const UPLOAD_FIELD: &str = "images";
pub const MAX_IMAGES: usize = 5;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const ACCEPTED_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];
pub const PROFILE_FILE_NAME: &str = "profile.jpg";

const SNIFF_LEN: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no images selected")]
    Empty,
    #[error("at most {max} images can be uploaded, got {count}")]
    TooMany { count: usize, max: usize },
    #[error("{file_name}: only JPG, PNG and WEBP images are accepted (got {mime})")]
    UnsupportedType { file_name: String, mime: String },
    #[error("{file_name}: image is {size} bytes, the limit is {max} bytes")]
    TooLarge {
        file_name: String,
        size: usize,
        max: usize,
    },
    #[error("crop area {0:?} lies outside the image")]
    InvalidCrop(CropRect),
    #[error("read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("process image: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let mime = detect_mime(&bytes);
        Self {
            file_name: file_name.into(),
            mime,
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, UploadError> {
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        Ok(Self::new(file_name, bytes))
    }
}

/// Checks a batch before it is sent; `existing` counts images already attached
/// to the item being edited.
pub fn validate(files: &[ImageFile], existing: usize) -> Result<(), UploadError> {
    if files.is_empty() {
        return Err(UploadError::Empty);
    }
    let count = existing + files.len();
    if count > MAX_IMAGES {
        return Err(UploadError::TooMany {
            count,
            max: MAX_IMAGES,
        });
    }
    for file in files {
        if !ACCEPTED_TYPES.contains(&file.mime.as_str()) {
            return Err(UploadError::UnsupportedType {
                file_name: file.file_name.clone(),
                mime: file.mime.clone(),
            });
        }
        if file.bytes.len() > MAX_IMAGE_BYTES {
            return Err(UploadError::TooLarge {
                file_name: file.file_name.clone(),
                size: file.bytes.len(),
                max: MAX_IMAGE_BYTES,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Cuts `rect` out of an encoded image and re-encodes it as a JPEG profile
/// picture.
pub fn crop_to_jpeg(bytes: &[u8], rect: CropRect) -> Result<ImageFile, UploadError> {
    let decoded = image::load_from_memory(bytes)?;
    let fits = rect.width > 0
        && rect.height > 0
        && rect.x.checked_add(rect.width).is_some_and(|right| right <= decoded.width())
        && rect.y.checked_add(rect.height).is_some_and(|bottom| bottom <= decoded.height());
    if !fits {
        return Err(UploadError::InvalidCrop(rect));
    }

    let cropped = decoded.crop_imm(rect.x, rect.y, rect.width, rect.height);
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(cropped.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)?;

    Ok(ImageFile {
        file_name: PROFILE_FILE_NAME.to_string(),
        mime: "image/jpeg".to_string(),
        bytes: out.into_inner(),
    })
}

fn detect_mime(bytes: &[u8]) -> String {
    let mime = match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        // Magic numbers live in the header; the rest of the file is noise.
        _ => tree_magic_mini::from_u8(&bytes[..bytes.len().min(SNIFF_LEN)]),
    };
    mime.to_string()
}
