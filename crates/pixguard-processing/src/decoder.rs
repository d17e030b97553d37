//! Image decoding with integrity verification.
//!
//! `verify` runs before any pixel data is decoded and rejects buffers that are
//! obviously not images or that were cut short in transit. Every error here
//! is permanent: the stored bytes will not change on redelivery.

use std::io::Cursor;

use image::{ImageFormat, ImageReader};

use crate::matrix::PixelMatrix;

/// Smallest buffer that can carry a recognizable signature.
const MIN_IMAGE_BYTES: usize = 8;
const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const PNG_IEND_TRAILER: &[u8] = &[b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82];
const JPEG_SOI: &[u8] = &[0xFF, 0xD8, 0xFF];
const JPEG_EOI: &[u8] = &[0xFF, 0xD9];
/// Encoders and metadata tools may append bytes after the end marker; look
/// for it within this many trailing bytes.
const TRAILER_WINDOW: usize = 1024;
const GIF_TRAILER: u8 = 0x3B;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Empty or undersized buffer: {0} bytes")]
    Truncated(usize),

    #[error("{format:?} data is truncated: {detail}")]
    Incomplete { format: ImageFormat, detail: &'static str },

    #[error("Unrecognized image format")]
    UnrecognizedFormat,

    #[error("Corrupt image data: {0}")]
    Corrupt(String),
}

/// Result of decoding an image.
#[derive(Debug)]
pub struct DecodedImage {
    pub matrix: PixelMatrix,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Size of the encoded buffer
    pub size_bytes: usize,
}

/// Stateless decoder for in-memory image buffers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDecoder;

impl ImageDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Structural checks that need no pixel decoding.
    pub fn verify(&self, data: &[u8]) -> Result<ImageFormat, DecodeError> {
        if data.len() < MIN_IMAGE_BYTES {
            return Err(DecodeError::Truncated(data.len()));
        }

        let format = image::guess_format(data).map_err(|_| DecodeError::UnrecognizedFormat)?;

        match format {
            ImageFormat::Png => {
                if !data.starts_with(PNG_SIGNATURE) || !tail_contains(data, PNG_IEND_TRAILER) {
                    return Err(DecodeError::Incomplete {
                        format,
                        detail: "missing IEND chunk",
                    });
                }
            }
            ImageFormat::Jpeg => {
                if !data.starts_with(JPEG_SOI) || !tail_contains(data, JPEG_EOI) {
                    return Err(DecodeError::Incomplete {
                        format,
                        detail: "missing end-of-image marker",
                    });
                }
            }
            ImageFormat::Gif => {
                if data.last() != Some(&GIF_TRAILER) {
                    return Err(DecodeError::Incomplete {
                        format,
                        detail: "missing trailer byte",
                    });
                }
            }
            _ => {}
        }

        Ok(format)
    }

    /// Verify, then decode the whole buffer into a pixel matrix.
    pub fn decode(&self, data: &[u8]) -> Result<DecodedImage, DecodeError> {
        let format = self.verify(data)?;

        let mut reader = ImageReader::new(Cursor::new(data));
        reader.set_format(format);
        let image = reader
            .decode()
            .map_err(|e| DecodeError::Corrupt(e.to_string()))?;

        let matrix = PixelMatrix::new(image);
        if matrix.pixel_count() == 0 {
            return Err(DecodeError::Corrupt("image has no pixels".to_string()));
        }

        Ok(DecodedImage {
            width: matrix.width(),
            height: matrix.height(),
            matrix,
            format,
            size_bytes: data.len(),
        })
    }
}

fn tail_contains(data: &[u8], marker: &[u8]) -> bool {
    let start = data.len().saturating_sub(TRAILER_WINDOW);
    data[start..].windows(marker.len()).any(|w| w == marker)
}

/// Lowercase name of a detected format, for logs and documents.
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Bmp => "bmp",
        _ => "other",
    }
}
