//! Default image and metadata writers.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use image::ImageFormat;
use tiff::encoder::{colortype, TiffEncoder};

use crate::models::{DepthImage, FrameImage, FrameMetadata};

use super::{OutputError, OutputResult};

/// Writes frame images.
pub trait ImageWriter: Send + Sync {
    fn write(&self, image: &FrameImage, path: &Path) -> OutputResult<()>;
}

/// Writes frame metadata.
pub trait MetadataWriter: Send + Sync {
    fn write(&self, metadata: &FrameMetadata, path: &Path) -> OutputResult<()>;
}

/// Raster writer: color as 8-bit RGB PNG, depth as single-channel f32 TIFF.
///
/// Images the decoder already stored on disk are copied unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterWriter;

impl RasterWriter {
    fn write_depth(depth: &DepthImage, path: &Path) -> OutputResult<()> {
        let file = File::create(path).map_err(|e| OutputError::io(path, e))?;
        let mut writer = BufWriter::new(file);

        {
            let mut encoder =
                TiffEncoder::new(&mut writer).map_err(|e| OutputError::encode(path, e))?;
            encoder
                .write_image::<colortype::Gray32Float>(depth.width, depth.height, &depth.meters)
                .map_err(|e| OutputError::encode(path, e))?;
        }

        writer.flush().map_err(|e| OutputError::io(path, e))
    }
}

impl ImageWriter for RasterWriter {
    fn write(&self, image: &FrameImage, path: &Path) -> OutputResult<()> {
        match image {
            FrameImage::Color(rgb) => rgb
                .save_with_format(path, ImageFormat::Png)
                .map_err(|e| OutputError::encode(path, e)),
            FrameImage::Depth(depth) => Self::write_depth(depth, path),
            FrameImage::Stored(source) => fs::copy(source, path)
                .map(|_| ())
                .map_err(|e| OutputError::io(path, e)),
        }
    }
}

/// Writes metadata as one `key: value` line per entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextMetadataWriter;

impl MetadataWriter for TextMetadataWriter {
    fn write(&self, metadata: &FrameMetadata, path: &Path) -> OutputResult<()> {
        let mut content = String::new();
        for (key, value) in metadata.iter() {
            content.push_str(key);
            content.push_str(": ");
            content.push_str(value);
            content.push('\n');
        }
        fs::write(path, content).map_err(|e| OutputError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use tempfile::tempdir;

    #[test]
    fn writes_color_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.png");
        let mut rgb = RgbImage::new(3, 2);
        rgb.put_pixel(1, 1, image::Rgb([10, 20, 30]));

        RasterWriter.write(&FrameImage::Color(rgb), &path).unwrap();

        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(1, 1).0, [10, 20, 30]);
    }

    #[test]
    fn writes_depth_tiff() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.tiff");
        let depth = DepthImage::new(2, 2, vec![0.5, 1.0, 1.5, 2.0]).unwrap();

        RasterWriter.write(&FrameImage::Depth(depth), &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*"));
    }

    #[test]
    fn copies_stored_images() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src.png");
        fs::write(&source, b"encoded").unwrap();
        let target = dir.path().join("dst.png");

        RasterWriter.write(&FrameImage::Stored(source), &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"encoded");
    }

    #[test]
    fn missing_stored_image_is_an_io_error() {
        let dir = tempdir().unwrap();
        let result = RasterWriter.write(
            &FrameImage::Stored(dir.path().join("gone.png")),
            &dir.path().join("out.png"),
        );
        assert!(matches!(result, Err(OutputError::Io { .. })));
    }

    #[test]
    fn writes_key_value_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.txt");
        let meta = FrameMetadata::new()
            .with("Stream", "Color")
            .with("frame_number", 3);

        TextMetadataWriter.write(&meta, &path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Stream: Color\nframe_number: 3\n"
        );
    }
}
