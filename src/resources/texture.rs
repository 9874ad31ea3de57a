//! Texture loading and upload

use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageResult};

use crate::backend::*;
use crate::context::RenderContext;

/// Decoded RGBA8 texel data
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ImageResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path)?;
        Ok(Self::from_image(img, &name))
    }

    // GL samples row 0 at v = 0, so images are stored bottom-up
    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        let mut rgba = img.to_rgba8();
        image::imageops::flip_vertical_in_place(&mut rgba);

        Self {
            width,
            height,
            data: rgba.into_raw(),
            name: name.to_string(),
        }
    }

    /// Create a checkerboard texture with `cell`-pixel squares
    pub fn checkerboard(size: u32, cell: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / cell) + (y / cell)) % 2 == 0;
                let color = if is_even { color1 } else { color2 };
                data.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            data,
            name: "checkerboard".to_string(),
        }
    }
}

/// Texture living on the device
#[derive(Debug, Clone)]
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub name: String,
}

impl GpuTexture {
    /// Create the texture and upload `data`
    pub fn create(ctx: &mut RenderContext, data: &TextureData) -> BackendResult<Self> {
        let handle = ctx.create_texture(&TextureDescriptor {
            label: Some(data.name.clone()),
            width: data.width,
            height: data.height,
            format: TextureFormat::Rgba8Unorm,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
        })?;
        ctx.write_texture(handle, &data.data)?;

        Ok(Self {
            handle,
            width: data.width,
            height: data.height,
            name: data.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkerboard_layout() {
        let black = [0, 0, 0, 255];
        let white = [255, 255, 255, 255];
        let tex = TextureData::checkerboard(4, 2, black, white);
        assert_eq!(tex.data.len(), 4 * 4 * 4);
        assert_eq!(&tex.data[0..4], &black);
        assert_eq!(&tex.data[8..12], &white);
    }

    #[test]
    fn test_from_file_flips_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strip.png");
        let mut img = image::RgbaImage::new(1, 2);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(0, 1, image::Rgba([0, 0, 255, 255]));
        img.save(&path).unwrap();

        let tex = TextureData::from_file(&path).unwrap();
        assert_eq!((tex.width, tex.height), (1, 2));
        assert_eq!(tex.name, "strip.png");
        assert_eq!(&tex.data[0..4], &[0, 0, 255, 255]);
        assert_eq!(&tex.data[4..8], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(TextureData::from_file("does/not/exist.png").is_err());
    }
}
