use anyhow::{Context, Result, bail};
use fast_image_resize as fir;
use image::{Rgba, RgbaImage, imageops};

use crate::config::Size;
use crate::processing::layout::{center_offset, cover_crop, resize_to_contain};

const LETTERBOX: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Center-crops `source` to the aspect ratio of `target`, then scales the crop
/// to exactly `target`. Never stretched, never letterboxed.
pub fn crop_to_fill(source: &RgbaImage, target: Size) -> Result<RgbaImage> {
    ensure_target(target)?;
    let (crop_w, crop_h) =
        cover_crop(target.width, target.height, source.width(), source.height());
    let (crop_x, crop_y) = center_offset(crop_w, crop_h, source.width(), source.height());
    if crop_w == source.width() && crop_h == source.height() {
        return resize_rgba(source, target.width, target.height);
    }
    let cropped = imageops::crop_imm(source, crop_x, crop_y, crop_w, crop_h).to_image();
    resize_rgba(&cropped, target.width, target.height)
}

/// Scales `source` to fit inside `target` and centers it on a black canvas.
pub fn fit_center(source: &RgbaImage, target: Size) -> Result<RgbaImage> {
    ensure_target(target)?;
    let (fg_w, fg_h) =
        resize_to_contain(target.width, target.height, source.width(), source.height());
    let resized = resize_rgba(source, fg_w, fg_h)?;
    let mut canvas = RgbaImage::from_pixel(target.width, target.height, LETTERBOX);
    let (ox, oy) = center_offset(fg_w, fg_h, target.width, target.height);
    imageops::replace(&mut canvas, &resized, i64::from(ox), i64::from(oy));
    Ok(canvas)
}

/// Quarter turn clockwise.
pub fn rotate_quarter(source: &RgbaImage) -> RgbaImage {
    imageops::rotate90(source)
}

/// Blank opaque frame used when an image cannot be decoded.
pub fn placeholder(target: Size) -> RgbaImage {
    RgbaImage::from_pixel(target.width.max(1), target.height.max(1), LETTERBOX)
}

fn ensure_target(target: Size) -> Result<()> {
    if target.is_empty() {
        bail!("target size must be positive, got {target}");
    }
    Ok(())
}

fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        bail!("resize dimensions must be positive");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("resize failed")?;
    let buffer = dst_image.into_vec();
    RgbaImage::from_raw(target_w, target_h, buffer)
        .context("failed to construct resized RGBA image")
}
