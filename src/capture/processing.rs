/// 拍摄后处理：裁剪、双画面拼接、JPEG 编码

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// JPEG 编码质量
pub const JPEG_QUALITY: u8 = 90;

/// 裁剪区域配置（允许越界或负值，使用前会被夹紧）
///
/// `width`/`height` 不大于 0 时表示“到图像边缘”
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropRect {
    pub top: i64,
    pub left: i64,
    pub width: i64,
    pub height: i64,
}

/// 夹紧到图像范围内的像素区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl From<PixelRect> for CropRect {
    fn from(rect: PixelRect) -> Self {
        Self {
            top: rect.y as i64,
            left: rect.x as i64,
            width: rect.width as i64,
            height: rect.height as i64,
        }
    }
}

impl CropRect {
    /// 全零表示不裁剪
    pub fn is_full_frame(&self) -> bool {
        *self == CropRect::default()
    }

    /// 夹紧到 `image_width` x `image_height` 范围内，永不失败
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> PixelRect {
        let (x, width) = clamp_axis(self.left, self.width, image_width);
        let (y, height) = clamp_axis(self.top, self.height, image_height);
        PixelRect { x, y, width, height }
    }
}

fn clamp_axis(start: i64, len: i64, extent: u32) -> (u32, u32) {
    let extent = extent as i64;
    if extent == 0 {
        return (0, 0);
    }

    let start = start.clamp(0, extent - 1);
    let remaining = extent - start;
    let len = if len <= 0 { remaining } else { len.min(remaining) };
    (start as u32, len as u32)
}

/// 按配置裁剪
pub fn crop(image: &DynamicImage, rect: &CropRect) -> DynamicImage {
    if rect.is_full_frame() {
        return image.clone();
    }
    let (width, height) = image.dimensions();
    let r = rect.clamp_to(width, height);
    image.crop_imm(r.x, r.y, r.width, r.height)
}

/// 拼接方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackOrientation {
    /// 主画面在上，副画面在下
    #[default]
    Vertical,
    /// 主画面在左，副画面在右
    Horizontal,
}

/// 将副画面等比缩放进主画面尺寸、居中补黑边后与主画面拼接
pub fn stack(primary: &DynamicImage, secondary: &DynamicImage, orientation: StackOrientation) -> RgbImage {
    let primary = primary.to_rgb8();
    let (pw, ph) = primary.dimensions();
    let (sw, sh) = secondary.dimensions();

    let scale = f64::min(pw as f64 / sw.max(1) as f64, ph as f64 / sh.max(1) as f64);
    let nw = ((sw as f64 * scale).round() as u32).clamp(1, pw);
    let nh = ((sh as f64 * scale).round() as u32).clamp(1, ph);
    let resized = imageops::resize(&secondary.to_rgb8(), nw, nh, FilterType::Triangle);

    let mut padded = RgbImage::new(pw, ph);
    imageops::replace(&mut padded, &resized, ((pw - nw) / 2) as i64, ((ph - nh) / 2) as i64);

    let (canvas_w, canvas_h, offset) = match orientation {
        StackOrientation::Vertical => (pw, ph * 2, (0, ph as i64)),
        StackOrientation::Horizontal => (pw * 2, ph, (pw as i64, 0)),
    };

    let mut canvas = RgbImage::new(canvas_w, canvas_h);
    imageops::replace(&mut canvas, &primary, 0, 0);
    imageops::replace(&mut canvas, &padded, offset.0, offset.1);
    canvas
}

/// 编码为 JPEG
pub fn encode_jpeg(image: &DynamicImage) -> AppResult<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(buf)
}
