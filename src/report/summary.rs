/// 动图摘要
///
/// 把当天按时间排序的图片合成为一个循环播放的 GIF

use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, Frame};

use crate::error::{AppError, AppResult};

/// 动图参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryOptions {
    /// 每帧显示时长（毫秒）
    pub frame_duration_ms: u32,
    /// 最大宽度，超出时等比缩小
    pub max_width: u32,
}

/// 计算输出尺寸：以第一帧为准，宽度不超过 max_width
fn target_size(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || max_width == 0 {
        return (width.max(1), height.max(1));
    }
    let ratio = max_width as f64 / width as f64;
    let scaled = ((height as f64 * ratio).round() as u32).max(1);
    (max_width, scaled)
}

/// 由编码后的图片生成 GIF；所有帧缩放到相同尺寸
pub fn build_gif(frames: &[Vec<u8>], options: &SummaryOptions) -> AppResult<Vec<u8>> {
    let Some(first) = frames.first() else {
        return Err(AppError::image(40, "没有可用于生成动图的图片"));
    };

    let first = image::load_from_memory(first)?;
    let (width, height) = target_size(first.width(), first.height(), options.max_width);
    let delay = Delay::from_numer_denom_ms(options.frame_duration_ms, 1);

    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut buf, 10);
        encoder.set_repeat(Repeat::Infinite)?;

        for bytes in frames {
            let image = image::load_from_memory(bytes)?;
            let rgba = imageops::resize(&image.to_rgba8(), width, height, FilterType::Triangle);
            encoder.encode_frame(Frame::from_parts(rgba, 0, 0, delay))?;
        }
    }

    Ok(buf)
}
