/// 时间戳叠加
///
/// 在图片右下角绘制半透明黑底白字的时间标签。使用内置 5x7 点阵字体，
/// 只支持数字、'-'、':' 和空格，足够显示 `YYYY-MM-DD HH:MM:SS`。

use image::{DynamicImage, Rgb, RgbImage};

use crate::capture::processing::encode_jpeg;
use crate::error::{AppError, AppResult};

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
/// 背景不透明度
const BACKGROUND_ALPHA: f32 = 0.6;

fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        ' ' => [0x00; 7],
        _ => return None,
    };
    Some(rows)
}

/// 根据图片高度选择字体放大倍数
fn scale_for(height: u32) -> u32 {
    (height / 240).clamp(1, 8)
}

/// 在图片右下角绘制标签；标签放不下或包含不支持的字符时返回错误
pub fn draw_label(image: &mut RgbImage, label: &str) -> AppResult<()> {
    let glyphs = label
        .chars()
        .map(|c| glyph(c).ok_or_else(|| AppError::image(30, format!("不支持的标签字符: {:?}", c))))
        .collect::<AppResult<Vec<_>>>()?;

    let (width, height) = image.dimensions();
    let scale = scale_for(height);
    let padding = 4 * scale;
    let advance = (GLYPH_WIDTH + 1) * scale;

    let text_w = advance * glyphs.len() as u32;
    let text_h = GLYPH_HEIGHT * scale;
    let box_w = text_w + padding * 2;
    let box_h = text_h + padding * 2;

    if glyphs.is_empty() || box_w > width || box_h > height {
        return Err(AppError::image(
            31,
            format!("图片 {}x{} 放不下时间标签", width, height),
        ));
    }

    let box_x = width - box_w;
    let box_y = height - box_h;

    for y in box_y..height {
        for x in box_x..width {
            let pixel = image.get_pixel_mut(x, y);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as f32 * (1.0 - BACKGROUND_ALPHA)).round() as u8;
            }
        }
    }

    let origin_x = box_x + padding;
    let origin_y = box_y + padding;
    for (index, rows) in glyphs.iter().enumerate() {
        let glyph_x = origin_x + index as u32 * advance;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                let px = glyph_x + col * scale;
                let py = origin_y + row as u32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        image.put_pixel(px + dx, py + dy, Rgb([255, 255, 255]));
                    }
                }
            }
        }
    }

    Ok(())
}

/// 解码 JPEG、叠加标签后重新编码；原始字节不受影响
pub fn annotate_jpeg(bytes: &[u8], label: &str) -> AppResult<Vec<u8>> {
    let mut image = image::load_from_memory(bytes)?.to_rgb8();
    draw_label(&mut image, label)?;
    encode_jpeg(&DynamicImage::ImageRgb8(image))
}
