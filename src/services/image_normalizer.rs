//! 图片预处理服务 - 业务能力层
//!
//! 把原始图片字节变成送入模型的标准图片：
//! 解码 → 对比度/亮度 → 锐化 → 降噪 → 缩放（或居中填充到固定画布）。
//!
//! 增强步骤都是尽力而为：某一步出错时记录日志，继续使用上一步的结果。
//! 这里全是 CPU 密集的同步代码，调用方负责放到 `spawn_blocking` 中执行。

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::ImageRef;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::imageops::FilterType;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 锐化卷积核
const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// 画布模式的背景色
const CANVAS_BACKGROUND: [u8; 3] = [255, 255, 255];

/// 缩放方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// 宽度超过上限时按比例缩小，不放大
    MaxWidth(u32),
    /// 按比例缩放后居中放到固定尺寸的画布上
    Canvas {
        width: u32,
        height: u32,
        background: [u8; 3],
    },
}

/// 增强参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhanceSettings {
    pub contrast_alpha: f32,
    pub brightness_beta: f32,
    pub sharpen: bool,
    pub denoise: bool,
}

impl Default for EnhanceSettings {
    fn default() -> Self {
        Self {
            contrast_alpha: 1.3,
            brightness_beta: 0.0,
            sharpen: true,
            denoise: true,
        }
    }
}

/// 预处理后的标准图片
///
/// 构造时即编码为 PNG data URL，推理调用只需要引用它
#[derive(Debug, Clone)]
pub struct CanonicalImage {
    pixels: RgbImage,
    data_url: String,
    encoded_len: usize,
}

impl CanonicalImage {
    /// 编码为 PNG（CPU 密集，在工作线程中调用）
    pub fn encode(pixels: RgbImage) -> Result<Self, image::ImageError> {
        let mut buffer = Cursor::new(Vec::new());
        pixels.write_to(&mut buffer, ImageFormat::Png)?;
        let png = buffer.into_inner();
        Ok(Self {
            data_url: format!("data:image/png;base64,{}", STANDARD.encode(&png)),
            encoded_len: png.len(),
            pixels,
        })
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// `data:image/png;base64,...`
    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// PNG 字节数
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }
}

/// 图片预处理服务
pub struct ImageNormalizer {
    enhance: EnhanceSettings,
    resize: ResizeMode,
    save_dir: Option<PathBuf>,
}

impl ImageNormalizer {
    /// 根据配置创建
    pub fn new(config: &Config) -> Self {
        let resize = match config.canvas_size() {
            Some((width, height)) => ResizeMode::Canvas {
                width,
                height,
                background: CANVAS_BACKGROUND,
            },
            None => ResizeMode::MaxWidth(config.target_width),
        };
        let save_dir = config
            .save_normalized_images
            .then(|| PathBuf::from(&config.normalized_output_dir));

        Self {
            enhance: EnhanceSettings::default(),
            resize,
            save_dir,
        }
    }

    pub fn with_settings(enhance: EnhanceSettings, resize: ResizeMode) -> Self {
        Self {
            enhance,
            resize,
            save_dir: None,
        }
    }

    pub fn save_dir(&self) -> Option<&Path> {
        self.save_dir.as_deref()
    }

    /// 解码并预处理
    pub fn normalize(&self, raw: &[u8], name: &str) -> Result<CanonicalImage, PipelineError> {
        let decoded = image::load_from_memory(raw).map_err(|e| PipelineError::InvalidImage {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(PipelineError::InvalidImage {
                name: name.to_string(),
                reason: "图片尺寸为 0".to_string(),
            });
        }

        let mut current = decoded.to_rgb8();
        let settings = self.enhance;

        current = apply_step(name, "对比度/亮度", current, |img| {
            adjust_contrast(img, settings.contrast_alpha, settings.brightness_beta)
        });
        if settings.sharpen {
            current = apply_step(name, "锐化", current, sharpen);
        }
        if settings.denoise {
            current = apply_step(name, "降噪", current, median_denoise);
        }

        let pixels = match self.resize {
            ResizeMode::MaxWidth(target_width) => resize_to_width(current, target_width, name),
            ResizeMode::Canvas {
                width,
                height,
                background,
            } => pad_to_canvas(current, width, height, background, name),
        };

        debug!(
            "图片 {}: 预处理完成，尺寸 {}x{}",
            name,
            pixels.width(),
            pixels.height()
        );
        CanonicalImage::encode(pixels).map_err(|e| PipelineError::InvalidImage {
            name: name.to_string(),
            reason: format!("PNG 编码失败: {}", e),
        })
    }

    /// 保存预处理结果（用于排查问题）
    ///
    /// 返回保存路径；未开启保存时返回 `Ok(None)`
    pub fn persist(
        &self,
        image: &CanonicalImage,
        source: &ImageRef,
    ) -> Result<Option<PathBuf>, image::ImageError> {
        let Some(dir) = &self.save_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;
        let path = dir.join(preprocessed_file_name(source));
        image.pixels.save(&path)?;
        Ok(Some(path))
    }
}

/// `<stem>_preprocessed.<ext>`，没有扩展名时使用 `.jpg`
///
/// 远程文件夹中文件名可以重复，远程图片在主干后加上文件 ID
pub fn preprocessed_file_name(image: &ImageRef) -> String {
    let path = Path::new(&image.name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| image.name.clone());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "jpg".to_string());
    match image.file_id() {
        Some(id) => format!("{}_{}_preprocessed.{}", stem, id, ext),
        None => format!("{}_preprocessed.{}", stem, ext),
    }
}

/// 执行一个增强步骤，失败（包括 panic）时保留原图
fn apply_step<F>(name: &str, step: &str, input: RgbImage, f: F) -> RgbImage
where
    F: FnOnce(&RgbImage) -> Result<RgbImage, String>,
{
    match catch_unwind(AssertUnwindSafe(|| f(&input))) {
        Ok(Ok(output)) => {
            debug!("图片 {}: {} 完成", name, step);
            output
        }
        Ok(Err(e)) => {
            warn!("图片 {}: {} 失败，跳过此步骤: {}", name, step, e);
            input
        }
        Err(_) => {
            warn!("图片 {}: {} 异常退出，跳过此步骤", name, step);
            input
        }
    }
}

/// `v * alpha + beta`，结果截断到 0..=255
pub fn adjust_contrast(image: &RgbImage, alpha: f32, beta: f32) -> Result<RgbImage, String> {
    if !alpha.is_finite() || !beta.is_finite() {
        return Err(format!("参数无效: alpha={}, beta={}", alpha, beta));
    }
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let value = (*channel as f32 * alpha + beta).round();
            *channel = value.clamp(0.0, 255.0) as u8;
        }
    }
    Ok(output)
}

pub fn sharpen(image: &RgbImage) -> Result<RgbImage, String> {
    Ok(image::imageops::filter3x3(image, &SHARPEN_KERNEL))
}

/// 3x3 逐通道中值滤波，边缘像素取邻域内的有效像素
pub fn median_denoise(image: &RgbImage) -> Result<RgbImage, String> {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return Err(format!("尺寸过小: {}x{}", width, height));
    }

    let mut output = RgbImage::new(width, height);
    let mut window: Vec<u8> = Vec::with_capacity(9);
    for y in 0..height {
        for x in 0..width {
            let mut median = [0u8; 3];
            for (channel, slot) in median.iter_mut().enumerate() {
                window.clear();
                for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                        window.push(image.get_pixel(nx, ny).0[channel]);
                    }
                }
                window.sort_unstable();
                *slot = window[window.len() / 2];
            }
            output.put_pixel(x, y, Rgb(median));
        }
    }
    Ok(output)
}

/// 宽度超过 `target_width` 时按比例缩小
pub fn resize_to_width(image: RgbImage, target_width: u32, name: &str) -> RgbImage {
    let (width, height) = image.dimensions();
    if width <= target_width {
        return image;
    }

    let new_height = (height as u64 * target_width as u64 / width as u64) as u32;
    if target_width == 0 || new_height == 0 {
        warn!(
            "图片 {}: 目标尺寸无效 ({}, {})，跳过缩放",
            name, target_width, new_height
        );
        return image;
    }

    image::imageops::resize(&image, target_width, new_height, FilterType::CatmullRom)
}

/// 按比例缩放后居中放到固定画布上
pub fn pad_to_canvas(
    image: RgbImage,
    canvas_width: u32,
    canvas_height: u32,
    background: [u8; 3],
    name: &str,
) -> RgbImage {
    if canvas_width == 0 || canvas_height == 0 {
        warn!(
            "图片 {}: 画布尺寸无效 ({}x{})，跳过缩放",
            name, canvas_width, canvas_height
        );
        return image;
    }

    let (width, height) = image.dimensions();
    let scale = f64::min(
        canvas_width as f64 / width as f64,
        canvas_height as f64 / height as f64,
    );
    let content_width = ((width as f64 * scale).round() as u32).clamp(1, canvas_width);
    let content_height = ((height as f64 * scale).round() as u32).clamp(1, canvas_height);

    let resized = if (content_width, content_height) == (width, height) {
        image
    } else {
        image::imageops::resize(&image, content_width, content_height, FilterType::CatmullRom)
    };

    let mut canvas = RgbImage::from_pixel(canvas_width, canvas_height, Rgb(background));
    let offset_x = (canvas_width - content_width) / 2;
    let offset_y = (canvas_height - content_height) / 2;
    image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(color))
    }

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_invalid_bytes() {
        let normalizer = ImageNormalizer::with_settings(
            EnhanceSettings::default(),
            ResizeMode::MaxWidth(1600),
        );
        let err = normalizer.normalize(b"not an image", "bad.png").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage { .. }));
    }

    #[test]
    fn test_shrinks_wide_image_keeping_ratio() {
        let normalizer = ImageNormalizer::with_settings(
            EnhanceSettings::default(),
            ResizeMode::MaxWidth(100),
        );
        let bytes = png_bytes(&solid(400, 200, [120, 120, 120]));
        let canonical = normalizer.normalize(&bytes, "wide.png").unwrap();
        assert_eq!((canonical.width(), canonical.height()), (100, 50));
    }

    #[test]
    fn test_narrow_image_is_not_enlarged() {
        let image = solid(80, 60, [0, 0, 0]);
        let resized = resize_to_width(image, 1600, "narrow.png");
        assert_eq!(resized.dimensions(), (80, 60));
    }

    #[test]
    fn test_zero_target_width_is_unchanged() {
        let image = solid(80, 60, [0, 0, 0]);
        let resized = resize_to_width(image, 0, "zero.png");
        assert_eq!(resized.dimensions(), (80, 60));
    }

    #[test]
    fn test_canvas_centers_on_background() {
        let image = solid(200, 100, [0, 0, 0]);
        let canvas = pad_to_canvas(image, 100, 100, [255, 255, 255], "c.png");
        assert_eq!(canvas.dimensions(), (100, 100));
        // 上方为填充区域，中间为内容
        assert_eq!(canvas.get_pixel(50, 5).0, [255, 255, 255]);
        assert_eq!(canvas.get_pixel(50, 50).0, [0, 0, 0]);
    }

    #[test]
    fn test_degenerate_canvas_is_unchanged() {
        let image = solid(30, 20, [1, 2, 3]);
        let out = pad_to_canvas(image, 0, 100, [255, 255, 255], "d.png");
        assert_eq!(out.dimensions(), (30, 20));
    }

    #[test]
    fn test_contrast_saturates() {
        let image = solid(2, 2, [100, 200, 250]);
        let out = adjust_contrast(&image, 1.3, 0.0).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [130, 255, 255]);
        assert!(adjust_contrast(&image, f32::NAN, 0.0).is_err());
    }

    #[test]
    fn test_failed_step_keeps_previous_buffer() {
        let image = solid(4, 4, [10, 10, 10]);
        let out = apply_step("x.png", "测试", image.clone(), |_| Err("boom".to_string()));
        assert_eq!(out, image);

        let out = apply_step("x.png", "测试", image.clone(), |_| panic!("boom"));
        assert_eq!(out, image);
    }

    #[test]
    fn test_median_removes_salt_noise() {
        let mut image = solid(5, 5, [50, 50, 50]);
        image.put_pixel(2, 2, Rgb([255, 255, 255]));
        let out = median_denoise(&image).unwrap();
        assert_eq!(out.get_pixel(2, 2).0, [50, 50, 50]);
    }

    #[test]
    fn test_tiny_image_survives_enhancement() {
        let normalizer = ImageNormalizer::with_settings(
            EnhanceSettings::default(),
            ResizeMode::MaxWidth(1600),
        );
        let bytes = png_bytes(&solid(1, 1, [10, 20, 30]));
        let canonical = normalizer.normalize(&bytes, "dot.png").unwrap();
        assert_eq!((canonical.width(), canonical.height()), (1, 1));
    }

    #[test]
    fn test_normalized_image_is_pre_encoded() {
        let normalizer = ImageNormalizer::with_settings(
            EnhanceSettings::default(),
            ResizeMode::MaxWidth(1600),
        );
        let bytes = png_bytes(&solid(12, 9, [90, 90, 90]));
        let canonical = normalizer.normalize(&bytes, "page.png").unwrap();
        assert!(canonical.data_url().starts_with("data:image/png;base64,"));
        assert!(canonical.encoded_len() > 0);

        let payload = &canonical.data_url()["data:image/png;base64,".len()..];
        let decoded = STANDARD.decode(payload).unwrap();
        assert_eq!(decoded.len(), canonical.encoded_len());
        let reloaded = image::load_from_memory(&decoded).unwrap().to_rgb8();
        assert_eq!(&reloaded, canonical.pixels());
    }

    #[test]
    fn test_preprocessed_file_name() {
        assert_eq!(
            preprocessed_file_name(&ImageRef::local("/scans/page1.png")),
            "page1_preprocessed.png"
        );
        assert_eq!(
            preprocessed_file_name(&ImageRef::local("scan")),
            "scan_preprocessed.jpg"
        );
    }

    #[test]
    fn test_remote_duplicates_get_distinct_names() {
        let first = preprocessed_file_name(&ImageRef::remote("page.png", "id1"));
        let second = preprocessed_file_name(&ImageRef::remote("page.png", "id2"));
        assert_eq!(first, "page_id1_preprocessed.png");
        assert_ne!(first, second);
    }
}
