//! DCT perceptual hashing.
//!
//! The image is converted to Rec.601 luma (0.299 R + 0.587 G + 0.114 B)
//! and resized to a square of
//! `hash_size * 4` pixels. A 2D DCT-II is applied and the top-left
//! `hash_size x hash_size` block of low frequencies is compared against its
//! median: each coefficient above the median sets a bit, row-major.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use rayon::prelude::*;
use rustdct::{Dct2, DctPlanner, TransformType2And3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::frames::{Frame, HashedFrame};
use crate::hash::PerceptualHash;

/// Default hash side length (8x8 = 64 bits).
pub const DEFAULT_HASH_SIZE: u32 = 8;
pub const MIN_HASH_SIZE: u32 = 4;
pub const MAX_HASH_SIZE: u32 = 32;

/// Oversampling factor between the resized image and the kept DCT block.
const HIGHFREQ_FACTOR: u32 = 4;

/// Hasher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasherConfig {
    /// Side length of the low-frequency block; the hash has `hash_size²` bits
    pub hash_size: u32,
    /// Worker threads for batch hashing
    pub workers: usize,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            hash_size: DEFAULT_HASH_SIZE,
            workers: num_cpus::get(),
        }
    }
}

impl HasherConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            hash_size: std::env::var("HASH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_HASH_SIZE),
            workers: std::env::var("HASH_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or_else(num_cpus::get),
        }
    }
}

/// Computes perceptual hashes for frame images.
#[derive(Clone)]
pub struct PerceptualHasher {
    hash_size: u32,
    workers: usize,
    dct: Arc<dyn TransformType2And3<f32>>,
}

impl fmt::Debug for PerceptualHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerceptualHasher")
            .field("hash_size", &self.hash_size)
            .field("workers", &self.workers)
            .finish()
    }
}

impl PerceptualHasher {
    pub fn new(config: &HasherConfig) -> AnalysisResult<Self> {
        if !(MIN_HASH_SIZE..=MAX_HASH_SIZE).contains(&config.hash_size) {
            return Err(AnalysisError::InvalidHashSize(config.hash_size));
        }
        let side = (config.hash_size * HIGHFREQ_FACTOR) as usize;
        let dct = DctPlanner::<f32>::new().plan_dct2(side);
        Ok(Self {
            hash_size: config.hash_size,
            workers: config.workers.max(1),
            dct,
        })
    }

    /// Number of bits in every hash this hasher produces.
    pub fn bit_len(&self) -> usize {
        (self.hash_size * self.hash_size) as usize
    }

    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }

    /// Hash a decoded image.
    pub fn hash_image(&self, image: &DynamicImage) -> PerceptualHash {
        let side = (self.hash_size * HIGHFREQ_FACTOR) as usize;
        let gray = luma_601(image);
        let small = imageops::resize(&gray, side as u32, side as u32, FilterType::Lanczos3);

        let mut pixels: Vec<f32> = small.pixels().map(|p| p.0[0] as f32).collect();
        for row in pixels.chunks_exact_mut(side) {
            self.dct.process_dct2(row);
        }

        let mut transposed = vec![0f32; side * side];
        for r in 0..side {
            for c in 0..side {
                transposed[c * side + r] = pixels[r * side + c];
            }
        }
        for column in transposed.chunks_exact_mut(side) {
            self.dct.process_dct2(column);
        }

        // transposed[c * side + r] now holds coefficient (r, c).
        let n = self.hash_size as usize;
        let block: Vec<f32> = (0..n)
            .flat_map(|r| (0..n).map(move |c| (r, c)))
            .map(|(r, c)| transposed[c * side + r])
            .collect();
        let median = median(&block);

        PerceptualHash::from_bits(block.iter().map(|&v| v > median))
    }

    /// Hash encoded image bytes.
    pub fn hash_bytes(&self, bytes: &[u8]) -> Result<PerceptualHash, image::ImageError> {
        let image = image::load_from_memory(bytes)?;
        Ok(self.hash_image(&image))
    }

    /// Hash an image file.
    pub fn hash_file(&self, path: &Path) -> Result<PerceptualHash, image::ImageError> {
        let image = image::open(path)?;
        Ok(self.hash_image(&image))
    }

    /// Hash every frame on a bounded pool, preserving input order.
    ///
    /// All frames are attempted. If any fail to decode, the batch fails with
    /// the first failure in input order and the total failure count; a
    /// partial set of hashes is never returned.
    pub fn hash_frames(&self, frames: Vec<Frame>) -> AnalysisResult<Vec<HashedFrame>> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.min(frames.len()))
            .thread_name(|i| format!("phash-{}", i))
            .build()?;

        let results: Vec<Result<PerceptualHash, image::ImageError>> = pool.install(|| {
            frames
                .par_iter()
                .map(|frame| self.hash_file(&frame.path))
                .collect()
        });

        let total = results.len();
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            let (frame, err) = frames
                .iter()
                .zip(results.iter())
                .find_map(|(f, r)| r.as_ref().err().map(|e| (f, e)))
                .ok_or_else(|| AnalysisError::ThreadPool("lost decode failure".to_string()))?;
            warn!(
                frame = %frame.name,
                failed,
                total,
                "Frame decode failed: {}",
                err
            );
            return Err(AnalysisError::Decode {
                frame: frame.name.clone(),
                message: err.to_string(),
                failed,
                total,
            });
        }

        debug!(frames = total, workers = self.workers, "Hashed frames");

        Ok(frames
            .into_iter()
            .zip(results)
            .filter_map(|(frame, r)| r.ok().map(|hash| HashedFrame { frame, hash }))
            .collect())
    }
}

/// Grayscale with the Rec.601 weights. `to_luma8` uses the sRGB ones.
fn luma_601(image: &DynamicImage) -> GrayImage {
    if let Some(gray) = image.as_luma8() {
        return gray.clone();
    }
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        Luma([luma as u8])
    })
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.is_empty() {
        0.0
    } else if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use tempfile::TempDir;

    /// Blocky noise image: 8x8 pixel cells filled from a seeded LCG.
    fn noise_image(seed: u32, offset: u8) -> RgbImage {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        let mut cells = [[0u8; 8]; 8];
        for row in cells.iter_mut() {
            for cell in row.iter_mut() {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                *cell = 30 + ((state >> 24) as u8 % 190);
            }
        }
        RgbImage::from_fn(64, 64, |x, y| {
            let v = cells[(y / 8) as usize][(x / 8) as usize].saturating_add(offset);
            image::Rgb([v, v, v])
        })
    }

    fn hasher() -> PerceptualHasher {
        PerceptualHasher::new(&HasherConfig {
            hash_size: 8,
            workers: 2,
        })
        .unwrap()
    }

    #[test]
    fn test_hash_is_deterministic() {
        let img = DynamicImage::ImageRgb8(noise_image(7, 0));
        let h = hasher();
        let a = h.hash_image(&img);
        let b = h.hash_image(&img);
        assert_eq!(a, b);
        assert_eq!(a.bit_len(), 64);
    }

    #[test]
    fn test_similar_images_are_close() {
        let h = hasher();
        let a = h.hash_image(&DynamicImage::ImageRgb8(noise_image(3, 0)));
        let b = h.hash_image(&DynamicImage::ImageRgb8(noise_image(3, 2)));
        assert!(a.distance(&b).unwrap() <= 6);
    }

    #[test]
    fn test_different_images_are_far() {
        let h = hasher();
        let a = h.hash_image(&DynamicImage::ImageRgb8(noise_image(1, 0)));
        let b = h.hash_image(&DynamicImage::ImageRgb8(noise_image(99, 0)));
        assert!(a.distance(&b).unwrap() > 10);
    }

    #[test]
    fn test_larger_hash_size() {
        let h = PerceptualHasher::new(&HasherConfig {
            hash_size: 16,
            workers: 1,
        })
        .unwrap();
        let hash = h.hash_image(&DynamicImage::ImageRgb8(noise_image(5, 0)));
        assert_eq!(hash.bit_len(), 256);
        assert_eq!(h.bit_len(), 256);
    }

    #[test]
    fn test_invalid_hash_size() {
        let config = HasherConfig {
            hash_size: 1,
            workers: 1,
        };
        assert!(matches!(
            PerceptualHasher::new(&config),
            Err(AnalysisError::InvalidHashSize(1))
        ));
    }

    #[test]
    fn test_uniform_image_hashes() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 30, Luma([128])));
        let hash = hasher().hash_image(&img);
        assert_eq!(hash.bit_len(), 64);
    }

    #[test]
    fn test_hash_frames_preserves_order_across_workers() {
        let dir = TempDir::new().unwrap();
        let frames: Vec<Frame> = (0..12)
            .map(|i| {
                let path = dir.path().join(format!("frame_{:04}.png", i));
                noise_image(i, 0).save(&path).unwrap();
                Frame::new(i, path)
            })
            .collect();

        let h = PerceptualHasher::new(&HasherConfig {
            hash_size: 8,
            workers: 4,
        })
        .unwrap();
        let hashed = h.hash_frames(frames.clone()).unwrap();
        assert_eq!(hashed.len(), 12);
        for (hf, frame) in hashed.iter().zip(frames.iter()) {
            assert_eq!(&hf.frame, frame);
            assert_eq!(hf.hash, h.hash_file(&frame.path).unwrap());
        }
    }

    #[test]
    fn test_hash_frames_reports_first_decode_failure() {
        let dir = TempDir::new().unwrap();
        let mut frames = Vec::new();
        for i in 0..5u32 {
            let path = dir.path().join(format!("frame_{:04}.png", i));
            if i == 1 || i == 3 {
                std::fs::write(&path, b"not an image").unwrap();
            } else {
                noise_image(i, 0).save(&path).unwrap();
            }
            frames.push(Frame::new(i, path));
        }

        match hasher().hash_frames(frames) {
            Err(AnalysisError::Decode {
                frame,
                failed,
                total,
                ..
            }) => {
                assert_eq!(frame, "frame_0001.png");
                assert_eq!(failed, 2);
                assert_eq!(total, 5);
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_luma_uses_601_weights() {
        let mut rgb = RgbImage::new(4, 1);
        rgb.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, image::Rgb([0, 255, 0]));
        rgb.put_pixel(2, 0, image::Rgb([0, 0, 255]));
        rgb.put_pixel(3, 0, image::Rgb([255, 255, 255]));
        let gray = luma_601(&DynamicImage::ImageRgb8(rgb));
        let values: Vec<u8> = gray.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![76, 150, 29, 255]);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }
}
