//! Leaf segmentation
//!
//! Crops a photo to the dominant foreground region before classification:
//! Otsu threshold on a blurred grayscale copy, largest 4-connected region,
//! bounding box. Polarity is chosen so the region touching the image border
//! most is treated as background, which handles both dark leaves on light
//! paper and light leaves on dark surfaces.

use image::{imageops::FilterType, DynamicImage, GrayImage};
use std::collections::VecDeque;

/// Longest side of the working copy used for thresholding
const WORK_SIZE: u32 = 256;

/// Regions smaller than this fraction of the frame are ignored
const MIN_AREA_FRACTION: f32 = 0.01;

/// Crops covering more than this fraction of the frame are not worth applying
const MAX_CROP_FRACTION: f32 = 0.95;

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Crop `image` to the leaf, or `None` when no usable region is found.
pub fn crop_to_leaf(image: &DynamicImage) -> Option<DynamicImage> {
    let (width, height) = (image.width(), image.height());
    if width < 8 || height < 8 {
        return None;
    }

    let scale = (WORK_SIZE as f32 / width.max(height) as f32).min(1.0);
    let work_w = ((width as f32 * scale).round() as u32).max(1);
    let work_h = ((height as f32 * scale).round() as u32).max(1);
    let gray = image
        .resize_exact(work_w, work_h, FilterType::Triangle)
        .to_luma8();
    let gray = image::imageops::blur(&gray, 1.0);

    let region = leaf_region(&gray)?;
    let covered = (region.width * region.height) as f32 / (work_w * work_h) as f32;
    if covered > MAX_CROP_FRACTION {
        return None;
    }

    // Map the working-copy box back to source pixels
    let x = ((region.x as f32 / scale).floor() as u32).min(width - 1);
    let y = ((region.y as f32 / scale).floor() as u32).min(height - 1);
    let w = ((region.width as f32 / scale).ceil() as u32).clamp(1, width - x);
    let h = ((region.height as f32 / scale).ceil() as u32).clamp(1, height - y);

    tracing::debug!(x, y, w, h, "Cropped image to leaf region");
    Some(image.crop_imm(x, y, w, h))
}

/// Bounding box of the largest foreground region of a grayscale image
pub fn leaf_region(gray: &GrayImage) -> Option<Region> {
    let (width, height) = gray.dimensions();
    let mut histogram = [0u32; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    let threshold = otsu_threshold(&histogram);

    let mut mask: Vec<bool> = gray.pixels().map(|p| p[0] > threshold).collect();
    if border_foreground_ratio(&mask, width, height) > 0.5 {
        mask.iter_mut().for_each(|m| *m = !*m);
    }

    let (area, region) = largest_component(&mask, width, height)?;
    let min_area = ((width * height) as f32 * MIN_AREA_FRACTION) as usize;
    if area < min_area.max(1) {
        return None;
    }
    Some(region)
}

/// Otsu's method: the threshold maximizing between-class variance
pub fn otsu_threshold(histogram: &[u32; 256]) -> u8 {
    let total: u64 = histogram.iter().map(|&c| c as u64).sum();
    if total == 0 {
        return 0;
    }
    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut background_weight = 0u64;
    let mut background_sum = 0.0f64;
    let mut best = 0u8;
    let mut best_variance = 0.0f64;

    for (t, &count) in histogram.iter().enumerate() {
        background_weight += count as u64;
        if background_weight == 0 {
            continue;
        }
        let foreground_weight = total - background_weight;
        if foreground_weight == 0 {
            break;
        }

        background_sum += t as f64 * count as f64;
        let background_mean = background_sum / background_weight as f64;
        let foreground_mean = (weighted_total - background_sum) / foreground_weight as f64;
        let variance = background_weight as f64
            * foreground_weight as f64
            * (background_mean - foreground_mean).powi(2);

        if variance > best_variance {
            best_variance = variance;
            best = t as u8;
        }
    }

    best
}

fn border_foreground_ratio(mask: &[bool], width: u32, height: u32) -> f32 {
    let (w, h) = (width as usize, height as usize);
    let mut on = 0usize;
    let mut total = 0usize;
    for x in 0..w {
        for y in [0, h - 1] {
            total += 1;
            on += mask[y * w + x] as usize;
        }
    }
    for y in 1..h.saturating_sub(1) {
        for x in [0, w - 1] {
            total += 1;
            on += mask[y * w + x] as usize;
        }
    }
    on as f32 / total.max(1) as f32
}

fn largest_component(mask: &[bool], width: u32, height: u32) -> Option<(usize, Region)> {
    let (w, h) = (width as usize, height as usize);
    let mut visited = vec![false; mask.len()];
    let mut queue = VecDeque::new();
    let mut best: Option<(usize, Region)> = None;

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }

        visited[start] = true;
        queue.push_back(start);
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (w, h, 0, 0);
        let mut area = 0usize;

        while let Some(idx) = queue.pop_front() {
            let (x, y) = (idx % w, idx / w);
            area += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            let mut visit = |n: usize| {
                if mask[n] && !visited[n] {
                    visited[n] = true;
                    queue.push_back(n);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < w {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - w);
            }
            if y + 1 < h {
                visit(idx + w);
            }
        }

        if best.map_or(true, |(best_area, _)| area > best_area) {
            best = Some((
                area,
                Region {
                    x: min_x as u32,
                    y: min_y as u32,
                    width: (max_x - min_x + 1) as u32,
                    height: (max_y - min_y + 1) as u32,
                },
            ));
        }
    }

    best
}
