//! Locating a template image on the live screen
//!
//! Matching is zero-mean normalized cross-correlation on grayscale pixels,
//! scored 0..1. Large templates are matched coarse-to-fine: a downscaled pass
//! shortlists candidate positions, which are then re-scored at full
//! resolution in a small neighbourhood.

use crate::backend::{Backend, Point};
use crate::error::Result;
use image::imageops::{self, FilterType};
use image::GrayImage;
use std::path::Path;

/// Minimum score for a hit.
pub const DEFAULT_CONFIDENCE: f32 = 0.8;

/// Smallest template side kept by the coarse pass.
const MIN_COARSE_SIDE: u32 = 8;
const MAX_SCALE: u32 = 4;
/// Coarse positions refined at full resolution.
const COARSE_CANDIDATES: usize = 16;

/// A template hit, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub score: f32,
}

impl Match {
    pub fn center(&self) -> Point {
        Point::new(
            (self.x + self.width / 2) as i32,
            (self.y + self.height / 2) as i32,
        )
    }
}

/// Finds a template on the current screen.
pub trait TemplateMatcher: Send + Sync {
    /// Center of the best match scoring at least `confidence`, or `None`.
    fn locate(&self, backend: &dyn Backend, template: &Path, confidence: f32)
        -> Result<Option<Point>>;
}

/// Captures the full screen through the backend and matches in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScreenMatcher;

impl TemplateMatcher for ScreenMatcher {
    fn locate(
        &self,
        backend: &dyn Backend,
        template: &Path,
        confidence: f32,
    ) -> Result<Option<Point>> {
        let needle = image::open(template)?.to_luma8();
        let screen = imageops::grayscale(&backend.capture(None)?);
        let hit = match_template(&screen, &needle, confidence);
        if let Some(m) = &hit {
            tracing::debug!(x = m.x, y = m.y, score = m.score, "template matched");
        }
        Ok(hit.map(|m| m.center()))
    }
}

/// Best position of `needle` in `haystack` scoring at least `confidence`.
pub fn match_template(haystack: &GrayImage, needle: &GrayImage, confidence: f32) -> Option<Match> {
    let (hw, hh) = haystack.dimensions();
    let (nw, nh) = needle.dimensions();
    if nw == 0 || nh == 0 || nw > hw || nh > hh {
        return None;
    }

    let full = Integral::new(haystack);
    let template = Prepared::new(needle);
    let scale = (nw.min(nh) / MIN_COARSE_SIDE).clamp(1, MAX_SCALE);

    let best = if scale == 1 {
        best_of(haystack, &full, &template, (0..=hw - nw).flat_map(|x| (0..=hh - nh).map(move |y| (x, y))))
    } else {
        let small_hay = imageops::resize(haystack, hw / scale, hh / scale, FilterType::Triangle);
        let small_needle = imageops::resize(
            needle,
            (nw / scale).max(1),
            (nh / scale).max(1),
            FilterType::Triangle,
        );
        let small = Integral::new(&small_hay);
        let small_template = Prepared::new(&small_needle);
        let (sw, sh) = small_hay.dimensions();
        let (tw, th) = small_needle.dimensions();
        if tw > sw || th > sh {
            return None;
        }

        let mut coarse: Vec<(f32, u32, u32)> = (0..=sw - tw)
            .flat_map(|x| (0..=sh - th).map(move |y| (x, y)))
            .map(|(x, y)| (score_at(&small_hay, &small, &small_template, x, y), x, y))
            .collect();
        coarse.sort_by(|a, b| b.0.total_cmp(&a.0));
        coarse.truncate(COARSE_CANDIDATES);

        let positions = coarse.into_iter().flat_map(|(_, cx, cy)| {
            let x0 = (cx * scale).saturating_sub(scale);
            let y0 = (cy * scale).saturating_sub(scale);
            let x1 = (cx * scale + scale).min(hw - nw);
            let y1 = (cy * scale + scale).min(hh - nh);
            (x0..=x1).flat_map(move |x| (y0..=y1).map(move |y| (x, y)))
        });
        best_of(haystack, &full, &template, positions)
    };

    best.filter(|m| m.score >= confidence)
}

fn best_of(
    haystack: &GrayImage,
    integral: &Integral,
    template: &Prepared,
    positions: impl Iterator<Item = (u32, u32)>,
) -> Option<Match> {
    positions
        .map(|(x, y)| Match {
            x,
            y,
            width: template.width as u32,
            height: template.height as u32,
            score: score_at(haystack, integral, template, x, y),
        })
        .max_by(|a, b| a.score.total_cmp(&b.score))
}

/// Summed-area tables of pixel values and squared values.
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sq = vec![0.0; stride * (h + 1)];
        let px = image.as_raw();
        for y in 0..h {
            let (mut row, mut row_sq) = (0.0, 0.0);
            for x in 0..w {
                let v = px[y * w + x] as f64;
                row += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    /// (sum, sum of squares) over the window.
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.stride;
        let (a, b) = (y * s + x, y * s + x + w);
        let (c, d) = ((y + h) * s + x, (y + h) * s + x + w);
        (
            self.sum[d] - self.sum[b] - self.sum[c] + self.sum[a],
            self.sq[d] - self.sq[b] - self.sq[c] + self.sq[a],
        )
    }
}

/// Template with its mean removed.
struct Prepared {
    width: usize,
    height: usize,
    mean: f64,
    norm: f64,
    centered: Vec<f64>,
}

impl Prepared {
    fn new(image: &GrayImage) -> Self {
        let px = image.as_raw();
        let n = px.len().max(1) as f64;
        let mean = px.iter().map(|&v| v as f64).sum::<f64>() / n;
        let centered: Vec<f64> = px.iter().map(|&v| v as f64 - mean).collect();
        let norm = centered.iter().map(|v| v * v).sum::<f64>().sqrt();
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            mean,
            norm,
            centered,
        }
    }
}

const FLAT: f64 = 1e-6;

fn score_at(haystack: &GrayImage, integral: &Integral, template: &Prepared, x: u32, y: u32) -> f32 {
    let (x, y) = (x as usize, y as usize);
    let (tw, th) = (template.width, template.height);
    let n = (tw * th) as f64;
    let (sum, sq) = integral.window(x, y, tw, th);
    let variance = (sq - sum * sum / n).max(0.0);

    // Flat regions have no correlation to speak of; compare brightness.
    if template.norm < FLAT || variance < FLAT {
        if template.norm < FLAT && variance < FLAT {
            return (1.0 - (sum / n - template.mean).abs() / 255.0) as f32;
        }
        return 0.0;
    }

    let w = haystack.width() as usize;
    let px = haystack.as_raw();
    let mut numerator = 0.0;
    for j in 0..th {
        let row = &px[(y + j) * w + x..(y + j) * w + x + tw];
        let t = &template.centered[j * tw..(j + 1) * tw];
        numerator += row.iter().zip(t).map(|(&p, &c)| p as f64 * c).sum::<f64>();
    }
    (numerator / (template.norm * variance.sqrt())).clamp(-1.0, 1.0) as f32
}
