/// Multi-scale, multi-monitor template matching.
///
/// The reference patch is resampled once per scale factor and searched
/// over every monitor capture with zero-mean normalized cross-correlation
/// (TM_CCOEFF_NORMED). Every (monitor, scale) pair is independent, so pairs
/// run in parallel on the rayon pool; the winner is chosen afterwards in
/// scale-list order, then monitor order, so completion order never matters.
///
/// Large searches go coarse-to-fine. The coarse pass scores every position
/// with a block-aligned copy of the patch, so an exact occurrence keeps its
/// full coarse score and stays ahead of near-identical tiles.
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};
use rayon::prelude::*;

use crate::perception::types::{MatchResult, MonitorCapture};

pub const DEFAULT_SCALES: [f32; 5] = [0.85, 0.9, 1.0, 1.1, 1.2];
pub const DEFAULT_THRESHOLD: f32 = 0.87;
pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 5.0;
/// Multiply-adds allowed for one exhaustive (monitor, scale) search before
/// falling back to coarse-to-fine.
pub const DEFAULT_MAX_SEARCH_OPS: u64 = 50_000_000;

/// Smallest patch side allowed at the coarse pyramid level.
const MIN_COARSE_SIDE: usize = 6;
/// Coarse peaks further than this below the best coarse score are dropped.
const COARSE_MARGIN: f32 = 0.15;
/// Peaks refined even when the budget would allow fewer.
const MIN_REFINED_PEAKS: usize = 8;
/// Half-width of the full-resolution window searched around each peak.
const REFINE_RADIUS: usize = 2;
/// Variance (per pixel) below which a window counts as flat.
const FLAT_VARIANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub scales: Vec<f32>,
    pub threshold: f32,
    pub max_search_ops: u64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            scales: DEFAULT_SCALES.to_vec(),
            threshold: DEFAULT_THRESHOLD,
            max_search_ops: DEFAULT_MAX_SEARCH_OPS,
        }
    }
}

/// Clamps a requested scale into the supported range. Non-positive and
/// non-finite factors are dropped.
pub fn clamp_scale(s: f32) -> Option<f32> {
    if !s.is_finite() || s <= 0.0 {
        return None;
    }
    Some(s.clamp(MIN_SCALE, MAX_SCALE))
}

/// Finds the reference `patch` on the live `captures`.
///
/// `offset` is the action point relative to the patch's top-left corner at
/// capture resolution; it is scaled with the winning patch size. Never
/// fails: anything that prevents a match yields `found = false`.
pub fn locate(
    patch: &RgbaImage,
    offset: (i32, i32),
    captures: &[MonitorCapture],
    options: &MatchOptions,
) -> MatchResult {
    if patch.width() == 0 || patch.height() == 0 || captures.is_empty() {
        return MatchResult::not_found();
    }
    let scales: Vec<f32> = options.scales.iter().filter_map(|s| clamp_scale(*s)).collect();
    if scales.is_empty() {
        return MatchResult::not_found();
    }

    let reference = imageops::grayscale(patch);
    let scaled: Vec<ScaledPatch> = scales
        .par_iter()
        .map(|s| ScaledPatch::new(&reference, *s))
        .collect();

    let screens: Vec<SearchPlane> = captures
        .par_iter()
        .map(|c| SearchPlane::new(Plane::from_rgba(&c.image)))
        .collect();

    // (scale index, monitor index) in tie-break order.
    let pairs: Vec<(usize, usize)> = (0..scaled.len())
        .flat_map(|si| (0..screens.len()).map(move |mi| (si, mi)))
        .collect();

    let results: Vec<Option<Candidate>> = pairs
        .par_iter()
        .map(|&(si, mi)| search_pair(&screens[mi], &scaled[si], options.max_search_ops))
        .collect();

    let mut best: Option<(usize, usize, Candidate)> = None;
    for (&(si, mi), found) in pairs.iter().zip(results) {
        let Some(cand) = found else { continue };
        tracing::trace!(scale = scaled[si].scale, monitor = captures[mi].monitor.id, score = cand.score, "pair searched");
        let replace = best.as_ref().map_or(true, |(_, _, b)| cand.score > b.score);
        if replace {
            best = Some((si, mi, cand));
        }
    }

    let Some((si, mi, cand)) = best else {
        tracing::debug!("no (monitor, scale) pair could be searched");
        return MatchResult::not_found();
    };

    let scale = scaled[si].scale;
    let monitor = &captures[mi].monitor;
    if cand.score < options.threshold {
        tracing::debug!(score = cand.score, threshold = options.threshold, scale, "best candidate below threshold");
        return MatchResult {
            found: false,
            score: cand.score,
            scale,
            ..MatchResult::not_found()
        };
    }

    let local_x = cand.x as i64 + (offset.0 as f32 * scale).round() as i64;
    let local_y = cand.y as i64 + (offset.1 as f32 * scale).round() as i64;
    let global_point = monitor.local_to_global(local_x, local_y);
    tracing::debug!(
        score = cand.score,
        scale,
        monitor = monitor.id,
        x = global_point.x,
        y = global_point.y,
        "anchor matched"
    );

    MatchResult {
        found: true,
        global_point,
        score: cand.score,
        scale,
        monitor_id: Some(monitor.id),
    }
}

// ── Pixel planes ─────────────────────────────────────────────────────────────

/// Row-major luminance samples.
#[derive(Debug, Clone)]
struct Plane {
    width: usize,
    height: usize,
    px: Vec<f32>,
}

impl Plane {
    fn from_gray(img: &GrayImage) -> Self {
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            px: img.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    fn from_rgba(img: &RgbaImage) -> Self {
        Self::from_gray(&imageops::grayscale(img))
    }

    fn crop(&self, x: usize, y: usize, w: usize, h: usize) -> Plane {
        let mut px = Vec::with_capacity(w * h);
        for row in y..y + h {
            let start = row * self.width + x;
            px.extend_from_slice(&self.px[start..start + w]);
        }
        Plane { width: w, height: h, px }
    }

    /// Box-average `factor`×`factor` blocks; trailing partial blocks are dropped.
    fn downsample(&self, factor: usize) -> Plane {
        let width = self.width / factor;
        let height = self.height / factor;
        let area = (factor * factor) as f32;
        let mut px = vec![0.0f32; width * height];
        px.par_chunks_mut(width.max(1)).enumerate().for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for dy in 0..factor {
                    let start = (y * factor + dy) * self.width + x * factor;
                    acc += self.px[start..start + factor].iter().sum::<f32>();
                }
                *out = acc / area;
            }
        });
        Plane { width, height, px }
    }
}

/// Summed-area tables for window sums and sums of squares.
#[derive(Debug)]
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(p: &Plane) -> Self {
        let stride = p.width + 1;
        let mut sum = vec![0.0f64; stride * (p.height + 1)];
        let mut sq = vec![0.0f64; stride * (p.height + 1)];
        for y in 0..p.height {
            let mut row_sum = 0.0f64;
            let mut row_sq = 0.0f64;
            for x in 0..p.width {
                let v = p.px[y * p.width + x] as f64;
                row_sum += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row_sum;
                sq[i] = sq[i - stride] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.stride;
        let (a, b, c, d) = (y * s + x, y * s + x + w, (y + h) * s + x, (y + h) * s + x + w);
        (
            self.sum[d] - self.sum[b] - self.sum[c] + self.sum[a],
            self.sq[d] - self.sq[b] - self.sq[c] + self.sq[a],
        )
    }
}

/// A capture prepared for searching.
#[derive(Debug)]
struct SearchPlane {
    plane: Plane,
    integral: Integral,
}

impl SearchPlane {
    fn new(plane: Plane) -> Self {
        let integral = Integral::new(&plane);
        Self { plane, integral }
    }
}

/// Zero-mean template. `None` when the patch has no variance.
#[derive(Debug)]
struct Template {
    width: usize,
    height: usize,
    values: Vec<f32>,
    norm: f64,
}

impl Template {
    fn new(p: &Plane) -> Option<Self> {
        let n = p.px.len() as f64;
        if n == 0.0 {
            return None;
        }
        let mean = p.px.iter().map(|&v| v as f64).sum::<f64>() / n;
        let values: Vec<f32> = p.px.iter().map(|&v| (v as f64 - mean) as f32).collect();
        let energy: f64 = values.iter().map(|&v| v as f64 * v as f64).sum();
        if energy <= FLAT_VARIANCE * n {
            return None;
        }
        Some(Self {
            width: p.width,
            height: p.height,
            values,
            norm: energy.sqrt(),
        })
    }
}

/// The reference patch resampled to one scale factor.
#[derive(Debug)]
struct ScaledPatch {
    scale: f32,
    plane: Plane,
    template: Option<Template>,
}

impl ScaledPatch {
    fn new(reference: &GrayImage, scale: f32) -> Self {
        let resized = resample(reference, scale);
        let plane = Plane::from_gray(&resized);
        let template = Template::new(&plane);
        Self { scale, plane, template }
    }
}

/// Deterministic resize: triangle filter when shrinking, Catmull-Rom when
/// enlarging.
fn resample(img: &GrayImage, scale: f32) -> GrayImage {
    if (scale - 1.0).abs() < 1e-6 {
        return img.clone();
    }
    let w = ((img.width() as f32 * scale).round() as u32).max(1);
    let h = ((img.height() as f32 * scale).round() as u32).max(1);
    let filter = if scale < 1.0 { FilterType::Triangle } else { FilterType::CatmullRom };
    imageops::resize(img, w, h, filter)
}

// ── Search ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    x: usize,
    y: usize,
    score: f32,
}

/// Higher score wins; equal scores go to the top-most, then left-most spot.
fn better(a: Candidate, b: Candidate) -> Candidate {
    if a.score > b.score {
        a
    } else if b.score > a.score {
        b
    } else if (a.y, a.x) <= (b.y, b.x) {
        a
    } else {
        b
    }
}

fn score_at(screen: &SearchPlane, t: &Template, x: usize, y: usize) -> f32 {
    let n = (t.width * t.height) as f64;
    let (sum, sq) = screen.integral.window(x, y, t.width, t.height);
    let variance = sq - sum * sum / n;
    if variance <= FLAT_VARIANCE * n {
        return 0.0;
    }
    let img = &screen.plane;
    let mut cross = 0.0f64;
    for ty in 0..t.height {
        let start = (y + ty) * img.width + x;
        let row = &img.px[start..start + t.width];
        let trow = &t.values[ty * t.width..(ty + 1) * t.width];
        cross += row
            .iter()
            .zip(trow)
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum::<f64>();
    }
    ((cross / (t.norm * variance.sqrt())) as f32).clamp(-1.0, 1.0)
}

/// Exhaustive search of top-left positions in `[x0, x1] × [y0, y1]`.
fn search_region(
    screen: &SearchPlane,
    t: &Template,
    (x0, x1): (usize, usize),
    (y0, y1): (usize, usize),
) -> Option<Candidate> {
    (y0..=y1)
        .into_par_iter()
        .filter_map(|y| {
            (x0..=x1)
                .map(|x| Candidate { x, y, score: score_at(screen, t, x, y) })
                .reduce(better)
        })
        .reduce_with(better)
}

fn search_cost(screen_w: usize, screen_h: usize, w: usize, h: usize) -> u64 {
    ((screen_w - w + 1) as u64) * ((screen_h - h + 1) as u64) * (w as u64) * (h as u64)
}

/// Best location of one scaled patch on one capture. `None` when the pair
/// cannot be searched (patch larger than the capture, or flat patch).
///
/// Above `budget` the pair is searched coarse-to-fine: every position gets
/// a coarse score, the local maxima close to the best one are kept, and
/// those are searched exhaustively at full resolution. The number of peaks
/// refined is bounded by `budget` as well.
fn search_pair(screen: &SearchPlane, patch: &ScaledPatch, budget: u64) -> Option<Candidate> {
    let t = patch.template.as_ref()?;
    let (sw, sh) = (screen.plane.width, screen.plane.height);
    if t.width > sw || t.height > sh {
        return None;
    }
    let (max_x, max_y) = (sw - t.width, sh - t.height);
    let full = ((0, max_x), (0, max_y));

    if search_cost(sw, sh, t.width, t.height) <= budget {
        return search_region(screen, t, full.0, full.1);
    }
    let Some(factor) = pyramid_factor(sw, sh, t.width, t.height, budget) else {
        return search_region(screen, t, full.0, full.1);
    };
    let Some(map) = coarse_map(screen, &patch.plane, factor, max_x, max_y) else {
        return search_region(screen, t, full.0, full.1);
    };

    let side = 2 * REFINE_RADIUS + 1;
    let per_peak = (side * side * t.width * t.height) as u64;
    let limit = usize::try_from(budget / per_peak.max(1))
        .unwrap_or(usize::MAX)
        .max(MIN_REFINED_PEAKS);
    let peaks = coarse_peaks(&map, limit);
    tracing::trace!(factor, peaks = peaks.len(), "coarse-to-fine search");
    peaks
        .into_par_iter()
        .filter_map(|p| {
            let xs = (p.x.saturating_sub(REFINE_RADIUS), (p.x + REFINE_RADIUS).min(max_x));
            let ys = (p.y.saturating_sub(REFINE_RADIUS), (p.y + REFINE_RADIUS).min(max_y));
            search_region(screen, t, xs, ys)
        })
        .reduce_with(better)
}

/// Coarse patch side at `factor`, leaving room for every block phase.
fn coarse_side(len: usize, factor: usize) -> usize {
    (len + 1).saturating_sub(factor) / factor
}

/// Smallest power-of-two reduction that brings the coarse pass under
/// budget while keeping the coarse patch at least `MIN_COARSE_SIDE` wide.
/// When no factor fits the budget the coarsest usable one is returned.
fn pyramid_factor(sw: usize, sh: usize, pw: usize, ph: usize, budget: u64) -> Option<usize> {
    let positions = ((sw - pw + 1) as u64) * ((sh - ph + 1) as u64);
    let mut chosen = None;
    let mut factor = 2;
    loop {
        let (cw, ch) = (coarse_side(pw, factor), coarse_side(ph, factor));
        if cw.min(ch) < MIN_COARSE_SIDE {
            break;
        }
        chosen = Some(factor);
        if positions * (cw * ch) as u64 <= budget {
            break;
        }
        factor *= 2;
    }
    chosen
}

/// Coarse score for every full-resolution top-left position.
#[derive(Debug)]
struct ScoreMap {
    width: usize,
    height: usize,
    scores: Vec<f32>,
}

impl ScoreMap {
    fn at(&self, x: usize, y: usize) -> f32 {
        self.scores[y * self.width + x]
    }

    /// Plateaus keep only their first cell in row-major order.
    fn is_local_max(&self, x: usize, y: usize) -> bool {
        let s = self.at(x, y);
        for ny in y.saturating_sub(1)..=(y + 1).min(self.height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(self.width - 1) {
                if (nx, ny) == (x, y) {
                    continue;
                }
                let n = self.at(nx, ny);
                if n > s || (n == s && (ny, nx) < (y, x)) {
                    return false;
                }
            }
        }
        true
    }
}

/// Scores every position of the capture at `factor` times less resolution.
///
/// The patch is downsampled once per block phase. A position is scored with
/// the phase whose blocks line up with the capture's coarse grid there, so
/// an exact occurrence of the patch scores as high as it would unscaled,
/// wherever it sits relative to that grid. `None` when every phase is flat.
fn coarse_map(
    screen: &SearchPlane,
    patch: &Plane,
    factor: usize,
    max_x: usize,
    max_y: usize,
) -> Option<ScoreMap> {
    let coarse = SearchPlane::new(screen.plane.downsample(factor));
    let (cw, ch) = (coarse_side(patch.width, factor), coarse_side(patch.height, factor));
    let phases: Vec<Option<Template>> = (0..factor * factor)
        .into_par_iter()
        .map(|i| {
            let (px, py) = (i % factor, i / factor);
            Template::new(&patch.crop(px, py, cw * factor, ch * factor).downsample(factor))
        })
        .collect();
    if phases.iter().all(Option::is_none) {
        return None;
    }

    let width = max_x + 1;
    let height = max_y + 1;
    let mut scores = vec![0.0f32; width * height];
    scores.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        let py = (factor - y % factor) % factor;
        let v = (y + py) / factor;
        for (x, out) in row.iter_mut().enumerate() {
            let px = (factor - x % factor) % factor;
            if let Some(t) = &phases[py * factor + px] {
                *out = score_at(&coarse, t, (x + px) / factor, v);
            }
        }
    });
    Some(ScoreMap { width, height, scores })
}

/// Local maxima within `COARSE_MARGIN` of the best coarse score, best
/// first, at most `limit` of them.
fn coarse_peaks(map: &ScoreMap, limit: usize) -> Vec<Candidate> {
    let best = map.scores.iter().copied().fold(f32::MIN, f32::max);
    let floor = best - COARSE_MARGIN;
    let mut peaks: Vec<Candidate> = (0..map.height)
        .into_par_iter()
        .flat_map_iter(|y| {
            (0..map.width).filter_map(move |x| {
                let score = map.at(x, y);
                (score >= floor && map.is_local_max(x, y)).then_some(Candidate { x, y, score })
            })
        })
        .collect();
    peaks.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| (a.y, a.x).cmp(&(b.y, b.x)))
    });
    peaks.truncate(limit);
    peaks
}
