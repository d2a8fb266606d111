use std::collections::HashMap;

use rand::rngs::ThreadRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::text::{display_label, TextMetrics};
use crate::text::TermRecord;

/// Smallest font size handed out, in pixels.
pub const MIN_FONT_SIZE: f32 = 16.0;
/// Largest font size handed out, in pixels.
pub const MAX_FONT_SIZE: f32 = 60.0;
/// Minimum gap kept between two placed terms, in pixels.
pub const DEFAULT_PADDING: f32 = 8.0;
/// Probability that a term is set vertically.
pub const VERTICAL_PROBABILITY: f64 = 0.3;

/// Fixed-size drawing area. Coordinates are relative to its centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: f32,
    pub height: f32,
}

impl Canvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True if `b` lies entirely inside the canvas.
    pub fn contains(&self, b: &TermBox) -> bool {
        let half_w = self.width * 0.5;
        let half_h = self.height * 0.5;
        b.x >= -half_w && b.right() <= half_w && b.y >= -half_h && b.bottom() <= half_h
    }

    fn half_diagonal(&self) -> f32 {
        (self.width * self.width + self.height * self.height).sqrt() * 0.5
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(700.0, 400.0)
    }
}

/// Orientation of a placed term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum Rotation {
    /// 0°
    Horizontal,
    /// 90°
    Vertical,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Horizontal => 0,
            Rotation::Vertical => 90,
        }
    }
}

impl From<Rotation> for u16 {
    fn from(r: Rotation) -> Self {
        r.degrees()
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Horizontal),
            90 => Ok(Rotation::Vertical),
            other => Err(format!("unsupported rotation: {other}")),
        }
    }
}

/// Supplies the orientation of each term as it is placed.
pub trait RotationSource {
    fn next_rotation(&mut self) -> Rotation;
}

/// Random orientation: vertical with probability [`VERTICAL_PROBABILITY`].
pub struct RandomRotation<R: Rng> {
    rng: R,
    vertical_probability: f64,
}

impl RandomRotation<ThreadRng> {
    pub fn new() -> Self {
        Self::with_rng(rand::thread_rng())
    }
}

impl Default for RandomRotation<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> RandomRotation<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            vertical_probability: VERTICAL_PROBABILITY,
        }
    }
}

impl<R: Rng> RotationSource for RandomRotation<R> {
    fn next_rotation(&mut self) -> Rotation {
        if self.rng.gen_bool(self.vertical_probability) {
            Rotation::Vertical
        } else {
            Rotation::Horizontal
        }
    }
}

/// Every term gets the same orientation.
#[derive(Debug, Clone, Copy)]
pub struct FixedRotation(pub Rotation);

impl RotationSource for FixedRotation {
    fn next_rotation(&mut self) -> Rotation {
        self.0
    }
}

/// Cycles through a fixed sequence of orientations.
#[derive(Debug, Clone)]
pub struct SequenceRotation {
    sequence: Vec<Rotation>,
    pos: usize,
}

impl SequenceRotation {
    pub fn new(sequence: Vec<Rotation>) -> Self {
        Self { sequence, pos: 0 }
    }
}

impl RotationSource for SequenceRotation {
    fn next_rotation(&mut self) -> Rotation {
        let Some(&rotation) = self.sequence.get(self.pos % self.sequence.len().max(1)) else {
            return Rotation::Horizontal;
        };
        self.pos += 1;
        rotation
    }
}

/// Position and orientation of a term's centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub rotation: Rotation,
}

/// Poses from the previous layout pass, keyed by term.
pub type PreviousPlacements = HashMap<String, Pose>;

/// Axis-aligned box in canvas coordinates (top-left corner + extent).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl TermBox {
    pub fn centered(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x: cx - width * 0.5,
            y: cy - height * 0.5,
            width,
            height,
        }
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// True if the boxes come closer than `gap` on both axes.
    #[inline]
    pub fn intersects(&self, other: &TermBox, gap: f32) -> bool {
        self.x < other.right() + gap
            && other.x < self.right() + gap
            && self.y < other.bottom() + gap
            && other.y < self.bottom() + gap
    }
}

/// A term with its resting position on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedTerm {
    pub term: String,
    pub frequency: u32,
    pub font_size: f32,
    /// Centre of the label, relative to the canvas centre
    pub x: f32,
    pub y: f32,
    pub rotation: Rotation,
    /// Extent on the canvas after rotation
    pub width: f32,
    pub height: f32,
    /// Pose from the previous pass, used only as an animation start point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_from: Option<Pose>,
}

impl PlacedTerm {
    pub fn bounds(&self) -> TermBox {
        TermBox::centered(self.x, self.y, self.width, self.height)
    }

    pub fn pose(&self) -> Pose {
        Pose {
            x: self.x,
            y: self.y,
            rotation: self.rotation,
        }
    }
}

/// Square-root scale from a frequency domain onto a font-size range.
#[derive(Debug, Clone, Copy)]
pub struct FontScale {
    sqrt_min: f32,
    sqrt_max: f32,
    range: (f32, f32),
}

impl FontScale {
    pub fn new(min_frequency: u32, max_frequency: u32, range: (f32, f32)) -> Self {
        let lo = min_frequency.min(max_frequency) as f32;
        let hi = min_frequency.max(max_frequency) as f32;
        Self {
            sqrt_min: lo.sqrt(),
            sqrt_max: hi.sqrt(),
            range,
        }
    }

    /// Scale over the frequency range of `terms`.
    pub fn for_terms(terms: &[TermRecord], range: (f32, f32)) -> Option<Self> {
        let min = terms.iter().map(|t| t.frequency).min()?;
        let max = terms.iter().map(|t| t.frequency).max()?;
        Some(Self::new(min, max, range))
    }

    /// Font size for `frequency`; the midpoint when the domain is a single value.
    pub fn size(&self, frequency: u32) -> f32 {
        let (r0, r1) = self.range;
        let span = self.sqrt_max - self.sqrt_min;
        if span <= f32::EPSILON {
            return (r0 + r1) * 0.5;
        }
        let t = ((frequency as f32).sqrt() - self.sqrt_min) / span;
        r0 + t.clamp(0.0, 1.0) * (r1 - r0)
    }
}

/// Tunables of the layout pass.
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    pub canvas: Canvas,
    /// Minimum gap between placed boxes
    pub padding: f32,
    pub font_range: (f32, f32),
    /// Distance between consecutive spiral samples (px)
    pub spiral_step: f32,
    /// Hard cap on spiral steps per term
    pub max_spiral_steps: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            canvas: Canvas::default(),
            padding: DEFAULT_PADDING,
            font_range: (MIN_FONT_SIZE, MAX_FONT_SIZE),
            spiral_step: 3.0,
            max_spiral_steps: 100_000,
        }
    }
}

/// Places weighted terms on a canvas without overlap.
///
/// Terms are taken in rank order. Each one walks an Archimedean spiral out
/// from the centre and rests at the first position where its box is inside
/// the canvas and keeps `padding` from every box placed before it. Terms
/// that find no such position are dropped.
pub struct CloudLayoutEngine {
    config: LayoutConfig,
    metrics: TextMetrics,
}

impl CloudLayoutEngine {
    pub fn new(canvas: Canvas) -> Self {
        Self::with_config(
            LayoutConfig {
                canvas,
                ..LayoutConfig::default()
            },
            TextMetrics::default(),
        )
    }

    pub fn with_config(config: LayoutConfig, metrics: TextMetrics) -> Self {
        Self { config, metrics }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Lay out `terms`. `previous` only feeds [`PlacedTerm::transition_from`].
    pub fn layout(
        &self,
        terms: &[TermRecord],
        previous: Option<&PreviousPlacements>,
        rotations: &mut dyn RotationSource,
    ) -> Vec<PlacedTerm> {
        let Some(scale) = FontScale::for_terms(terms, self.config.font_range) else {
            return Vec::new();
        };

        let canvas = self.config.canvas;
        let mut placed: Vec<PlacedTerm> = Vec::with_capacity(terms.len());
        let mut boxes: Vec<TermBox> = Vec::with_capacity(terms.len());

        for record in terms {
            let font_size = scale.size(record.frequency);
            let rotation = rotations.next_rotation();
            let text = self.metrics.measure(&display_label(&record.term), font_size);
            let (width, height) = match rotation {
                Rotation::Horizontal => (text.width, text.height),
                Rotation::Vertical => (text.height, text.width),
            };

            let Some((x, y)) = self.find_position(width, height, &boxes) else {
                log::debug!(
                    "layout: no room for '{}' ({}x{} px) on {}x{} canvas, dropped",
                    record.term,
                    width,
                    height,
                    canvas.width,
                    canvas.height
                );
                continue;
            };

            boxes.push(TermBox::centered(x, y, width, height));
            placed.push(PlacedTerm {
                term: record.term.clone(),
                frequency: record.frequency,
                font_size,
                x,
                y,
                rotation,
                width,
                height,
                transition_from: previous.and_then(|p| p.get(&record.term)).copied(),
            });
        }

        placed
    }

    /// Walk the spiral until a free spot is found or the spiral leaves the canvas.
    fn find_position(&self, width: f32, height: f32, boxes: &[TermBox]) -> Option<(f32, f32)> {
        let canvas = self.config.canvas;
        if width > canvas.width || height > canvas.height {
            return None;
        }

        let aspect = if canvas.height > 0.0 {
            canvas.width / canvas.height
        } else {
            1.0
        };
        // Once the narrower spiral axis passes the half-diagonal every later
        // point lies outside the canvas.
        let limit = canvas.half_diagonal() / aspect.min(1.0);

        let spiral = Spiral::new(aspect, limit, self.config.spiral_step);
        for (dx, dy) in spiral.take(self.config.max_spiral_steps) {
            let candidate = TermBox::centered(dx, dy, width, height);
            if !canvas.contains(&candidate) {
                continue;
            }
            if boxes
                .iter()
                .all(|b| !candidate.intersects(b, self.config.padding))
            {
                return Some((dx, dy));
            }
        }
        None
    }
}

impl Default for CloudLayoutEngine {
    fn default() -> Self {
        Self::new(Canvas::default())
    }
}

/// Largest angle advanced in one spiral step, near the centre.
const MAX_ANGLE_STEP: f32 = 0.1;

/// Point on an Archimedean spiral stretched to the canvas aspect ratio.
#[inline]
fn archimedean(aspect: f32, t: f32) -> (f32, f32) {
    (aspect * t * t.cos(), t * t.sin())
}

/// Spiral samples spaced at most `step` pixels apart, up to parameter `limit`.
///
/// The angle increment shrinks as the radius grows, so the outer turns are
/// sampled as densely as the inner ones.
struct Spiral {
    aspect: f32,
    limit: f32,
    step: f32,
    t: f32,
}

impl Spiral {
    fn new(aspect: f32, limit: f32, step: f32) -> Self {
        Self {
            aspect,
            limit,
            step: step.max(f32::EPSILON),
            t: 0.0,
        }
    }
}

impl Iterator for Spiral {
    type Item = (f32, f32);

    fn next(&mut self) -> Option<(f32, f32)> {
        if self.t > self.limit {
            return None;
        }
        let point = archimedean(self.aspect, self.t);
        // Upper bound on |d(point)/dt| for this parameterisation.
        let speed = (1.0 + self.t) * (self.aspect * self.aspect + 1.0).sqrt();
        self.t += (self.step / speed).min(MAX_ANGLE_STEP);
        Some(point)
    }
}

/// Lay out `terms` on `canvas` with random 0°/90° orientation.
pub fn layout(
    terms: &[TermRecord],
    canvas: Canvas,
    previous: Option<&PreviousPlacements>,
) -> Vec<PlacedTerm> {
    CloudLayoutEngine::new(canvas).layout(terms, previous, &mut RandomRotation::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn synthetic_terms(n: usize) -> Vec<TermRecord> {
        (0..n)
            .map(|i| {
                let a = (b'a' + (i % 26) as u8) as char;
                let b = (b'a' + (i / 26) as u8) as char;
                TermRecord::new(format!("term{a}{b}"), (n - i) as u32)
            })
            .collect()
    }

    fn assert_no_overlap(placed: &[PlacedTerm]) {
        for (i, a) in placed.iter().enumerate() {
            for b in &placed[i + 1..] {
                assert!(
                    !a.bounds().intersects(&b.bounds(), 0.0),
                    "'{}' overlaps '{}'",
                    a.term,
                    b.term
                );
            }
        }
    }

    #[test]
    fn font_scale_endpoints_and_midpoint() {
        let scale = FontScale::new(1, 9, (16.0, 60.0));
        assert!((scale.size(1) - 16.0).abs() < 1e-4);
        assert!((scale.size(9) - 60.0).abs() < 1e-4);
        // sqrt(4)=2 sits halfway between sqrt(1)=1 and sqrt(9)=3
        assert!((scale.size(4) - 38.0).abs() < 1e-4);

        let flat = FontScale::new(5, 5, (16.0, 60.0));
        assert_eq!(flat.size(5), 38.0);
    }

    #[test]
    fn font_scale_is_monotonic_and_clamped() {
        let scale = FontScale::new(2, 40, (16.0, 60.0));
        let mut last = 0.0;
        for f in 0..60 {
            let s = scale.size(f);
            assert!(s >= last);
            assert!((16.0..=60.0).contains(&s));
            last = s;
        }
    }

    #[test]
    fn empty_terms_place_nothing() {
        let engine = CloudLayoutEngine::default();
        assert!(engine
            .layout(&[], None, &mut FixedRotation(Rotation::Horizontal))
            .is_empty());
    }

    #[test]
    fn first_term_rests_at_centre() {
        let engine = CloudLayoutEngine::default();
        let terms = vec![TermRecord::new("newton", 5), TermRecord::new("agents", 2)];
        let placed = engine.layout(&terms, None, &mut FixedRotation(Rotation::Horizontal));
        assert_eq!(placed[0].term, "newton");
        assert_eq!((placed[0].x, placed[0].y), (0.0, 0.0));
        assert_eq!(placed[0].font_size, MAX_FONT_SIZE);
    }

    #[test]
    fn spiral_samples_stay_close_on_outer_turns() {
        let step = 3.0;
        let points: Vec<(f32, f32)> = Spiral::new(1.75, 400.0, step).collect();
        assert_eq!(points[0], (0.0, 0.0));
        let (lx, ly) = *points.last().unwrap();
        assert!(lx.hypot(ly) > 350.0);
        for pair in points.windows(2) {
            let (ax, ay) = pair[0];
            let (bx, by) = pair[1];
            let gap = (bx - ax).hypot(by - ay);
            assert!(gap <= step * 1.05, "samples {:?} are {} px apart", pair, gap);
        }
        assert!(points.len() < LayoutConfig::default().max_spiral_steps);
    }

    #[test]
    fn small_terms_fill_the_outer_canvas() {
        // one dominant term followed by many tiny ones; the tiny ones have to
        // find gaps well away from the centre
        let mut terms = vec![TermRecord::new("dominant", 400)];
        terms.extend(synthetic_terms(80).into_iter().map(|t| TermRecord::new(t.term, 1)));
        let engine = CloudLayoutEngine::new(Canvas::new(700.0, 400.0));
        let placed = engine.layout(&terms, None, &mut FixedRotation(Rotation::Horizontal));
        assert_no_overlap(&placed);
        let far = placed
            .iter()
            .filter(|p| p.x.abs() > 250.0 || p.y.abs() > 150.0)
            .count();
        assert!(far > 0, "nothing placed near the edges ({} placed)", placed.len());
    }

    #[test]
    fn fifty_terms_never_overlap() {
        let engine = CloudLayoutEngine::new(Canvas::new(700.0, 400.0));
        let terms = synthetic_terms(50);
        for seed in 0..4 {
            let mut rotations = RandomRotation::with_rng(StdRng::seed_from_u64(seed));
            let placed = engine.layout(&terms, None, &mut rotations);
            assert!(!placed.is_empty());
            assert_no_overlap(&placed);
            let canvas = engine.config().canvas;
            assert!(placed.iter().all(|p| canvas.contains(&p.bounds())));
        }
    }

    #[test]
    fn vertical_terms_never_overlap() {
        let engine = CloudLayoutEngine::default();
        let placed = engine.layout(&synthetic_terms(30), None, &mut FixedRotation(Rotation::Vertical));
        assert_no_overlap(&placed);
        assert!(placed.iter().all(|p| p.height > p.width));
    }

    #[test]
    fn sizes_follow_frequency_order() {
        let engine = CloudLayoutEngine::default();
        let terms = vec![
            TermRecord::new("newton", 9),
            TermRecord::new("agents", 4),
            TermRecord::new("chain", 4),
            TermRecord::new("magic", 1),
        ];
        let placed = engine.layout(&terms, None, &mut FixedRotation(Rotation::Horizontal));
        for pair in placed.windows(2) {
            assert!(pair[0].frequency >= pair[1].frequency);
            assert!(pair[0].font_size >= pair[1].font_size);
        }
    }

    #[test]
    fn oversized_terms_are_dropped() {
        let engine = CloudLayoutEngine::new(Canvas::new(60.0, 30.0));
        let terms = vec![TermRecord::new("extraordinarily", 3), TermRecord::new("zap", 1)];
        let placed = engine.layout(&terms, None, &mut FixedRotation(Rotation::Horizontal));
        assert!(placed.iter().all(|p| p.term != "extraordinarily"));
    }

    #[test]
    fn previous_pose_is_only_a_hint() {
        let engine = CloudLayoutEngine::default();
        let terms = synthetic_terms(10);
        let fresh = engine.layout(&terms, None, &mut FixedRotation(Rotation::Horizontal));

        let mut previous = PreviousPlacements::new();
        let old = Pose {
            x: -120.0,
            y: 45.0,
            rotation: Rotation::Vertical,
        };
        previous.insert(terms[0].term.clone(), old);

        let hinted = engine.layout(&terms, Some(&previous), &mut FixedRotation(Rotation::Horizontal));
        assert_eq!(hinted[0].transition_from, Some(old));
        assert!(hinted[1..].iter().all(|p| p.transition_from.is_none()));
        for (a, b) in fresh.iter().zip(&hinted) {
            assert_eq!(a.pose(), b.pose());
        }
    }

    #[test]
    fn random_rotation_is_roughly_seventy_thirty() {
        let mut source = RandomRotation::with_rng(StdRng::seed_from_u64(7));
        let n = 10_000;
        let vertical = (0..n)
            .filter(|_| source.next_rotation() == Rotation::Vertical)
            .count();
        let share = vertical as f64 / n as f64;
        assert!((0.27..0.33).contains(&share), "vertical share {share}");
    }

    #[test]
    fn sequence_rotation_cycles() {
        let mut seq = SequenceRotation::new(vec![Rotation::Vertical, Rotation::Horizontal]);
        let got: Vec<u16> = (0..4).map(|_| seq.next_rotation().degrees()).collect();
        assert_eq!(got, vec![90, 0, 90, 0]);
        assert_eq!(SequenceRotation::new(Vec::new()).next_rotation(), Rotation::Horizontal);
    }

    #[test]
    fn rotation_serializes_as_degrees() {
        let json = serde_json::to_string(&Rotation::Vertical).unwrap();
        assert_eq!(json, "90");
        let back: Rotation = serde_json::from_str("0").unwrap();
        assert_eq!(back, Rotation::Horizontal);
        assert!(serde_json::from_str::<Rotation>("45").is_err());
    }
}
