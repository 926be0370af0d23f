//! Freehand stroke smoothing for the drawing canvas.
//!
//! Pointer samples go in, cubic Bezier segments with a start and end width
//! come out, one segment per accepted sample once enough history exists.
//! Rendering is left to the caller.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const SAMPLE_BUFFER: usize = 8;
const CURVE_POINTS: usize = 4;

/// Speed (px/ms) at which a stroke reaches its thinnest.
const MAX_VELOCITY: f64 = 4.0;
const MIN_WIDTH_RATIO: f64 = 0.35;
const WIDTH_EASING: f64 = 0.35;
const MAX_DECEL_BOOST: f64 = 0.3;

const SLOW_MIN_DISTANCE: f64 = 3.0;
const FAST_MIN_DISTANCE: f64 = 1.0;

const SMOOTHING_WEIGHTS: [f64; 3] = [0.25, 0.5, 0.25];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn lerp(self, other: Point, t: f64) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    /// Milliseconds since an arbitrary origin; only differences matter.
    pub t: f64,
}

impl Sample {
    pub fn new(x: f64, y: f64, t: f64) -> Self {
        Sample { x, y, t }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseCurve {
    /// Linear thinning, for fine work.
    #[default]
    Precision,
    /// Square-root thinning with a boost when the pen decelerates.
    Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrushConfig {
    pub base_width: f64,
    pub curve: ResponseCurve,
}

impl Default for BrushConfig {
    fn default() -> Self {
        BrushConfig {
            base_width: 6.0,
            curve: ResponseCurve::Precision,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub start: Point,
    pub control1: Point,
    pub control2: Point,
    pub end: Point,
    pub start_width: f64,
    pub end_width: f64,
}

impl Segment {
    /// Point on the curve at `t` in `[0, 1]`.
    pub fn at(&self, t: f64) -> Point {
        let a = self.start.lerp(self.control1, t);
        let b = self.control1.lerp(self.control2, t);
        let c = self.control2.lerp(self.end, t);
        a.lerp(b, t).lerp(b.lerp(c, t), t)
    }
}

pub fn min_distance(velocity: f64) -> f64 {
    (SLOW_MIN_DISTANCE - 2.0 * velocity).max(FAST_MIN_DISTANCE)
}

/// Target width before easing.
pub fn target_width(config: &BrushConfig, velocity: f64, acceleration: f64) -> f64 {
    let speed = (velocity / MAX_VELOCITY).clamp(0.0, 1.0);
    let ratio = match config.curve {
        ResponseCurve::Precision => 1.0 - speed,
        ResponseCurve::Expression => {
            let boost = (-acceleration * 20.0).clamp(0.0, MAX_DECEL_BOOST);
            1.0 - speed.sqrt() * 0.8 + boost
        }
    };
    config.base_width * ratio.clamp(MIN_WIDTH_RATIO, 1.0)
}

/// Stateful smoother for one stroke, from pointer-down to pointer-up.
#[derive(Debug, Clone)]
pub struct StrokeSmoother {
    config: BrushConfig,
    samples: VecDeque<Sample>,
    smoothed: VecDeque<Point>,
    velocity: f64,
    acceleration: f64,
    width: f64,
}

impl StrokeSmoother {
    pub fn new(config: BrushConfig) -> Self {
        StrokeSmoother {
            config,
            samples: VecDeque::with_capacity(SAMPLE_BUFFER),
            smoothed: VecDeque::with_capacity(CURVE_POINTS),
            velocity: 0.0,
            acceleration: 0.0,
            width: config.base_width,
        }
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Feeds one pointer sample. Returns the segment it completes, if any.
    /// Samples closer than the current [`min_distance`] are dropped.
    pub fn push(&mut self, sample: Sample) -> Option<Segment> {
        if let Some(last) = self.samples.back().copied() {
            let distance = last.point().distance(sample.point());
            if distance < min_distance(self.velocity) {
                return None;
            }
            let dt = (sample.t - last.t).max(1.0);
            let velocity = distance / dt;
            self.acceleration = (velocity - self.velocity) / dt;
            self.velocity = velocity;
        }

        if self.samples.len() == SAMPLE_BUFFER {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);

        match self.samples.len() {
            1 => {
                self.push_smoothed(sample.point());
                None
            }
            2 => None,
            n => {
                let [w0, w1, w2] = SMOOTHING_WEIGHTS;
                let (a, b, c) = (
                    self.samples[n - 3].point(),
                    self.samples[n - 2].point(),
                    self.samples[n - 1].point(),
                );
                let averaged = Point::new(
                    a.x * w0 + b.x * w1 + c.x * w2,
                    a.y * w0 + b.y * w1 + c.y * w2,
                );
                self.push_smoothed(averaged);
                self.emit_pending()
            }
        }
    }

    /// Ends the stroke: draws through to the last raw sample and tapers.
    pub fn finish(mut self) -> Vec<Segment> {
        let Some(last) = self.samples.back().map(Sample::point) else {
            return Vec::new();
        };

        if self.samples.len() == 1 {
            return vec![Segment {
                start: last,
                control1: last,
                control2: last,
                end: last,
                start_width: self.width,
                end_width: self.width,
            }];
        }

        self.push_smoothed(last);
        let mut segments = Vec::with_capacity(2);
        segments.extend(self.emit_pending());
        segments.extend(self.emit_last());
        segments
    }

    fn push_smoothed(&mut self, point: Point) {
        if self.smoothed.len() == CURVE_POINTS {
            self.smoothed.pop_front();
        }
        self.smoothed.push_back(point);
    }

    // Segment between the second- and third-last smoothed points, using
    // Catmull-Rom neighbours for the control points.
    fn emit_pending(&mut self) -> Option<Segment> {
        let n = self.smoothed.len();
        if n < 3 {
            return None;
        }
        let (p1, p2, p3) = (self.smoothed[n - 3], self.smoothed[n - 2], self.smoothed[n - 1]);
        let p0 = if n >= 4 { self.smoothed[n - 4] } else { p1 };
        Some(self.segment(p0, p1, p2, p3, false))
    }

    fn emit_last(&mut self) -> Option<Segment> {
        let n = self.smoothed.len();
        if n < 2 {
            return None;
        }
        let p1 = self.smoothed[n - 2];
        let p2 = self.smoothed[n - 1];
        let p0 = if n >= 3 { self.smoothed[n - 3] } else { p1 };
        Some(self.segment(p0, p1, p2, p2, true))
    }

    fn segment(&mut self, p0: Point, p1: Point, p2: Point, p3: Point, taper: bool) -> Segment {
        let start_width = self.width;
        self.width = if taper {
            self.config.base_width * MIN_WIDTH_RATIO
        } else {
            let target = target_width(&self.config, self.velocity, self.acceleration);
            self.width + (target - self.width) * WIDTH_EASING
        };

        Segment {
            start: p1,
            control1: Point::new(p1.x + (p2.x - p0.x) / 6.0, p1.y + (p2.y - p0.y) / 6.0),
            control2: Point::new(p2.x - (p3.x - p1.x) / 6.0, p2.y - (p3.y - p1.y) / 6.0),
            end: p2,
            start_width,
            end_width: self.width,
        }
    }
}
