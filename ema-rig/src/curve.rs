//! Host-side curve storage and sampling.
//!
//! Curves are stored as cubic Bézier keyframes in (frame, value) space, one curve per
//! animated component.

use crate::TransformType;
use glam::Vec2;

const SOLVE_EPSILON: f32 = 1.0e-6;
const NEWTON_ITERATIONS: usize = 8;
const BISECT_ITERATIONS: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Keyframe {
    pub co: Vec2,
    pub handle_left: Vec2,
    pub handle_right: Vec2,
}

impl Keyframe {
    /// A key whose handles sit on the key itself.
    pub fn new(frame: f32, value: f32) -> Self {
        let co = Vec2::new(frame, value);
        Self {
            co,
            handle_left: co,
            handle_right: co,
        }
    }

    pub fn frame(&self) -> f32 {
        self.co.x
    }

    pub fn value(&self) -> f32 {
        self.co.y
    }
}

/// One animated component of one bone.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FCurve {
    pub bone: String,
    pub channel: TransformType,
    /// Component index, 0..=2.
    pub axis: usize,
    /// Ordered by frame.
    pub keyframes: Vec<Keyframe>,
}

impl FCurve {
    pub fn new(bone: impl Into<String>, channel: TransformType, axis: usize) -> Self {
        Self {
            bone: bone.into(),
            channel,
            axis,
            keyframes: Vec::new(),
        }
    }

    /// Samples the curve at `frame`; `None` for an empty curve or a NaN frame.
    ///
    /// Values are held constant before the first and after the last key.
    pub fn evaluate(&self, frame: f32) -> Option<f32> {
        if frame.is_nan() {
            return None;
        }
        let first = self.keyframes.first()?;
        let last = self.keyframes.last()?;
        if frame <= first.co.x {
            return Some(first.co.y);
        }
        if frame >= last.co.x {
            return Some(last.co.y);
        }

        let index = self.keyframes.partition_point(|k| k.co.x <= frame);
        let k0 = &self.keyframes[index - 1];
        let k1 = &self.keyframes[index];
        Some(segment_value(k0, k1, frame))
    }

    /// Inserts a key at `frame`, replacing the value of an existing key at the same frame.
    pub fn insert_keyframe(&mut self, frame: f32, value: f32) -> &mut Keyframe {
        let index = self.keyframes.partition_point(|k| k.co.x < frame);
        let replace = self
            .keyframes
            .get(index)
            .is_some_and(|k| (k.co.x - frame).abs() <= SOLVE_EPSILON);
        if replace {
            let key = &mut self.keyframes[index];
            let delta = value - key.co.y;
            key.co.y = value;
            key.handle_left.y += delta;
            key.handle_right.y += delta;
        } else {
            self.keyframes.insert(index, Keyframe::new(frame, value));
        }
        &mut self.keyframes[index]
    }
}

fn segment_value(k0: &Keyframe, k1: &Keyframe, frame: f32) -> f32 {
    let x0 = k0.co.x;
    let x3 = k1.co.x;
    if (x3 - x0).abs() <= SOLVE_EPSILON {
        return k1.co.y;
    }

    // Handles that overshoot the segment would make x(u) non-monotonic.
    let x1 = k0.handle_right.x.clamp(x0, x3);
    let x2 = k1.handle_left.x.clamp(x0, x3);
    let u = solve_parameter([x0, x1, x2, x3], frame);
    cubic([k0.co.y, k0.handle_right.y, k1.handle_left.y, k1.co.y], u)
}

fn cubic(p: [f32; 4], u: f32) -> f32 {
    let v = 1.0 - u;
    p[0] * v * v * v + 3.0 * p[1] * u * v * v + 3.0 * p[2] * u * u * v + p[3] * u * u * u
}

fn cubic_derivative(p: [f32; 4], u: f32) -> f32 {
    let v = 1.0 - u;
    3.0 * (p[1] - p[0]) * v * v + 6.0 * (p[2] - p[1]) * u * v + 3.0 * (p[3] - p[2]) * u * u
}

/// Finds `u` in `[0, 1]` with `x(u) == target`.
fn solve_parameter(x: [f32; 4], target: f32) -> f32 {
    let mut u = ((target - x[0]) / (x[3] - x[0])).clamp(0.0, 1.0);
    for _ in 0..NEWTON_ITERATIONS {
        let err = cubic(x, u) - target;
        if err.abs() <= SOLVE_EPSILON {
            return u;
        }
        let slope = cubic_derivative(x, u);
        if slope.abs() <= SOLVE_EPSILON {
            break;
        }
        let next = u - err / slope;
        if !(0.0..=1.0).contains(&next) {
            break;
        }
        u = next;
    }

    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    for _ in 0..BISECT_ITERATIONS {
        u = (lo + hi) * 0.5;
        let value = cubic(x, u);
        if (value - target).abs() <= SOLVE_EPSILON {
            break;
        }
        if value < target {
            lo = u;
        } else {
            hi = u;
        }
    }
    u
}

/// Every curve of one action, standing in for the host's curve store.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CurveSet {
    pub curves: Vec<FCurve>,
}

impl CurveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    pub fn push(&mut self, curve: FCurve) {
        self.curves.push(curve);
    }

    pub fn find(&self, bone: &str, channel: TransformType, axis: usize) -> Option<&FCurve> {
        self.curves
            .iter()
            .find(|c| c.bone == bone && c.channel == channel && c.axis == axis)
    }

    pub fn find_mut(
        &mut self,
        bone: &str,
        channel: TransformType,
        axis: usize,
    ) -> Option<&mut FCurve> {
        self.curves
            .iter_mut()
            .find(|c| c.bone == bone && c.channel == channel && c.axis == axis)
    }

    pub fn curves_for<'a>(&'a self, bone: &'a str) -> impl Iterator<Item = &'a FCurve> + 'a {
        self.curves.iter().filter(move |c| c.bone == bone)
    }

    pub fn has_curves_for(&self, bone: &str) -> bool {
        self.curves.iter().any(|c| c.bone == bone)
    }
}
