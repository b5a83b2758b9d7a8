//! Hermite ⇄ Bézier conversion and value-pool packing.

use crate::curve::{CurveSet, FCurve, Keyframe};
use crate::{
    Animation, CmdTrack, Error, Skeleton, TRACK_ABSOLUTE, TRACK_AXIS_MASK, TRACK_WIDE_INDICES,
    TRACK_WIDE_STEPS, TransformType, Warning,
};
use glam::Vec2;

/// Cubic Bézier control points of one Hermite step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BezierSegment {
    pub p0: Vec2,
    pub p1: Vec2,
    pub p2: Vec2,
    pub p3: Vec2,
}

impl BezierSegment {
    pub fn point(&self, u: f32) -> Vec2 {
        let v = 1.0 - u;
        self.p0 * (v * v * v)
            + self.p1 * (3.0 * u * v * v)
            + self.p2 * (3.0 * u * u * v)
            + self.p3 * (u * u * u)
    }
}

/// Converts a Hermite step into Bézier control points.
///
/// Tangents are per-step (already scaled by the step length), so the value handles sit at
/// `p0 + t0/3` and `p1 - t1/3` and the time handles at thirds of the step.
pub fn decode_hermite_step(start: Vec2, end: Vec2, out_tangent: f32, in_tangent: f32) -> BezierSegment {
    let third = (end.x - start.x) / 3.0;
    BezierSegment {
        p0: start,
        p1: Vec2::new(start.x + third, start.y + out_tangent / 3.0),
        p2: Vec2::new(end.x - third, end.y - in_tangent / 3.0),
        p3: end,
    }
}

/// One encoded sample of a track before packing.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StepSample {
    pub step: u16,
    pub value: f32,
    pub tangent: Option<f32>,
}

/// Samples of one track, in the container's units (degrees for rotation).
#[derive(Clone, Debug, PartialEq)]
pub struct TrackSamples {
    pub bone_id: u16,
    pub transform_type: TransformType,
    pub axis: u8,
    pub absolute: bool,
    pub samples: Vec<StepSample>,
}

/// Packs tracks into a shared value pool.
///
/// Tracks are visited sorted by `(transform_type, bone_id)`; ties keep input order. Interior
/// samples with a tangent take two consecutive slots. Every track is given 32-bit indices.
pub fn pack_value_table(mut tracks: Vec<TrackSamples>) -> (Vec<CmdTrack>, Vec<f32>) {
    tracks.sort_by_key(|t| (t.transform_type, t.bone_id));

    let mut values = Vec::new();
    let mut packed = Vec::with_capacity(tracks.len());
    for track in tracks {
        let mut bit_flag = (track.axis & TRACK_AXIS_MASK) | TRACK_WIDE_INDICES;
        if track.absolute {
            bit_flag |= TRACK_ABSOLUTE;
        }
        if track.samples.iter().any(|s| s.step > u8::MAX as u16) {
            bit_flag |= TRACK_WIDE_STEPS;
        }

        let last = track.samples.len().saturating_sub(1);
        let mut steps = Vec::with_capacity(track.samples.len());
        let mut value_indices = Vec::with_capacity(track.samples.len());
        let mut tangent_indices = Vec::with_capacity(track.samples.len());
        for (i, sample) in track.samples.iter().enumerate() {
            steps.push(sample.step);
            let index = values.len() as u32;
            value_indices.push(index);
            values.push(sample.value);
            match sample.tangent {
                Some(tangent) if i > 0 && i < last => {
                    values.push(tangent);
                    tangent_indices.push(Some(index + 1));
                }
                _ => tangent_indices.push(None),
            }
        }

        packed.push(CmdTrack {
            bone_id: track.bone_id,
            transform_type: track.transform_type,
            bit_flag,
            steps,
            value_indices,
            tangent_indices,
        });
    }
    (packed, values)
}

fn to_curve_unit(channel: TransformType, v: f32) -> f32 {
    match channel {
        TransformType::RotationEuler => v.to_radians(),
        _ => v,
    }
}

fn to_container_unit(channel: TransformType, v: f32) -> f32 {
    match channel {
        TransformType::RotationEuler => v.to_degrees(),
        _ => v,
    }
}

fn pool_value(animation: &Animation, index: u32) -> Result<f32, Error> {
    animation
        .values
        .get(index as usize)
        .copied()
        .ok_or_else(|| Error::InvalidValue {
            message: format!(
                "animation '{}' indexes value {index} (value count {})",
                animation.name,
                animation.values.len()
            ),
        })
}

/// Builds one curve per track, grouped by bone in node-ID order.
pub fn import_curves(skeleton: &Skeleton, animation: &Animation) -> Result<CurveSet, Error> {
    let mut tracks: Vec<&CmdTrack> = animation.tracks.iter().collect();
    tracks.sort_by_key(|t| t.bone_id);

    let mut set = CurveSet::new();
    for track in tracks {
        let Some(node) = skeleton.nodes.get(track.bone_id as usize) else {
            log::warn!(
                "animation '{}' has a track for missing node {}",
                animation.name,
                track.bone_id
            );
            continue;
        };
        let channel = track.transform_type;

        let mut points = Vec::with_capacity(track.steps.len());
        for i in 0..track.steps.len() {
            let value_index = track.value_indices.get(i).copied().unwrap_or(u32::MAX);
            let value = to_curve_unit(channel, pool_value(animation, value_index)?);
            let tangent = match track.tangent_indices.get(i).copied().flatten() {
                Some(index) => Some(to_curve_unit(channel, pool_value(animation, index)?)),
                None => None,
            };
            points.push((Vec2::new(track.steps[i] as f32, value), tangent));
        }

        let mut keyframes: Vec<Keyframe> = points
            .iter()
            .map(|(co, _)| Keyframe::new(co.x, co.y))
            .collect();
        for i in 0..points.len().saturating_sub(1) {
            let (start, out_tangent) = points[i];
            let (end, in_tangent) = points[i + 1];
            let segment =
                decode_hermite_step(start, end, out_tangent.unwrap_or(0.0), in_tangent.unwrap_or(0.0));
            if out_tangent.is_some() {
                keyframes[i].handle_right = segment.p1;
            }
            if in_tangent.is_some() {
                keyframes[i + 1].handle_left = segment.p2;
            }
        }

        set.push(FCurve {
            bone: node.name.clone(),
            channel,
            axis: track.axis(),
            keyframes,
        });
    }
    Ok(set)
}

/// Collects curves back into track samples (container units).
///
/// The outgoing handle's slope times the step length becomes the tangent; a zero-length
/// handle means no tangent.
pub fn export_track_samples(
    skeleton: &Skeleton,
    curves: &CurveSet,
) -> Result<(Vec<TrackSamples>, Vec<Warning>), Error> {
    let mut tracks = Vec::new();
    let mut warnings = Vec::new();
    for curve in &curves.curves {
        let Some((id, node)) = skeleton.node(&curve.bone) else {
            log::warn!("curve targets bone '{}' which is not in the skeleton", curve.bone);
            warnings.push(Warning::UnknownCurveBone {
                bone: curve.bone.clone(),
            });
            continue;
        };
        if curve.keyframes.is_empty() || curve.axis > 2 {
            continue;
        }
        let bone_id = u16::try_from(id)
            .map_err(|_| Error::encode(format!("bone '{}' has id {id} past u16 range", curve.bone)))?;

        let channel = curve.channel;
        let mut samples = Vec::with_capacity(curve.keyframes.len());
        for (i, key) in curve.keyframes.iter().enumerate() {
            let tangent = curve.keyframes.get(i + 1).and_then(|next| {
                let handle = key.handle_right - key.co;
                if handle.x.abs() <= f32::EPSILON {
                    return None;
                }
                let dt = next.co.x - key.co.x;
                Some(to_container_unit(channel, handle.y * dt / handle.x))
            });
            let step = key.co.x.round().clamp(0.0, u16::MAX as f32) as u16;
            // Steps must stay strictly increasing once snapped to whole frames.
            if samples.last().is_some_and(|s: &StepSample| step <= s.step) {
                continue;
            }
            samples.push(StepSample {
                step,
                value: to_container_unit(channel, key.co.y),
                tangent,
            });
        }

        tracks.push(TrackSamples {
            bone_id,
            transform_type: channel,
            axis: curve.axis as u8,
            absolute: node.channels.is_absolute(channel),
            samples,
        });
    }
    Ok((tracks, warnings))
}

/// Rebuilds an animation from curves.
pub fn export_curves(
    skeleton: &Skeleton,
    curves: &CurveSet,
    name: &str,
    duration: u16,
) -> Result<(Animation, Vec<Warning>), Error> {
    let (samples, warnings) = export_track_samples(skeleton, curves)?;
    let (tracks, values) = pack_value_table(samples);
    Ok((
        Animation {
            name: name.to_string(),
            duration,
            tracks,
            values,
            reserved: 0,
        },
        warnings,
    ))
}
