use crate::curve::{CurveSet, FCurve, Keyframe};
use crate::tangent::{
    StepSample, TrackSamples, decode_hermite_step, export_curves, import_curves, pack_value_table,
};
use crate::{
    Animation, CmdTrack, Node, Skeleton, TRACK_ABSOLUTE, TRACK_WIDE_INDICES, TRACK_WIDE_STEPS,
    TransformType, Warning,
};
use glam::{Mat4, Vec2, Vec3};

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn two_node_skeleton() -> Skeleton {
    Skeleton::new(
        vec![
            Node::new(0, "Root", None, Mat4::IDENTITY),
            Node::new(1, "Hip", Some(0), Mat4::from_translation(Vec3::Y)),
        ],
        Vec::new(),
    )
    .unwrap()
}

fn linear_curve() -> FCurve {
    let mut curve = FCurve::new("Hip", TransformType::Translation, 0);
    curve.keyframes = vec![Keyframe::new(0.0, 0.0), Keyframe::new(30.0, 10.0)];
    curve
}

#[test]
fn hermite_step_keeps_endpoints_exact() {
    let start = Vec2::new(3.0, 1.25);
    let end = Vec2::new(9.0, -7.5);
    let segment = decode_hermite_step(start, end, 4.0, -2.0);

    assert_eq!(segment.point(0.0), start);
    assert_eq!(segment.point(1.0), end);
    assert_approx(segment.p1.x, 5.0);
    assert_approx(segment.p1.y, 1.25 + 4.0 / 3.0);
    assert_approx(segment.p2.x, 7.0);
    assert_approx(segment.p2.y, -7.5 + 2.0 / 3.0);
}

#[test]
fn hermite_handles_collapse_with_zero_tangents() {
    let start = Vec2::new(0.0, 2.0);
    let end = Vec2::new(6.0, 8.0);
    let segment = decode_hermite_step(start, end, 0.0, 0.0);
    assert_eq!(segment.p1.y, start.y);
    assert_eq!(segment.p2.y, end.y);

    let mut curve = FCurve::new("Hip", TransformType::Translation, 1);
    curve.keyframes = vec![
        Keyframe {
            co: start,
            handle_left: start,
            handle_right: segment.p1,
        },
        Keyframe {
            co: end,
            handle_left: segment.p2,
            handle_right: end,
        },
    ];
    assert_approx(curve.evaluate(3.0).unwrap(), 5.0);
}

#[test]
fn curve_holds_outside_key_range_and_interpolates_inside() {
    let curve = linear_curve();
    assert_eq!(curve.evaluate(-5.0), Some(0.0));
    assert_eq!(curve.evaluate(45.0), Some(10.0));
    assert_approx(curve.evaluate(15.0).unwrap(), 5.0);
    assert_approx(curve.evaluate(6.0).unwrap(), 2.0);
    assert_eq!(FCurve::new("Hip", TransformType::Scale, 0).evaluate(1.0), None);
}

#[test]
fn nan_frame_has_no_value() {
    assert_eq!(linear_curve().evaluate(f32::NAN), None);
}

#[test]
fn insert_keyframe_replaces_or_inserts_in_order() {
    let mut curve = linear_curve();
    curve.insert_keyframe(10.0, 4.0);
    curve.insert_keyframe(30.0, 12.0);
    curve.insert_keyframe(-2.0, 1.0);

    let frames: Vec<f32> = curve.keyframes.iter().map(|k| k.frame()).collect();
    assert_eq!(frames, vec![-2.0, 0.0, 10.0, 30.0]);
    assert_eq!(curve.keyframes[3].value(), 12.0);
    assert_eq!(curve.keyframes[3].handle_left.y, 12.0);
}

#[test]
fn import_converts_rotation_degrees_to_radians() {
    let animation = Animation {
        name: "turn".to_string(),
        duration: 11,
        tracks: vec![CmdTrack {
            bone_id: 1,
            transform_type: TransformType::RotationEuler,
            bit_flag: 0x02,
            steps: vec![0, 10],
            value_indices: vec![0, 1],
            tangent_indices: vec![None, None],
        }],
        values: vec![0.0, 90.0],
        reserved: 0,
    };
    let curves = import_curves(&two_node_skeleton(), &animation).unwrap();
    let curve = curves.find("Hip", TransformType::RotationEuler, 2).unwrap();
    assert_approx(curve.keyframes[1].value(), std::f32::consts::FRAC_PI_2);
    assert_approx(curve.evaluate(10.0).unwrap(), std::f32::consts::FRAC_PI_2);
}

#[test]
fn import_places_tangent_handles_at_step_thirds() {
    let animation = Animation {
        name: "bob".to_string(),
        duration: 31,
        tracks: vec![CmdTrack {
            bone_id: 1,
            transform_type: TransformType::Translation,
            bit_flag: 0x01 | TRACK_WIDE_INDICES,
            steps: vec![0, 12, 30],
            value_indices: vec![0, 1, 3],
            tangent_indices: vec![None, Some(2), None],
        }],
        values: vec![0.0, 4.0, 3.0, 1.0],
        reserved: 0,
    };
    let curves = import_curves(&two_node_skeleton(), &animation).unwrap();
    let keys = &curves.find("Hip", TransformType::Translation, 1).unwrap().keyframes;

    assert_eq!(keys[0].handle_right, keys[0].co);
    assert_eq!(keys[0].handle_left, keys[0].co);
    assert_approx(keys[1].handle_left.x, 8.0);
    assert_approx(keys[1].handle_left.y, 3.0);
    assert_approx(keys[1].handle_right.x, 18.0);
    assert_approx(keys[1].handle_right.y, 5.0);
    assert_eq!(keys[2].handle_left, keys[2].co);
}

#[test]
fn export_recovers_interior_tangent_and_degrees() {
    let animation = Animation {
        name: "swing".to_string(),
        duration: 41,
        tracks: vec![CmdTrack {
            bone_id: 1,
            transform_type: TransformType::RotationEuler,
            bit_flag: TRACK_WIDE_INDICES,
            steps: vec![0, 20, 40],
            value_indices: vec![0, 1, 3],
            tangent_indices: vec![None, Some(2), None],
        }],
        values: vec![10.0, 45.0, -6.0, 0.0],
        reserved: 0,
    };
    let skeleton = two_node_skeleton();
    let curves = import_curves(&skeleton, &animation).unwrap();
    let (exported, warnings) = export_curves(&skeleton, &curves, "swing", 41).unwrap();

    assert!(warnings.is_empty());
    assert_eq!(exported.tracks.len(), 1);
    let track = &exported.tracks[0];
    assert_eq!(track.steps, vec![0, 20, 40]);
    assert_eq!(track.value_indices, vec![0, 1, 3]);
    assert_eq!(track.tangent_indices, vec![None, Some(2), None]);
    for (actual, expected) in exported.values.iter().zip(&animation.values) {
        assert_approx(*actual, *expected);
    }
}

#[test]
fn export_marks_absolute_channels_and_reports_unknown_bones() {
    let mut skeleton = two_node_skeleton();
    skeleton.nodes[1].channels.absolute_translation = true;

    let mut curves = CurveSet::new();
    curves.push(linear_curve());
    let mut stray = linear_curve();
    stray.bone = "Tail".to_string();
    curves.push(stray);

    let (animation, warnings) = export_curves(&skeleton, &curves, "walk", 31).unwrap();
    assert_eq!(
        warnings,
        vec![Warning::UnknownCurveBone {
            bone: "Tail".to_string()
        }]
    );
    assert_eq!(animation.tracks.len(), 1);
    assert_eq!(
        animation.tracks[0].bit_flag,
        TRACK_ABSOLUTE | TRACK_WIDE_INDICES
    );
    assert_eq!(animation.values, vec![0.0, 10.0]);
}

fn samples(bone_id: u16, transform_type: TransformType, steps: &[(u16, f32, Option<f32>)]) -> TrackSamples {
    TrackSamples {
        bone_id,
        transform_type,
        axis: 1,
        absolute: false,
        samples: steps
            .iter()
            .map(|&(step, value, tangent)| StepSample {
                step,
                value,
                tangent,
            })
            .collect(),
    }
}

#[test]
fn packing_sorts_by_type_then_bone_and_forces_wide_indices() {
    let input = vec![
        samples(0, TransformType::Scale, &[(0, 1.0, None), (10, 2.0, None)]),
        samples(
            3,
            TransformType::Translation,
            &[(0, 5.0, Some(9.0)), (5, 6.0, Some(1.5)), (10, 7.0, Some(8.0))],
        ),
        samples(1, TransformType::Translation, &[(0, 0.5, None), (300, 0.25, None)]),
    ];
    let (tracks, values) = pack_value_table(input.clone());

    let order: Vec<(TransformType, u16)> = tracks
        .iter()
        .map(|t| (t.transform_type, t.bone_id))
        .collect();
    assert_eq!(
        order,
        vec![
            (TransformType::Translation, 1),
            (TransformType::Translation, 3),
            (TransformType::Scale, 0),
        ]
    );
    assert!(tracks.iter().all(|t| t.bit_flag & TRACK_WIDE_INDICES != 0));
    assert_eq!(tracks[0].bit_flag & TRACK_WIDE_STEPS, TRACK_WIDE_STEPS);
    assert_eq!(tracks[1].bit_flag & TRACK_WIDE_STEPS, 0);

    assert_eq!(values, vec![0.5, 0.25, 5.0, 6.0, 1.5, 7.0, 1.0, 2.0]);
    assert_eq!(tracks[1].value_indices, vec![2, 3, 5]);
    assert_eq!(tracks[1].tangent_indices, vec![None, Some(4), None]);

    assert_eq!(pack_value_table(input), (tracks, values));
}
