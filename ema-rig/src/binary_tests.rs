use crate::binary::{decode_animation, encode_animation};
use crate::{
    Animation, AnimationContainer, BindPose, CmdTrack, Error, IkEntry, Node, Skeleton,
    TRACK_ABSOLUTE, TRACK_WIDE_INDICES, TRACK_WIDE_STEPS, TransformType, Warning,
};
use glam::{Mat4, Quat, Vec3};

fn node(id: usize, name: &str, parent: Option<usize>, translation: [f32; 3]) -> Node {
    Node::new(
        id,
        name,
        parent,
        Mat4::from_translation(Vec3::from(translation)),
    )
}

fn limb_skeleton() -> Skeleton {
    let mut nodes = vec![
        node(0, "Root", None, [0.0, 0.0, 0.0]),
        Node::new(
            1,
            "Hip",
            Some(0),
            Mat4::from_rotation_translation(Quat::from_rotation_z(0.25), Vec3::Y),
        ),
        node(2, "Knee", Some(1), [0.0, -0.5, 0.0]),
        node(3, "Foot", Some(2), [0.0, -0.5, 0.0]),
        node(4, "FootEff", Some(0), [0.0, 0.0, 0.0]),
        node(5, "KneePole", Some(0), [0.0, 0.5, 1.0]),
        node(6, "Excess", Some(0), [0.0, 0.0, 0.0]),
    ];
    nodes[2].pre_matrix = Mat4::from_rotation_x(0.5);
    nodes[6].bit_flag = 0;
    let ik = IkEntry {
        method: 0,
        solver_flags: 0x02,
        variant_flags: 0x01,
        node_ids: vec![4, 1, 2, 5, 3],
        floats: vec![0.5, 1.0],
    };
    Skeleton::new(nodes, vec![ik]).unwrap()
}

fn hip_animation() -> Animation {
    Animation {
        name: "walk".to_string(),
        duration: 31,
        tracks: vec![
            CmdTrack {
                bone_id: 1,
                transform_type: TransformType::Translation,
                bit_flag: 0x00,
                steps: vec![0, 30],
                value_indices: vec![0, 1],
                tangent_indices: vec![None, None],
            },
            CmdTrack {
                bone_id: 2,
                transform_type: TransformType::RotationEuler,
                bit_flag: 0x02 | TRACK_ABSOLUTE,
                steps: vec![0, 10, 20],
                value_indices: vec![2, 3, 5],
                tangent_indices: vec![None, Some(4), None],
            },
        ],
        values: vec![0.0, 10.0, 15.0, 90.0, -3.5, 45.0],
        reserved: 0,
    }
}

#[test]
fn animation_region_round_trips() {
    let animation = hip_animation();
    let bytes = encode_animation(&animation).unwrap();
    let decoded = decode_animation(&bytes, 0).unwrap();
    assert_eq!(decoded, animation);
}

#[test]
fn tangentless_values_survive_round_trip_literally() {
    let animation = hip_animation();
    let bytes = encode_animation(&animation).unwrap();
    let decoded = decode_animation(&bytes, 0).unwrap();
    let track = &decoded.tracks[0];
    assert_eq!(decoded.values[track.value_indices[0] as usize].to_bits(), 0.0f32.to_bits());
    assert_eq!(decoded.values[track.value_indices[1] as usize].to_bits(), 10.0f32.to_bits());
    assert_eq!(track.tangent_indices, vec![None, None]);
}

#[test]
fn wide_steps_and_indices_round_trip() {
    let mut animation = hip_animation();
    for track in &mut animation.tracks {
        track.bit_flag |= TRACK_WIDE_INDICES;
    }
    animation.tracks[0].bit_flag |= TRACK_WIDE_STEPS;
    animation.tracks[0].steps = vec![0, 400];
    animation.duration = 401;

    let bytes = encode_animation(&animation).unwrap();
    assert_eq!(decode_animation(&bytes, 0).unwrap(), animation);
}

#[test]
fn encoder_rejects_step_that_needs_wide_flag() {
    let mut animation = hip_animation();
    animation.tracks[0].steps = vec![0, 300];
    let err = encode_animation(&animation).unwrap_err();
    assert!(matches!(err, Error::Encode { .. }), "{err}");
}

#[test]
fn encoder_rejects_detached_tangent_slot() {
    let mut animation = hip_animation();
    animation.tracks[1].tangent_indices[1] = Some(5);
    let err = encode_animation(&animation).unwrap_err();
    assert!(matches!(err, Error::Encode { .. }), "{err}");
}

#[test]
fn container_round_trips_and_keeps_skeleton_block() {
    let skeleton = limb_skeleton();
    let container =
        AnimationContainer::from_parts(skeleton.clone(), vec![hip_animation()]).unwrap();
    let bytes = container.to_bytes().unwrap();
    assert_eq!(&bytes[0..4], b"#EMA");

    let decoded = AnimationContainer::from_bytes(&bytes).unwrap();
    assert_eq!(decoded.skeleton, skeleton);
    assert_eq!(decoded.animations, vec![hip_animation()]);
    assert_eq!(decoded.to_bytes().unwrap(), bytes);
}

#[test]
fn ik_endpoints_are_marked_passthrough_on_load() {
    let container = AnimationContainer::from_parts(limb_skeleton(), Vec::new()).unwrap();
    let decoded = AnimationContainer::from_bytes(&container.to_bytes().unwrap()).unwrap();

    let flags: Vec<bool> = decoded.skeleton.nodes.iter().map(|n| n.passthrough).collect();
    assert_eq!(flags, vec![false, false, false, false, true, true, false]);
    let limb = decoded.skeleton.ik_entries[0].limb().unwrap();
    assert_eq!((limb.upper, limb.lower, limb.end), (1, 2, 3));
    assert!(limb.flip_bend);
    assert_eq!(decoded.skeleton.ik_entries[0].floats, vec![0.5, 1.0]);
    assert_eq!(decoded.skeleton.nodes[6].bit_flag, 0);
}

#[test]
fn bad_magic_reports_offset_zero() {
    let mut bytes = AnimationContainer::from_parts(limb_skeleton(), Vec::new())
        .unwrap()
        .to_bytes()
        .unwrap();
    bytes[0..4].copy_from_slice(b"#EMX");
    match AnimationContainer::from_bytes(&bytes) {
        Err(Error::Format { offset, .. }) => assert_eq!(offset, 0),
        other => panic!("expected format error, got {other:?}"),
    }
}

#[test]
fn truncated_buffer_reports_offset() {
    let bytes = AnimationContainer::from_parts(limb_skeleton(), vec![hip_animation()])
        .unwrap()
        .to_bytes()
        .unwrap();
    match AnimationContainer::from_bytes(&bytes[..0x1A]) {
        Err(Error::Format { offset, message }) => {
            assert_eq!(offset, 0x14, "{message}");
        }
        other => panic!("expected format error, got {other:?}"),
    }
    assert!(matches!(
        AnimationContainer::from_bytes(&bytes[..bytes.len() - 8]),
        Err(Error::Format { .. })
    ));
}

#[test]
fn pool_index_past_value_count_is_rejected() {
    // Shrink the declared value count of a valid buffer below the highest index in use.
    let mut bytes = encode_animation(&hip_animation()).unwrap();
    bytes[4..8].copy_from_slice(&5u32.to_le_bytes());
    assert!(matches!(decode_animation(&bytes, 0), Err(Error::Format { .. })));
}

#[test]
fn invalid_parent_is_a_format_error() {
    let mut bytes = AnimationContainer::from_parts(limb_skeleton(), Vec::new())
        .unwrap()
        .to_bytes()
        .unwrap();
    let skeleton = u32::from_le_bytes(bytes[0x0C..0x10].try_into().unwrap()) as usize;
    let node_table = u32::from_le_bytes(bytes[skeleton + 8..skeleton + 12].try_into().unwrap());
    let second = skeleton + node_table as usize + 0x90;
    bytes[second..second + 2].copy_from_slice(&42u16.to_le_bytes());
    assert!(matches!(
        AnimationContainer::from_bytes(&bytes),
        Err(Error::Format { .. })
    ));
}

#[test]
fn bind_pose_binds_by_name_and_reports_unmatched() {
    let bind = BindPose {
        nodes: vec![
            ("Hip".to_string(), Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0))),
            ("Tail".to_string(), Mat4::IDENTITY),
            ("Root".to_string(), Mat4::from_scale(Vec3::splat(2.0))),
        ],
    };
    let decoded = BindPose::from_bytes(&bind.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded, bind);

    let mut skeleton = limb_skeleton();
    let report = skeleton.bind_pose(&decoded);
    assert_eq!(report.matched, 2);
    assert_eq!(
        report.warnings,
        vec![Warning::UnmatchedBindNode {
            node: "Tail".to_string()
        }]
    );
    assert_eq!(
        skeleton.nodes[1].sbp_matrix,
        Some(Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)))
    );
    assert_eq!(skeleton.nodes[2].sbp_matrix, None);
    assert_eq!(skeleton.nodes[2].bind_matrix(), Mat4::IDENTITY);
}

#[test]
fn bind_pose_decoder_rejects_animation_container() {
    let bytes = AnimationContainer::from_parts(limb_skeleton(), Vec::new())
        .unwrap()
        .to_bytes()
        .unwrap();
    assert!(matches!(
        BindPose::from_bytes(&bytes),
        Err(Error::Format { offset: 0, .. })
    ));
}

#[test]
fn oversized_value_count_is_a_format_error() {
    let mut bytes = vec![0u8; 0x14];
    bytes[4..8].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
    match decode_animation(&bytes, 0) {
        Err(Error::Format { offset, message }) => {
            assert_eq!(offset, 0);
            assert!(message.contains("value table"), "{message}");
        }
        other => panic!("expected format error, got {other:?}"),
    }
}

#[test]
fn oversized_step_count_is_a_format_error() {
    let mut bytes = encode_animation(&hip_animation()).unwrap();
    let track = u32::from_le_bytes(bytes[0x14..0x18].try_into().unwrap()) as usize;
    bytes[track + 4..track + 6].copy_from_slice(&0xFFFFu16.to_le_bytes());
    assert!(matches!(decode_animation(&bytes, 0), Err(Error::Format { .. })));
}

#[test]
fn skeleton_fields_past_their_width_fail_to_encode() {
    let mut skeleton = limb_skeleton();
    skeleton.ik_entries[0].floats = vec![0.0; 0x1_0000];
    assert!(matches!(
        AnimationContainer::from_parts(skeleton, Vec::new()),
        Err(Error::Encode { .. })
    ));
}
