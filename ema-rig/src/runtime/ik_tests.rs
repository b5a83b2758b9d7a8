use crate::curve::{CurveSet, FCurve, Keyframe};
use crate::runtime::{PoseRig, Rig, evaluate_frame, solve_limbs};
use crate::{IkEntry, Node, Skeleton, TransformType, Warning};
use glam::{Mat4, Quat, Vec3};

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn node(id: usize, name: &str, parent: Option<usize>, offset: [f32; 3]) -> Node {
    Node::new(id, name, parent, Mat4::from_translation(Vec3::from(offset)))
}

/// Root, a two-segment leg of unit segments hanging from `Hip`, plus effector and pole nodes.
fn leg(effector: [f32; 3], variant_flags: u8) -> Skeleton {
    let nodes = vec![
        node(0, "Root", None, [0.0, 0.0, 0.0]),
        node(1, "Hip", Some(0), [0.0, 2.0, 0.0]),
        node(2, "Knee", Some(1), [0.0, -1.0, 0.0]),
        node(3, "Foot", Some(2), [0.0, -1.0, 0.0]),
        node(4, "FootEff", Some(0), effector),
        node(5, "KneePole", Some(0), [0.0, 1.0, 3.0]),
    ];
    let ik = IkEntry {
        method: 0,
        solver_flags: 0x02,
        variant_flags,
        node_ids: vec![4, 1, 2, 5, 3],
        floats: Vec::new(),
    };
    Skeleton::new(nodes, vec![ik]).unwrap()
}

#[test]
fn reachable_target_closes_the_triangle() {
    let skeleton = leg([0.5, 0.5, 0.0], 0);
    let mut rig = PoseRig::from_skeleton(&skeleton);
    let mut evaluation = evaluate_frame(&skeleton, &CurveSet::new(), &mut rig, 0.0);
    let solutions = solve_limbs(&skeleton, &mut evaluation, &mut rig);

    assert_eq!(solutions.len(), 1);
    let s = solutions[0];
    assert_eq!((s.upper, s.lower), (1, 2));
    assert_approx(s.origin.distance(Vec3::new(0.0, 2.0, 0.0)), 0.0);
    assert_approx((s.joint - s.origin).length(), 1.0);
    assert_approx((s.target - s.joint).length(), 1.0);
    assert!(evaluation.warnings.is_empty());

    // Rest offsets composed onto the solved frames land on the joint and the target.
    let knee = s.upper_world.transform_point3(skeleton.nodes[2].translation);
    assert_approx(knee.distance(s.joint), 0.0);
    assert_approx(s.lower_world.w_axis.truncate().distance(s.joint), 0.0);
    let foot = (s.lower_world * skeleton.nodes[3].matrix).w_axis.truncate();
    assert_approx(foot.distance(s.target), 0.0);
}

#[test]
fn pre_matrix_only_rolls_the_joint() {
    let solve = |pre_matrix: Mat4| {
        let mut skeleton = leg([0.5, 0.5, 0.0], 0);
        skeleton.nodes[2].pre_matrix = pre_matrix;
        let mut rig = PoseRig::from_skeleton(&skeleton);
        let mut evaluation = evaluate_frame(&skeleton, &CurveSet::new(), &mut rig, 0.0);
        let s = solve_limbs(&skeleton, &mut evaluation, &mut rig)[0];
        (s, skeleton.nodes[3].matrix)
    };

    let (plain, foot_rest) = solve(Mat4::IDENTITY);
    let roll = Quat::from_rotation_y(0.7);
    let (rolled, _) = solve(Mat4::from_scale_rotation_translation(
        Vec3::splat(3.0),
        roll,
        Vec3::splat(5.0),
    ));

    assert_approx(rolled.joint.distance(plain.joint), 0.0);
    let foot = (rolled.lower_world * foot_rest).w_axis.truncate();
    assert_approx(foot.distance(rolled.target), 0.0);
    assert_approx(rolled.lower_world.w_axis.truncate().distance(plain.joint), 0.0);

    // The rolled reference axis takes the place of the plain frame's Z axis.
    let rolled_z = rolled.lower_world.transform_vector3(roll * Vec3::Z);
    let plain_z = plain.lower_world.transform_vector3(Vec3::Z);
    assert_approx(rolled_z.distance(plain_z), 0.0);
    assert!(rolled.lower_world.transform_vector3(Vec3::Z).distance(plain_z) > 0.1);
}

#[test]
fn bend_follows_pole_and_variant_flag_flips_it() {
    let target = [0.0, 0.5, 0.0];
    let solve = |flags: u8| {
        let skeleton = leg(target, flags);
        let mut rig = PoseRig::from_skeleton(&skeleton);
        let mut evaluation = evaluate_frame(&skeleton, &CurveSet::new(), &mut rig, 0.0);
        solve_limbs(&skeleton, &mut evaluation, &mut rig)[0]
    };

    let toward = solve(0);
    let away = solve(1);
    assert!(toward.joint.z > 0.0, "joint {:?}", toward.joint);
    assert!(away.joint.z < 0.0, "joint {:?}", away.joint);
    assert_approx(toward.joint.y, away.joint.y);
    assert_approx((away.target - away.joint).length(), 1.0);
}

#[test]
fn solved_joints_overwrite_rig_output() {
    let skeleton = leg([0.5, 0.5, 0.0], 0);
    let mut rig = PoseRig::from_skeleton(&skeleton);
    let mut evaluation = evaluate_frame(&skeleton, &CurveSet::new(), &mut rig, 0.0);
    let before = rig.basis("Knee");
    let solution = solve_limbs(&skeleton, &mut evaluation, &mut rig)[0];

    assert_ne!(rig.basis("Knee"), before);
    assert_eq!(evaluation.nodes[2].output, rig.basis("Knee"));
    assert_eq!(evaluation.nodes[1].world, solution.upper_world);
    let knee_local = evaluation.nodes[2].local;
    let composed = solution.upper_world * knee_local;
    assert_approx(composed.w_axis.truncate().distance(solution.joint), 0.0);
}

#[test]
fn overextended_target_clamps_without_nan() {
    let skeleton = leg([0.0, -5.0, 0.0], 0);
    let mut rig = PoseRig::from_skeleton(&skeleton);
    let mut evaluation = evaluate_frame(&skeleton, &CurveSet::new(), &mut rig, 0.0);
    let s = solve_limbs(&skeleton, &mut evaluation, &mut rig)[0];

    assert!(s.joint.is_finite());
    assert!(s.upper_world.is_finite() && s.lower_world.is_finite());
    assert_approx(s.joint.distance(Vec3::new(0.0, 1.0, 0.0)), 0.0);
    assert!(matches!(
        evaluation.warnings.as_slice(),
        [Warning::IkDegenerate { upper, reach, .. }] if upper == "Hip" && *reach == 2.0
    ));
}

#[test]
fn coincident_target_keeps_direction_without_nan() {
    let skeleton = leg([0.0, 2.0, 0.0], 0);
    let mut rig = PoseRig::from_skeleton(&skeleton);
    let mut evaluation = evaluate_frame(&skeleton, &CurveSet::new(), &mut rig, 0.0);
    let s = solve_limbs(&skeleton, &mut evaluation, &mut rig)[0];

    assert!(s.joint.is_finite());
    assert!(evaluation.nodes.iter().all(|n| n.world.is_finite()));
    assert_approx((s.joint - s.origin).length(), 1.0);
    assert_eq!(evaluation.warnings.len(), 1);
}

#[test]
fn animated_effector_drives_the_solve() {
    let skeleton = leg([0.0, 0.0, 0.0], 0);
    let mut rig = PoseRig::from_skeleton(&skeleton);
    let mut curves = CurveSet::new();
    for (axis, value) in [(0, 0.5), (1, 0.5)] {
        let mut curve = FCurve::new("FootEff", TransformType::Translation, axis);
        curve.keyframes.push(Keyframe::new(0.0, value));
        curves.push(curve);
    }

    let mut evaluation = evaluate_frame(&skeleton, &curves, &mut rig, 0.0);
    let s = solve_limbs(&skeleton, &mut evaluation, &mut rig)[0];
    assert_approx(s.target.distance(Vec3::new(0.5, 0.5, 0.0)), 0.0);
    assert_approx((s.target - s.joint).length(), 1.0);
    let foot = s.lower_world.transform_point3(skeleton.nodes[3].translation);
    assert_approx(foot.distance(s.target), 0.0);
}

#[test]
fn other_methods_are_skipped() {
    let mut skeleton = leg([0.5, 0.5, 0.0], 0);
    skeleton.ik_entries[0].solver_flags = 0x01;
    let mut rig = PoseRig::from_skeleton(&skeleton);
    let mut evaluation = evaluate_frame(&skeleton, &CurveSet::new(), &mut rig, 0.0);
    assert!(solve_limbs(&skeleton, &mut evaluation, &mut rig).is_empty());
}
