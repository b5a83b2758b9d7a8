use crate::geometry::{any_orthonormal, to_engine_space, to_rig_space};
use crate::runtime::{FrameEvaluation, Rig};
use crate::{LimbIk, Node, Skeleton, Warning};
use glam::{Mat4, Quat, Vec3};

const EPSILON: f32 = 1.0e-6;

/// Engine-space result of one solved limb.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LimbSolution {
    pub upper: usize,
    pub lower: usize,
    /// Upper joint position.
    pub origin: Vec3,
    /// Solved lower joint position.
    pub joint: Vec3,
    pub target: Vec3,
    pub upper_world: Mat4,
    pub lower_world: Mat4,
}

/// Engine-space local matrix of ancestor `id`, read back from the rig.
///
/// Ancestors the rig does not carry use the rig's primary bone. Inert ancestors were never
/// written to the rig and keep their rest matrix.
fn ancestor_engine_local<R: Rig + ?Sized>(
    skeleton: &Skeleton,
    evaluation: &FrameEvaluation,
    rig: &R,
    id: usize,
) -> Mat4 {
    let node = &skeleton.nodes[id];
    if !node.is_animated() {
        return evaluation.nodes[id].local;
    }
    let bone = if rig.has_bone(&node.name) {
        Some(node.name.as_str())
    } else {
        rig.primary_bone()
    };
    let Some(bone) = bone else {
        return Mat4::IDENTITY;
    };
    let basis = rig.basis(bone).unwrap_or(Mat4::IDENTITY);
    let rest = rig.rest_matrix(bone).unwrap_or(Mat4::IDENTITY);
    to_engine_space(
        basis,
        rest,
        node.bind_matrix(),
        skeleton.parent_bind_inverse(id),
    )
}

/// Roll reference of a joint: the rotation part of its `pre_matrix`.
fn roll_reference(node: &Node) -> Quat {
    let (_, rotation, _) = node.pre_matrix.to_scale_rotation_translation();
    if rotation.is_finite() {
        rotation.normalize()
    } else {
        Quat::IDENTITY
    }
}

/// Rotation carrying the local `child` offset onto `segment`, rolled about the segment until
/// the rolled local Z axis lies on `plane`.
///
/// `segment` and `plane` are unit length and perpendicular.
fn orient(child: Vec3, roll: Quat, segment: Vec3, plane: Vec3) -> Quat {
    let child = child.normalize_or(Vec3::X);
    let reference = roll * Vec3::Z;
    let mut normal = reference - child * reference.dot(child);
    normal = if normal.length_squared() <= EPSILON {
        any_orthonormal(child)
    } else {
        normal.normalize()
    };

    let swing = Quat::from_rotation_arc(child, segment);
    let swung = (swing * normal).normalize();
    let twist = segment.dot(swung.cross(plane)).atan2(swung.dot(plane));
    Quat::from_axis_angle(segment, twist) * swing
}

fn solve_limb<R: Rig + ?Sized>(
    skeleton: &Skeleton,
    evaluation: &mut FrameEvaluation,
    rig: &mut R,
    limb: LimbIk,
) -> LimbSolution {
    let upper = &skeleton.nodes[limb.upper];

    let parent_world = match upper.parent {
        Some(parent) => skeleton
            .ancestor_chain(parent)
            .into_iter()
            .fold(Mat4::IDENTITY, |acc, id| {
                acc * ancestor_engine_local(skeleton, &*evaluation, &*rig, id)
            }),
        None => Mat4::IDENTITY,
    };

    let upper_local = evaluation.nodes[limb.upper].local;
    let origin = parent_world.transform_point3(upper_local.w_axis.truncate());
    let target = evaluation.nodes[limb.effector].world_position();
    let pole = evaluation.nodes[limb.pole].world_position();
    let l1 = skeleton.nodes[limb.lower].translation.length();
    let l2 = skeleton.nodes[limb.end].translation.length();
    let reach = l1 + l2;

    let to_target = target - origin;
    let distance = to_target.length();
    let degenerate = distance < EPSILON || distance > reach || distance < (l1 - l2).abs();
    if degenerate {
        log::warn!(
            "IK limb at '{}' clamped (target distance {distance}, reach {reach})",
            upper.name
        );
        evaluation.warnings.push(Warning::IkDegenerate {
            upper: upper.name.clone(),
            distance,
            reach,
        });
    }

    let dir = if distance < EPSILON {
        let current = evaluation.nodes[limb.lower].world_position() - origin;
        current.normalize_or(Vec3::X)
    } else {
        to_target / distance
    };

    let to_pole = pole - origin;
    let mut bend = to_pole - dir * to_pole.dot(dir);
    bend = if bend.length_squared() <= EPSILON {
        any_orthonormal(dir)
    } else {
        bend.normalize()
    };
    if limb.flip_bend {
        bend = -bend;
    }

    let denom = 2.0 * l1 * distance;
    let cos_a = if denom <= EPSILON {
        1.0
    } else {
        ((l1 * l1 + distance * distance - l2 * l2) / denom).clamp(-1.0, 1.0)
    };
    let sin_a = (1.0 - cos_a * cos_a).max(0.0).sqrt();
    let joint = origin + (dir * cos_a + bend * sin_a) * l1;
    let upper_axis = (joint - origin).normalize_or(dir);
    let lower_axis = (target - joint).normalize_or(dir);
    let plane = dir.cross(bend);

    // Each joint keeps its evaluated scale and turns its rest child offset onto its segment.
    let lower = &skeleton.nodes[limb.lower];
    let (upper_scale, _, _) = upper_local.to_scale_rotation_translation();
    let (lower_scale, _, _) = evaluation.nodes[limb.lower]
        .local
        .to_scale_rotation_translation();
    let upper_rotation = orient(
        upper_scale * lower.translation,
        roll_reference(upper),
        upper_axis,
        plane,
    );
    let lower_rotation = orient(
        lower_scale * skeleton.nodes[limb.end].translation,
        roll_reference(lower),
        lower_axis,
        plane,
    );
    let upper_world = Mat4::from_scale_rotation_translation(upper_scale, upper_rotation, origin);
    let lower_world = Mat4::from_scale_rotation_translation(lower_scale, lower_rotation, joint);

    let upper_local = parent_world.inverse() * upper_world;
    let lower_local = upper_world.inverse() * lower_world;
    for (id, local, world) in [
        (limb.upper, upper_local, upper_world),
        (limb.lower, lower_local, lower_world),
    ] {
        let node = &skeleton.nodes[id];
        let pose = &mut evaluation.nodes[id];
        pose.local = local;
        pose.world = world;
        if !rig.has_bone(&node.name) {
            pose.output = None;
            continue;
        }
        let rest = rig.rest_matrix(&node.name).unwrap_or(Mat4::IDENTITY);
        let basis = to_rig_space(local, rest, node.bind_matrix(), skeleton.parent_bind_inverse(id));
        rig.set_basis(&node.name, basis);
        pose.output = Some(basis);
    }

    LimbSolution {
        upper: limb.upper,
        lower: limb.lower,
        origin,
        joint,
        target,
        upper_world,
        lower_world,
    }
}

/// Solves every two-bone limb entry over an already evaluated frame.
///
/// The solved upper and lower joints overwrite the evaluator's output for that frame.
pub fn solve_limbs<R: Rig + ?Sized>(
    skeleton: &Skeleton,
    evaluation: &mut FrameEvaluation,
    rig: &mut R,
) -> Vec<LimbSolution> {
    let mut solutions = Vec::new();
    for limb in skeleton.ik_entries.iter().filter_map(|entry| entry.limb()) {
        solutions.push(solve_limb(skeleton, evaluation, rig, limb));
    }
    solutions
}
