use crate::curve::CurveSet;
use crate::geometry::{quat_from_euler, round_scale, to_rig_space};
use crate::runtime::Rig;
use crate::{Node, Skeleton, TransformType, Warning};
use glam::{Mat4, Quat, Vec3};

/// Per-node state of one evaluated frame (engine convention).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NodePose {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub world: Mat4,
    /// `parent_world⁻¹ · world`, or `world` for roots.
    pub local: Mat4,
    /// Matrix handed to the rig: a basis, or an armature matrix for passthrough nodes.
    pub output: Option<Mat4>,
}

impl NodePose {
    fn rest(node: &Node) -> Self {
        Self {
            translation: node.translation,
            rotation: node.rotation,
            scale: node.scale,
            world: node.matrix,
            local: node.matrix,
            output: None,
        }
    }

    pub fn world_position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameEvaluation {
    pub frame: f32,
    /// Indexed by node ID.
    pub nodes: Vec<NodePose>,
    pub warnings: Vec<Warning>,
}

impl FrameEvaluation {
    pub fn node(&self, id: usize) -> Option<&NodePose> {
        self.nodes.get(id)
    }
}

/// Local (pre-composition) TRS of one node at `frame`.
fn sample_node(node: &Node, curves: &CurveSet, frame: f32) -> (Vec3, Quat, Vec3) {
    let mut translation = node.translation;
    let mut scale = node.scale;
    let mut euler = Vec3::ZERO;
    let mut rotated = false;

    for curve in curves.curves_for(&node.name) {
        let Some(value) = curve.evaluate(frame) else {
            continue;
        };
        if curve.axis > 2 {
            continue;
        }
        match curve.channel {
            TransformType::Translation => translation[curve.axis] = value,
            TransformType::Scale => scale[curve.axis] = value,
            TransformType::RotationEuler => {
                euler[curve.axis] = value;
                rotated = true;
            }
        }
    }

    let rotation = if rotated {
        quat_from_euler(euler)
    } else {
        node.rotation
    };
    (translation, rotation, scale)
}

/// Evaluates every node at `frame` and writes the resulting poses into `rig`.
///
/// Inert nodes (`bit_flag == 0`) keep their rest state and are never written. Nodes the rig
/// does not carry are still composed (their children depend on them) but are not written.
pub fn evaluate_frame<R: Rig + ?Sized>(
    skeleton: &Skeleton,
    curves: &CurveSet,
    rig: &mut R,
    frame: f32,
) -> FrameEvaluation {
    let mut poses: Vec<NodePose> = skeleton.nodes.iter().map(NodePose::rest).collect();

    for &id in skeleton.evaluation_order() {
        let node = &skeleton.nodes[id];
        if !node.is_animated() {
            continue;
        }

        let (mut translation, mut rotation, mut scale) = sample_node(node, curves, frame);
        let parent = node.parent.map(|p| poses[p]);
        if let Some(parent) = &parent {
            let channels = node.channels;
            if !channels.absolute_translation {
                translation = parent.world.transform_point3(translation);
            }
            if !channels.absolute_rotation {
                rotation = parent.rotation * rotation;
            }
            if !channels.absolute_scale {
                scale *= round_scale(parent.scale);
            }
        }

        let world = Mat4::from_scale_rotation_translation(scale, rotation, translation);
        let local = match &parent {
            Some(parent) => parent.world.inverse() * world,
            None => world,
        };
        poses[id] = NodePose {
            translation,
            rotation,
            scale,
            world,
            local,
            output: None,
        };
    }

    let mut warnings = Vec::new();
    for &id in skeleton.evaluation_order() {
        let node = &skeleton.nodes[id];
        if !node.is_animated() {
            continue;
        }
        if !rig.has_bone(&node.name) {
            log::debug!("node '{}' has no matching rig bone; skipped", node.name);
            warnings.push(Warning::UnboundNode {
                node: node.name.clone(),
            });
            continue;
        }

        let pose = &mut poses[id];
        if node.passthrough {
            rig.set_armature_matrix(&node.name, pose.world);
            pose.output = Some(pose.world);
        } else {
            let rest = rig.rest_matrix(&node.name).unwrap_or(Mat4::IDENTITY);
            let basis = to_rig_space(
                pose.local,
                rest,
                node.bind_matrix(),
                skeleton.parent_bind_inverse(id),
            );
            rig.set_basis(&node.name, basis);
            pose.output = Some(basis);
        }
    }

    FrameEvaluation {
        frame,
        nodes: poses,
        warnings,
    }
}
