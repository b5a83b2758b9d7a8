use crate::{Error, Warning};
use glam::{Mat4, Quat, Vec3};
use std::collections::HashMap;

/// Index of the effector (target) node inside a two-bone limb IK entry.
pub const LIMB_SLOT_EFFECTOR: usize = 0;
/// Index of the upper joint (hip/shoulder).
pub const LIMB_SLOT_UPPER: usize = 1;
/// Index of the lower joint (knee/elbow).
pub const LIMB_SLOT_LOWER: usize = 2;
/// Index of the pole (up) node.
pub const LIMB_SLOT_POLE: usize = 3;
/// Index of the end node (foot/hand); its rest offset is the lower segment.
pub const LIMB_SLOT_END: usize = 4;

pub const TRACK_AXIS_MASK: u8 = 0x03;
pub const TRACK_ABSOLUTE: u8 = 0x10;
pub const TRACK_WIDE_STEPS: u8 = 0x20;
pub const TRACK_WIDE_INDICES: u8 = 0x40;

/// Per-node channel summary derived from the active animation.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelFlags {
    pub animated: bool,
    pub absolute_translation: bool,
    pub absolute_rotation: bool,
    pub absolute_scale: bool,
}

impl ChannelFlags {
    pub fn is_absolute(&self, transform: TransformType) -> bool {
        match transform {
            TransformType::Translation => self.absolute_translation,
            TransformType::RotationEuler => self.absolute_rotation,
            TransformType::Scale => self.absolute_scale,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: usize,
    pub name: String,
    pub parent: Option<usize>,
    /// Zero marks an inert node: never animated, never composed.
    pub bit_flag: u16,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Rest-local matrix, `T * R * S` of the fields above.
    pub matrix: Mat4,
    /// IK reference frame carried by limb joints.
    pub pre_matrix: Mat4,
    /// Skin bind pose, populated once a bind-pose container is bound.
    pub sbp_matrix: Option<Mat4>,
    /// Final pose is taken straight from world space (IK effector/pole).
    pub passthrough: bool,
    pub channels: ChannelFlags,
}

impl Node {
    pub fn new(id: usize, name: impl Into<String>, parent: Option<usize>, matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            id,
            name: name.into(),
            parent,
            bit_flag: 1,
            translation,
            rotation,
            scale,
            matrix,
            pre_matrix: Mat4::IDENTITY,
            sbp_matrix: None,
            passthrough: false,
            channels: ChannelFlags::default(),
        }
    }

    pub fn is_animated(&self) -> bool {
        self.bit_flag != 0
    }

    pub fn bind_matrix(&self) -> Mat4 {
        self.sbp_matrix.unwrap_or(Mat4::IDENTITY)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IkEntry {
    pub method: u8,
    pub solver_flags: u8,
    pub variant_flags: u8,
    pub node_ids: Vec<u16>,
    pub floats: Vec<f32>,
}

/// Node indices of a resolved two-bone limb entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LimbIk {
    pub effector: usize,
    pub upper: usize,
    pub lower: usize,
    pub pole: usize,
    pub end: usize,
    pub flip_bend: bool,
}

impl IkEntry {
    pub fn is_two_bone_limb(&self) -> bool {
        self.method == 0 && self.solver_flags == 0x02 && self.node_ids.len() >= 5
    }

    pub fn limb(&self) -> Option<LimbIk> {
        if !self.is_two_bone_limb() {
            return None;
        }
        let slot = |i: usize| self.node_ids[i] as usize;
        Some(LimbIk {
            effector: slot(LIMB_SLOT_EFFECTOR),
            upper: slot(LIMB_SLOT_UPPER),
            lower: slot(LIMB_SLOT_LOWER),
            pole: slot(LIMB_SLOT_POLE),
            end: slot(LIMB_SLOT_END),
            flip_bend: (self.variant_flags & 0x01) != 0,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Skeleton {
    pub nodes: Vec<Node>,
    pub ik_entries: Vec<IkEntry>,
    order: Vec<usize>,
    name_index: HashMap<String, usize>,
}

impl Skeleton {
    /// Validates the hierarchy and tags IK endpoints.
    ///
    /// Parents must reference existing nodes and form a forest. When every parent precedes its
    /// child the evaluation order is plain ID order; otherwise a topological order is derived.
    pub fn new(nodes: Vec<Node>, ik_entries: Vec<IkEntry>) -> Result<Self, Error> {
        let order = evaluation_order(&nodes)?;
        let name_index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), i))
            .collect();
        let mut skeleton = Self {
            nodes,
            ik_entries,
            order,
            name_index,
        };
        skeleton.mark_passthrough_endpoints()?;
        Ok(skeleton)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, name: &str) -> Option<(usize, &Node)> {
        let index = *self.name_index.get(name)?;
        Some((index, &self.nodes[index]))
    }

    /// Parents-first traversal order.
    pub fn evaluation_order(&self) -> &[usize] {
        &self.order
    }

    /// Ancestors of `id` (inclusive), oldest first.
    pub fn ancestor_chain(&self, id: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(index) = cursor {
            if index >= self.nodes.len() || chain.len() > self.nodes.len() {
                break;
            }
            chain.push(index);
            cursor = self.nodes[index].parent;
        }
        chain.reverse();
        chain
    }

    /// Inverted bind matrix of `id`'s parent, or identity for roots.
    pub fn parent_bind_inverse(&self, id: usize) -> Mat4 {
        self.nodes
            .get(id)
            .and_then(|n| n.parent)
            .and_then(|p| self.nodes.get(p))
            .map(|p| p.bind_matrix().inverse())
            .unwrap_or(Mat4::IDENTITY)
    }

    fn mark_passthrough_endpoints(&mut self) -> Result<(), Error> {
        for entry in &self.ik_entries {
            if !entry.is_two_bone_limb() {
                continue;
            }
            for &id in &entry.node_ids {
                if id as usize >= self.nodes.len() {
                    return Err(Error::InvalidValue {
                        message: format!(
                            "IK entry references node {id} but the skeleton has {} nodes",
                            self.nodes.len()
                        ),
                    });
                }
            }
            for slot in [LIMB_SLOT_EFFECTOR, LIMB_SLOT_POLE] {
                let id = entry.node_ids[slot] as usize;
                self.nodes[id].passthrough = true;
            }
        }
        Ok(())
    }

    /// Copies bind matrices in by exact name match.
    ///
    /// Skeleton nodes without a counterpart keep their current (identity when unset) bind
    /// matrix. Bind-pose nodes without a skeleton counterpart are reported.
    pub fn bind_pose(&mut self, bind: &BindPose) -> BindReport {
        let mut report = BindReport::default();
        for (name, matrix) in &bind.nodes {
            match self.name_index.get(name) {
                Some(&index) => {
                    self.nodes[index].sbp_matrix = Some(*matrix);
                    report.matched += 1;
                }
                None => {
                    log::warn!("bind-pose node '{name}' has no matching skeleton node");
                    report.warnings.push(Warning::UnmatchedBindNode { node: name.clone() });
                }
            }
        }
        report
    }

    /// Resets and re-derives per-node channel flags from `animation`'s tracks.
    pub fn apply_channel_flags(&mut self, animation: Option<&Animation>) {
        for node in &mut self.nodes {
            node.channels = ChannelFlags::default();
        }
        let Some(animation) = animation else {
            return;
        };
        for track in &animation.tracks {
            let Some(node) = self.nodes.get_mut(track.bone_id as usize) else {
                continue;
            };
            node.channels.animated = true;
            if track.is_absolute() {
                match track.transform_type {
                    TransformType::Translation => node.channels.absolute_translation = true,
                    TransformType::RotationEuler => node.channels.absolute_rotation = true,
                    TransformType::Scale => node.channels.absolute_scale = true,
                }
            }
        }
    }
}

fn evaluation_order(nodes: &[Node]) -> Result<Vec<usize>, Error> {
    for (i, node) in nodes.iter().enumerate() {
        if let Some(parent) = node.parent {
            if parent >= nodes.len() {
                return Err(Error::InvalidValue {
                    message: format!(
                        "node '{}' references parent {parent} (len={})",
                        node.name,
                        nodes.len()
                    ),
                });
            }
            if parent == i {
                return Err(Error::InvalidValue {
                    message: format!("node '{}' is its own parent", node.name),
                });
            }
        }
    }

    if nodes
        .iter()
        .enumerate()
        .all(|(i, n)| n.parent.is_none_or(|p| p < i))
    {
        return Ok((0..nodes.len()).collect());
    }

    // 0 = unvisited, 1 = on stack, 2 = done.
    let mut state = vec![0u8; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    for start in 0..nodes.len() {
        let mut path = Vec::new();
        let mut cursor = Some(start);
        while let Some(index) = cursor {
            match state[index] {
                2 => break,
                1 => {
                    return Err(Error::InvalidValue {
                        message: format!("node hierarchy has a cycle through '{}'", nodes[index].name),
                    });
                }
                _ => {
                    state[index] = 1;
                    path.push(index);
                    cursor = nodes[index].parent;
                }
            }
        }
        for &index in path.iter().rev() {
            state[index] = 2;
            order.push(index);
        }
    }
    Ok(order)
}

/// Outcome of binding a bind-pose container into a skeleton.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BindReport {
    pub matched: usize,
    pub warnings: Vec<Warning>,
}

/// Decoded bind-pose container: per-node skin bind-pose matrices keyed by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BindPose {
    pub nodes: Vec<(String, Mat4)>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransformType {
    Translation,
    RotationEuler,
    Scale,
}

impl TransformType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Translation),
            1 => Some(Self::RotationEuler),
            2 => Some(Self::Scale),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Translation => 0,
            Self::RotationEuler => 1,
            Self::Scale => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CmdTrack {
    pub bone_id: u16,
    pub transform_type: TransformType,
    pub bit_flag: u8,
    /// Strictly increasing frame numbers.
    pub steps: Vec<u16>,
    pub value_indices: Vec<u32>,
    /// `None` when the step carries no outgoing tangent.
    pub tangent_indices: Vec<Option<u32>>,
}

impl CmdTrack {
    pub fn axis(&self) -> usize {
        (self.bit_flag & TRACK_AXIS_MASK) as usize
    }

    pub fn is_absolute(&self) -> bool {
        (self.bit_flag & TRACK_ABSOLUTE) != 0
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Animation {
    pub name: String,
    /// Frame count.
    pub duration: u16,
    pub tracks: Vec<CmdTrack>,
    /// Value pool shared by every track.
    pub values: Vec<f32>,
    pub reserved: u32,
}

impl Animation {
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }
}

/// A decoded animation container.
///
/// The skeleton block is kept verbatim so saving never regenerates it.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationContainer {
    pub skeleton: Skeleton,
    pub animations: Vec<Animation>,
    pub(crate) header: ContainerHeader,
    pub(crate) skeleton_block: Vec<u8>,
}

impl AnimationContainer {
    pub fn animation(&self, name: &str) -> Option<(usize, &Animation)> {
        self.animations
            .iter()
            .enumerate()
            .find(|(_, a)| a.name == name)
    }
}

/// Header words the codec carries through unchanged.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ContainerHeader {
    pub version: u16,
    pub kind: u16,
    pub reserved_word: u16,
    pub reserved: [u8; 12],
}
