use crate::Skeleton;
use glam::Mat4;
use std::collections::HashMap;

/// Bone store of the consuming rig, keyed by bone name.
///
/// `basis` is the bone's pose relative to its rest matrix; `armature_matrix` is its pose in
/// rig space, used only for passthrough endpoints.
pub trait Rig {
    fn has_bone(&self, bone: &str) -> bool;

    fn rest_matrix(&self, bone: &str) -> Option<Mat4>;

    fn basis(&self, bone: &str) -> Option<Mat4>;

    /// Returns `false` when the rig has no such bone.
    fn set_basis(&mut self, bone: &str, basis: Mat4) -> bool;

    fn armature_matrix(&self, bone: &str) -> Option<Mat4>;

    fn set_armature_matrix(&mut self, bone: &str, matrix: Mat4) -> bool;

    /// The bone used in place of ancestors the rig does not carry.
    fn primary_bone(&self) -> Option<&str>;

    fn set_hidden(&mut self, bone: &str, hidden: bool) -> bool;
}

#[derive(Clone, Debug, PartialEq)]
pub struct PoseBone {
    pub name: String,
    pub rest: Mat4,
    pub basis: Mat4,
    pub armature: Mat4,
    pub hidden: bool,
}

/// In-memory [`Rig`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoseRig {
    bones: Vec<PoseBone>,
    index: HashMap<String, usize>,
}

impl PoseRig {
    pub fn new() -> Self {
        Self::default()
    }

    /// One bone per skeleton node, rest matrices taken from the composed rest pose.
    pub fn from_skeleton(skeleton: &Skeleton) -> Self {
        let mut rest_world = vec![Mat4::IDENTITY; skeleton.node_count()];
        for &id in skeleton.evaluation_order() {
            let node = &skeleton.nodes[id];
            rest_world[id] = match node.parent {
                Some(parent) => rest_world[parent] * node.matrix,
                None => node.matrix,
            };
        }

        let mut rig = Self::new();
        for (node, rest) in skeleton.nodes.iter().zip(rest_world) {
            rig.add_bone(node.name.clone(), rest);
        }
        rig
    }

    /// Adds (or resets) a bone at its rest pose.
    pub fn add_bone(&mut self, name: impl Into<String>, rest: Mat4) {
        let name = name.into();
        let bone = PoseBone {
            name: name.clone(),
            rest,
            basis: Mat4::IDENTITY,
            armature: rest,
            hidden: false,
        };
        match self.index.get(&name) {
            Some(&i) => self.bones[i] = bone,
            None => {
                self.index.insert(name, self.bones.len());
                self.bones.push(bone);
            }
        }
    }

    pub fn remove_bone(&mut self, name: &str) -> Option<PoseBone> {
        let i = self.index.remove(name)?;
        let bone = self.bones.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(bone)
    }

    pub fn bone(&self, name: &str) -> Option<&PoseBone> {
        self.index.get(name).map(|&i| &self.bones[i])
    }

    pub fn bones(&self) -> &[PoseBone] {
        &self.bones
    }

    fn bone_mut(&mut self, name: &str) -> Option<&mut PoseBone> {
        let i = *self.index.get(name)?;
        Some(&mut self.bones[i])
    }
}

impl Rig for PoseRig {
    fn has_bone(&self, bone: &str) -> bool {
        self.index.contains_key(bone)
    }

    fn rest_matrix(&self, bone: &str) -> Option<Mat4> {
        self.bone(bone).map(|b| b.rest)
    }

    fn basis(&self, bone: &str) -> Option<Mat4> {
        self.bone(bone).map(|b| b.basis)
    }

    fn set_basis(&mut self, bone: &str, basis: Mat4) -> bool {
        self.bone_mut(bone).map(|b| b.basis = basis).is_some()
    }

    fn armature_matrix(&self, bone: &str) -> Option<Mat4> {
        self.bone(bone).map(|b| b.armature)
    }

    fn set_armature_matrix(&mut self, bone: &str, matrix: Mat4) -> bool {
        self.bone_mut(bone).map(|b| b.armature = matrix).is_some()
    }

    fn primary_bone(&self) -> Option<&str> {
        self.bones.first().map(|b| b.name.as_str())
    }

    fn set_hidden(&mut self, bone: &str, hidden: bool) -> bool {
        self.bone_mut(bone).map(|b| b.hidden = hidden).is_some()
    }
}
