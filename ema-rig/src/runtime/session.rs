use crate::curve::CurveSet;
use crate::geometry::{euler_from_quat, to_engine_space};
use crate::runtime::{FrameEvaluation, LimbSolution, Rig, evaluate_frame, solve_limbs};
use crate::tangent;
use crate::{AnimationContainer, BindPose, BindReport, Config, Error, TransformType, Warning};
use glam::Vec3;
use std::collections::HashMap;
#[cfg(feature = "binary")]
use std::path::Path;

/// Loaded state of one rig.
#[derive(Clone, Debug)]
struct RigState {
    container: AnimationContainer,
    bind_pose: Option<BindPose>,
    last_action: Option<String>,
}

/// Playback range reported when the active action changes.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionInfo {
    pub animation: String,
    pub frame_start: u32,
    pub frame_end: u32,
    pub frame_rate: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// `None` when no animation matched the action.
    pub evaluation: Option<FrameEvaluation>,
    pub limbs: Vec<LimbSolution>,
    pub warnings: Vec<Warning>,
}

/// Where exported curves are written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveTarget {
    /// Replace the animation with this name (appended if missing).
    Animation(String),
    /// Append an animation named after [`Config::new_animation_name`].
    New,
}

/// Engine-space sample captured by [`Session::insert_sample`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct KeyedSample {
    pub translation: Vec3,
    /// Radians.
    pub rotation: Vec3,
    pub scale: Vec3,
    pub keys_written: usize,
}

/// Caller-owned registry of loaded rigs.
#[derive(Clone, Debug, Default)]
pub struct Session {
    config: Config,
    rigs: HashMap<String, RigState>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            rigs: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn container(&self, rig: &str) -> Option<&AnimationContainer> {
        self.rigs.get(rig).map(|s| &s.container)
    }

    pub fn container_mut(&mut self, rig: &str) -> Option<&mut AnimationContainer> {
        self.rigs.get_mut(rig).map(|s| &mut s.container)
    }

    pub fn bind_pose(&self, rig: &str) -> Option<&BindPose> {
        self.rigs.get(rig).and_then(|s| s.bind_pose.as_ref())
    }

    fn state(&self, rig: &str) -> Result<&RigState, Error> {
        self.rigs.get(rig).ok_or_else(|| Error::UnknownRig {
            rig: rig.to_string(),
        })
    }

    fn state_mut(&mut self, rig: &str) -> Result<&mut RigState, Error> {
        self.rigs.get_mut(rig).ok_or_else(|| Error::UnknownRig {
            rig: rig.to_string(),
        })
    }

    /// Registers `container` for `rig`, dropping any previous state (bind pose included).
    pub fn insert_container(&mut self, rig: &str, container: AnimationContainer) -> &AnimationContainer {
        let state = RigState {
            container,
            bind_pose: None,
            last_action: None,
        };
        let slot = self.rigs.entry(rig.to_string()).insert_entry(state);
        &slot.into_mut().container
    }

    #[cfg(feature = "binary")]
    pub fn load_animation_container(
        &mut self,
        rig: &str,
        path: impl AsRef<Path>,
    ) -> Result<&AnimationContainer, Error> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let container = AnimationContainer::from_bytes(&bytes)?;
        log::debug!(
            "loaded '{}' for rig '{rig}': {} nodes, {} animations",
            path.display(),
            container.skeleton.node_count(),
            container.animations.len()
        );
        Ok(self.insert_container(rig, container))
    }

    #[cfg(feature = "binary")]
    pub fn load_bind_pose_container(
        &mut self,
        rig: &str,
        path: impl AsRef<Path>,
    ) -> Result<BindReport, Error> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let bind = BindPose::from_bytes(&bytes)?;
        self.apply_bind_pose(rig, bind)
    }

    /// Binds bind matrices into the rig's skeleton by node name.
    pub fn apply_bind_pose(&mut self, rig: &str, bind: BindPose) -> Result<BindReport, Error> {
        let state = self.state_mut(rig)?;
        let report = state.container.skeleton.bind_pose(&bind);
        state.bind_pose = Some(bind);
        Ok(report)
    }

    /// Re-derives per-node channel flags for `action`.
    ///
    /// Returns `None` (and logs) when no animation carries that name.
    pub fn on_action_changed(&mut self, rig: &str, action: &str) -> Result<Option<ActionInfo>, Error> {
        let frame_rate = self.config.frame_rate;
        let state = self.state_mut(rig)?;
        state.last_action = Some(action.to_string());

        let container = &mut state.container;
        let animation = container.animations.iter().find(|a| a.name == action);
        container.skeleton.apply_channel_flags(animation);
        let Some(animation) = animation else {
            log::warn!("rig '{rig}': no animation matches action '{action}'");
            return Ok(None);
        };

        Ok(Some(ActionInfo {
            animation: animation.name.clone(),
            frame_start: 0,
            frame_end: (animation.duration as u32).saturating_sub(1),
            frame_rate,
        }))
    }

    /// Evaluates `frame` of `action` into `target`, then solves IK.
    pub fn tick<R: Rig + ?Sized>(
        &mut self,
        rig: &str,
        target: &mut R,
        action: &str,
        curves: &CurveSet,
        frame: f32,
    ) -> Result<FrameReport, Error> {
        if self.state(rig)?.last_action.as_deref() != Some(action) {
            self.on_action_changed(rig, action)?;
        }

        let solve_ik = self.config.solve_ik;
        let state = self.state(rig)?;
        if state.container.animation(action).is_none() {
            return Ok(FrameReport {
                warnings: vec![Warning::MissingAnimation {
                    action: action.to_string(),
                }],
                ..FrameReport::default()
            });
        }

        let skeleton = &state.container.skeleton;
        let mut evaluation = evaluate_frame(skeleton, curves, target, frame);
        let limbs = if solve_ik {
            solve_limbs(skeleton, &mut evaluation, target)
        } else {
            Vec::new()
        };
        let warnings = evaluation.warnings.clone();
        Ok(FrameReport {
            evaluation: Some(evaluation),
            limbs,
            warnings,
        })
    }

    pub fn import_curves(&self, rig: &str, animation: &str) -> Result<CurveSet, Error> {
        let container = &self.state(rig)?.container;
        let (_, animation) = container
            .animation(animation)
            .ok_or_else(|| Error::UnknownAnimation {
                name: animation.to_string(),
            })?;
        tangent::import_curves(&container.skeleton, animation)
    }

    /// Rebuilds one animation from `curves` and stores it in the rig's container.
    ///
    /// Returns the index of the written animation.
    pub fn export_curves(
        &mut self,
        rig: &str,
        curves: &CurveSet,
        target: SaveTarget,
        duration: u16,
    ) -> Result<usize, Error> {
        let name = match target {
            SaveTarget::Animation(name) => name,
            SaveTarget::New => self.config.new_animation_name.clone(),
        };
        let container = &mut self.state_mut(rig)?.container;
        let (mut animation, warnings) =
            tangent::export_curves(&container.skeleton, curves, &name, duration)?;
        if !warnings.is_empty() {
            log::warn!("rig '{rig}': {} curves skipped on export", warnings.len());
        }

        let index = match container.animations.iter().position(|a| a.name == name) {
            Some(index) => {
                animation.reserved = container.animations[index].reserved;
                container.animations[index] = animation;
                index
            }
            None => {
                container.animations.push(animation);
                container.animations.len() - 1
            }
        };
        Ok(index)
    }

    /// Encodes the rig's container and atomically replaces `path`.
    #[cfg(feature = "binary")]
    pub fn save(&self, rig: &str, path: impl AsRef<Path>) -> Result<(), Error> {
        use std::io::Write;

        let path = path.as_ref();
        let bytes = self.state(rig)?.container.to_bytes()?;
        let io_err = |source: std::io::Error| Error::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        file.as_file().sync_all().map_err(io_err)?;
        file.persist(path).map_err(|e| io_err(e.error))?;
        log::debug!("saved rig '{rig}' to '{}' ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Captures `bone`'s current rig pose as location and rotation keys at `frame`.
    ///
    /// Keys go into existing curves only; scale is never keyed.
    pub fn insert_sample<R: Rig + ?Sized>(
        &self,
        rig: &str,
        source: &R,
        curves: &mut CurveSet,
        bone: &str,
        frame: f32,
    ) -> Result<KeyedSample, Error> {
        let skeleton = &self.state(rig)?.container.skeleton;
        let unknown = || Error::UnknownNode {
            name: bone.to_string(),
        };
        let (id, node) = skeleton.node(bone).ok_or_else(unknown)?;

        let matrix = if node.passthrough {
            source.armature_matrix(bone).ok_or_else(unknown)?
        } else {
            let basis = source.basis(bone).ok_or_else(unknown)?;
            let rest = source.rest_matrix(bone).ok_or_else(unknown)?;
            to_engine_space(basis, rest, node.bind_matrix(), skeleton.parent_bind_inverse(id))
        };
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        let rotation = euler_from_quat(rotation);

        let mut keys_written = 0;
        for (channel, values) in [
            (TransformType::Translation, translation),
            (TransformType::RotationEuler, rotation),
        ] {
            for axis in 0..3 {
                if let Some(curve) = curves.find_mut(bone, channel, axis) {
                    curve.insert_keyframe(frame, values[axis]);
                    keys_written += 1;
                }
            }
        }

        Ok(KeyedSample {
            translation,
            rotation,
            scale,
            keys_written,
        })
    }

    /// Hides or shows rig bones whose node is inert. Returns how many bones were touched.
    pub fn set_excess_hidden<R: Rig + ?Sized>(
        &self,
        rig: &str,
        target: &mut R,
        hidden: bool,
    ) -> Result<usize, Error> {
        let skeleton = &self.state(rig)?.container.skeleton;
        Ok(skeleton
            .nodes
            .iter()
            .filter(|n| !n.is_animated())
            .filter(|n| target.set_hidden(&n.name, hidden))
            .count())
    }
}
