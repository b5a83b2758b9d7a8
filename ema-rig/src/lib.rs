//! Codec, pose evaluator and two-bone IK for `.ema`/`.emo` skeletal animation containers.
//!
//! This crate is host-agnostic. The consuming rig is reached through the [`Rig`] trait and
//! animation curves through [`CurveSet`].

#![forbid(unsafe_code)]

mod config;
pub mod curve;
mod error;
mod format;
pub mod geometry;
mod model;
mod runtime;
pub mod tangent;

#[cfg(feature = "binary")]
pub mod binary;

pub use config::*;
pub use curve::{CurveSet, FCurve, Keyframe};
pub use error::*;
pub use format::*;
pub use model::*;
pub use runtime::*;

pub(crate) use model::ContainerHeader;


#[cfg(test)]
mod curve_tests;

#[cfg(all(test, feature = "binary"))]
mod binary_tests;
