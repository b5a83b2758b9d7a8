use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed container at offset {offset:#x}: {message}")]
    Format { offset: usize, message: String },

    #[error("failed to encode container: {message}")]
    Encode { message: String },

    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("container has no skeleton block")]
    MissingSkeleton,

    #[error("no rig registered as '{rig}'")]
    UnknownRig { rig: String },

    #[error("unknown animation: {name}")]
    UnknownAnimation { name: String },

    #[error("unknown node: {name}")]
    UnknownNode { name: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[cfg(feature = "json")]
    #[error("failed to parse config JSON: {message}")]
    ConfigParse { message: String },
}

impl Error {
    pub(crate) fn format(offset: usize, message: impl Into<String>) -> Self {
        Self::Format {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }
}

/// Non-fatal conditions raised while binding, evaluating or exporting.
///
/// Warnings never abort an operation; the affected node or clip is skipped for that
/// operation only.
#[derive(Clone, Debug, PartialEq)]
pub enum Warning {
    /// A skeleton node has no bone of the same name in the consuming rig.
    UnboundNode { node: String },
    /// A bind-pose node has no skeleton node of the same name.
    UnmatchedBindNode { node: String },
    /// An exported curve targets a bone the skeleton does not contain.
    UnknownCurveBone { bone: String },
    /// No clip in the container matches the requested action.
    MissingAnimation { action: String },
    /// The IK target was out of reach (or on top of the root joint); the solve clamped.
    IkDegenerate {
        upper: String,
        distance: f32,
        reach: f32,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnboundNode { node } => write!(f, "node '{node}' has no matching rig bone"),
            Self::UnmatchedBindNode { node } => {
                write!(f, "bind-pose node '{node}' has no matching skeleton node")
            }
            Self::UnknownCurveBone { bone } => {
                write!(f, "curve targets bone '{bone}' which is not in the skeleton")
            }
            Self::MissingAnimation { action } => {
                write!(f, "no animation matches action '{action}'")
            }
            Self::IkDegenerate {
                upper,
                distance,
                reach,
            } => write!(
                f,
                "IK limb at '{upper}' clamped (target distance {distance}, reach {reach})"
            ),
        }
    }
}
