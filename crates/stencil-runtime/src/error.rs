use stencil_reactive::ReactiveError;
use thiserror::Error;

use crate::capabilities::CapabilityFlags;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failure to turn a name or handle into a definition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no resolved value is registered for handle {0}")]
    UnknownHandle(u32),

    #[error("attempted to resolve `{name}`, which was expected to be a component, but nothing was found")]
    ComponentNotFound { name: String },

    #[error("attempted to resolve `{name}`, which was expected to be a helper, but nothing was found")]
    HelperNotFound { name: String },

    #[error("attempted to resolve `{name}`, which was expected to be a modifier, but nothing was found")]
    ModifierNotFound { name: String },

    #[error("attempted to resolve `{name}`, which was expected to be a component or helper, but nothing was found")]
    ComponentOrHelperNotFound { name: String },

    #[error("handle {handle} resolved to a {found}, expected a {expected}")]
    UnexpectedHandleKind {
        handle: u32,
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("manager hook `{hook}` requires capability {capability:?}")]
    CapabilityViolation {
        capability: CapabilityFlags,
        hook: &'static str,
    },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl RuntimeError {
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }
}

impl From<ReactiveError> for RuntimeError {
    fn from(error: ReactiveError) -> Self {
        Self::InvariantViolation(error.to_string())
    }
}
