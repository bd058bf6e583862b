//! # Dependency Resolution
//!
//! Handlers describe their parameters with [`ParamSpec`] descriptors built at
//! registration time. Resolution is data-driven over those descriptors:
//!
//! 1. [`needs_injection`] is a cheap check run once per pipeline build. When
//!    it passes, the handler is bound to the caller-supplied arguments as-is.
//! 2. Otherwise [`resolve`] runs per call against the merged request input,
//!    coercing primitives, matching enum cases, and asking the container for
//!    models and classes (recursing into constructor signatures).
//!
//! Resolution failures are input errors ([`DispatchError::MissingInput`],
//! [`DispatchError::WrongType`], [`DispatchError::InvalidEnum`]) naming the
//! offending parameter.
//!
//! [`DispatchError::MissingInput`]: crate::error::DispatchError::MissingInput
//! [`DispatchError::WrongType`]: crate::error::DispatchError::WrongType
//! [`DispatchError::InvalidEnum`]: crate::error::DispatchError::InvalidEnum

pub mod coerce;
mod core;
mod types;

pub use core::{bind_supplied, needs_injection, resolve};
pub use types::{Arg, Args, ClassType, EnumCase, EnumType, ParamKind, ParamSpec};
