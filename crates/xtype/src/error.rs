// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry errors.

use crate::id::TypeId;

/// Boundary error code of a registry [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    NotSupported,
    NotFound,
    Failed,
}

/// Registry error.
///
/// Programmer errors are logged at error level when they are produced and
/// leave the registry untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Registration
    // ========================================================================
    /// Type name is malformed.
    InvalidName(String),
    /// A type with this name already exists.
    DuplicateName(String),
    /// Fundamental id is out of range or already used.
    InvalidFundamentalId(TypeId),
    /// Parent type does not exist or cannot be used.
    InvalidParent(TypeId),
    /// Parent type is final.
    FinalParent { name: String, parent: String },
    /// Parent's fundamental is not derivable.
    NotDerivable { name: String, parent: String },
    /// Parent's fundamental is not deep derivable.
    NotDeepDerivable { name: String, parent: String },
    /// Inheritance chain would exceed the supported depth.
    TooDeep(String),
    /// Type information is inconsistent.
    InvalidTypeInfo(String),
    /// Flags outside the accepted mask.
    InvalidFlags(u32),

    // ========================================================================
    // Interfaces
    // ========================================================================
    /// Type is not an interface.
    NotAnInterface(String),
    /// Interface cannot be added to this type.
    InterfaceConflict(String),
    /// Prerequisite rules violated.
    Prerequisite(String),
    /// Interface information is inconsistent.
    InvalidInterfaceInfo(String),

    // ========================================================================
    // Classes and instances
    // ========================================================================
    /// Type is not classed.
    NotClassed(String),
    /// Type is not instantiatable.
    NotInstantiatable(String),
    /// Type is abstract.
    AbstractType(String),
    /// Class handle does not belong to a live class.
    InvalidClass,
    /// Private data request rejected.
    InvalidPrivate(String),

    // ========================================================================
    // Plugins and lookup
    // ========================================================================
    /// Plugin failed to supply or reload a type.
    PluginFailed(String),
    /// No such type.
    UnknownType(TypeId),
    /// Operation invalid in the current state.
    InvalidState(String),
}

impl Error {
    /// Boundary code of the error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::PluginFailed(_) => ErrorCode::Failed,
            Error::UnknownType(_) => ErrorCode::NotFound,
            Error::NotClassed(_)
            | Error::NotInstantiatable(_)
            | Error::AbstractType(_)
            | Error::NotDerivable { .. }
            | Error::NotDeepDerivable { .. }
            | Error::FinalParent { .. } => ErrorCode::NotSupported,
            _ => ErrorCode::InvalidArgument,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Registration
            Error::InvalidName(name) => write!(f, "type name '{}' is invalid", name),
            Error::DuplicateName(name) => write!(f, "cannot register existing type '{}'", name),
            Error::InvalidFundamentalId(id) => {
                write!(f, "cannot register fundamental type with id {}", id)
            }
            Error::InvalidParent(id) => write!(f, "parent type {} is invalid", id),
            Error::FinalParent { name, parent } => write!(
                f,
                "cannot derive '{}' from final parent type '{}'",
                name, parent
            ),
            Error::NotDerivable { name, parent } => write!(
                f,
                "cannot derive '{}' from non-derivable parent type '{}'",
                name, parent
            ),
            Error::NotDeepDerivable { name, parent } => write!(
                f,
                "cannot derive '{}' from non-fundamental parent type '{}'",
                name, parent
            ),
            Error::TooDeep(name) => write!(f, "inheritance chain of '{}' is too deep", name),
            Error::InvalidTypeInfo(msg) => write!(f, "invalid type info: {}", msg),
            Error::InvalidFlags(bits) => write!(f, "invalid type flags 0x{:x}", bits),
            // Interfaces
            Error::NotAnInterface(name) => write!(f, "type '{}' is not an interface", name),
            Error::InterfaceConflict(msg) => write!(f, "cannot add interface: {}", msg),
            Error::Prerequisite(msg) => write!(f, "prerequisite violation: {}", msg),
            Error::InvalidInterfaceInfo(msg) => write!(f, "invalid interface info: {}", msg),
            // Classes and instances
            Error::NotClassed(name) => write!(f, "type '{}' is not classed", name),
            Error::NotInstantiatable(name) => {
                write!(f, "cannot create instance of non-instantiatable type '{}'", name)
            }
            Error::AbstractType(name) => {
                write!(f, "cannot create instance of abstract type '{}'", name)
            }
            Error::InvalidClass => write!(f, "invalid class handle"),
            Error::InvalidPrivate(msg) => write!(f, "invalid private data request: {}", msg),
            // Plugins and lookup
            Error::PluginFailed(msg) => write!(f, "plugin failed: {}", msg),
            Error::UnknownType(id) => write!(f, "invalid type id {}", id),
            Error::InvalidState(msg) => write!(f, "invalid state: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for registry operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Log a programmer error at critical level and hand it back.
pub(crate) fn critical(err: Error) -> Error {
    log::error!("[xtype] {}", err);
    err
}
