// Copyright 2026 the Xsurf Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors at the crate boundary.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Error {
    XError(Arc<x11rb::errors::ReplyError>),
    ConnectError(Arc<x11rb::errors::ConnectError>),
    /// A surface operation was attempted after the surface was destroyed.
    SurfaceDestroyed,
    Other(Arc<anyhow::Error>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            Error::XError(e) => e.fmt(f),
            Error::ConnectError(e) => e.fmt(f),
            Error::SurfaceDestroyed => write!(f, "surface has already been destroyed"),
            Error::Other(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<x11rb::x11_utils::X11Error> for Error {
    fn from(err: x11rb::x11_utils::X11Error) -> Error {
        Error::XError(Arc::new(x11rb::errors::ReplyError::X11Error(err)))
    }
}

impl From<x11rb::errors::ReplyError> for Error {
    fn from(err: x11rb::errors::ReplyError) -> Error {
        Error::XError(Arc::new(err))
    }
}

impl From<x11rb::errors::ConnectError> for Error {
    fn from(err: x11rb::errors::ConnectError) -> Error {
        Error::ConnectError(Arc::new(err))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Error {
        Error::Other(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroyed_surface_reads_as_such() {
        assert_eq!(
            Error::SurfaceDestroyed.to_string(),
            "surface has already been destroyed"
        );
    }
}
