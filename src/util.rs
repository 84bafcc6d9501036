// Copyright 2026 the Xsurf Authors
// SPDX-License-Identifier: Apache-2.0

//! Internal macros and small helpers.

macro_rules! log_x11 {
    ($val:expr) => {
        if let Err(e) = $val {
            // We probably don't want to include file/line numbers. This logging is done in
            // a context where X11 errors probably just mean that the connection to the X server
            // was lost. In particular, it doesn't represent an xsurf bug for which we want
            // more context.
            tracing::error!("X11 error: {}", e);
        }
    };
}

/// Wrapper around `RefCell::borrow` that provides error context.
macro_rules! borrow {
    ($val:expr) => {{
        use anyhow::Context;
        $val.try_borrow()
            .with_context(|| format!("[{}:{}] {}", std::file!(), std::line!(), std::stringify!($val)))
    }};
}

/// Wrapper around `RefCell::borrow_mut` that provides error context.
macro_rules! borrow_mut {
    ($val:expr) => {{
        use anyhow::Context;
        $val.try_borrow_mut()
            .with_context(|| format!("[{}:{}] {}", std::file!(), std::line!(), std::stringify!($val)))
    }};
}
