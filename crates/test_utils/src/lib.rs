//! Testing utilities for Sprig crates

#![warn(missing_docs)]

mod output_capture;
mod session_helpers;

pub use output_capture::OutputCapture;
pub use session_helpers::{
    RuntimeSession, check_session, make_session_with_output_capture, make_session_with_settings,
    render_diagnostics,
};
