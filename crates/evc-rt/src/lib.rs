//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Runtime helpers pacing the control loop."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Tick pacing for the control node driver.

pub mod scheduling;

pub use scheduling::{drive_blocking, DriveExit, RateLimiter};
