//! Friendlier Python errors.
//!
//! Runs a Python script, reads the traceback it dies with, classifies the
//! error, and fetches Stack Overflow answers rewritten to use the script's
//! own identifiers. The modules are exposed here so the pipeline can be
//! exercised without going through CLI startup.

pub mod answers;
pub mod cache;
pub mod errors;
pub mod hints;
pub mod inspection;
pub mod python;
pub mod stackoverflow;
