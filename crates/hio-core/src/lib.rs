//! # hio-core
//!
//! Shared, dependency-free types used by every other `hio-*` crate: the
//! error type, tunable constants, and completion-flag bits. Nothing here
//! touches io_uring, sockets, or threads — that lives in `hio-ring` and
//! `hio-io`.

pub mod constants;
pub mod error;

pub use error::{HioError, Result};
