//! Shared foundational types used across the Kestrel cluster router.
//!
//! This crate provides interned names for device and netlist objects and the
//! result type used to report broken internal invariants.

#![warn(missing_docs)]

pub mod ident;
pub mod result;

pub use ident::{Ident, Interner};
pub use result::{InternalError, KestrelResult};
