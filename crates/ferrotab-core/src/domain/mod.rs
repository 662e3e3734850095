//! # Domain Models
//!
//! Normalised shapes every adapter produces and every consumer reads.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Cell`] | Scalar, list of scalars, or null |
//! | [`Row`] | Ordered, case-sensitive column name to [`Cell`] mapping |
//! | [`Dataset`] | Rows plus headers derived from the first row |
//! | [`SourceDescriptor`] | Parsed form of an opaque source string |
//! | [`LocalMounts`] | URL prefixes served from local directories |
//!
//! Rows keep insertion order; nothing in the crate reorders columns or rows except
//! the explicit column selection and sort in [`crate::postprocess`].

mod cell;
mod descriptor;
mod row;

pub use cell::{Cell, Scalar};
pub use descriptor::{LocalMounts, SourceDescriptor};
pub use row::{Dataset, Row};
