//! # postindex core
//!
//! Shared, I/O-free logic for postindex: post models, record
//! transformation, media path schemes, query construction, pagination,
//! the search backend trait, and the retrieval engine built on it.
//!
//! This crate contains no tokio, HTTP client, or filesystem access. The
//! application crate supplies those and drives everything here.

pub mod backend;
pub mod media;
pub mod models;
pub mod paginate;
pub mod query;
pub mod search;
pub mod transform;
