//! Comic collection catalog served over a tag-invalidated response cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
pub(crate) mod util;
