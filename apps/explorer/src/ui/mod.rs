//! Terminal views: pure functions from engine state to printable frames.

pub mod carousel;
pub mod recipes;
