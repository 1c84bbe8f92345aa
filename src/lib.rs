//! Senders push one file into a hierarchical-namespace object store,
//! one [chunk] at a time.
//!
//! See [`sender`] for the lifecycle every sender follows
//! and [`drive`] for something that follows it for you.

pub mod chunk;
pub mod config;
pub mod context;
pub mod drive;
pub mod error;
pub mod flush;
pub mod remote;
pub mod sender;
pub mod status;
pub mod target;
