pub mod compute;
pub mod config;
pub mod convert;
pub mod error;
pub mod graph;
pub mod profile;
pub mod render;
pub mod session;
pub mod table;
pub mod tech_map;

pub use error::{ProfileError, ProfileResult};
