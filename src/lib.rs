pub mod analysis;
pub mod config;
pub mod data_io;
pub mod pipeline;
pub mod plotting;
pub mod time_utils;

pub use time_utils::*;
