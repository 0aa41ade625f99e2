pub mod common;
pub mod config;
pub mod lookup;
pub mod reset;
pub mod status;
pub mod sync;
