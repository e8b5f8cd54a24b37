pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod queue;
pub mod sampler;
pub mod sync;
