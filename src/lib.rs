pub mod accuracy;
pub mod config;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod kalman;
pub mod measurement;
pub mod output;
pub mod pipeline;
pub mod tuning;
