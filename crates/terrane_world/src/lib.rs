pub mod commands;
pub mod config;
pub mod engine;
pub mod worker;
pub mod world;
