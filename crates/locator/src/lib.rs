pub mod backoff;
pub mod cache;
pub mod config;
pub mod download;
pub mod engine;
pub mod events;
pub mod metrics;
pub mod queue;
pub mod server;
pub mod service;
pub mod transport;
pub mod version;

#[cfg(test)]
mod testing;
