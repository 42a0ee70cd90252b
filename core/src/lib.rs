pub mod error;
pub mod host;
pub mod models;
pub mod pipeline;
pub mod reconciler;
pub mod remote;
pub mod service;
pub mod session;

#[cfg(test)]
mod testing;
