//! tryon-synth: HTTP adapters for the try-on core.
//!
//! [`SynthesisClient`] talks to the makeup transfer service;
//! [`HttpAssetFetcher`] loads shade reference images.

pub mod client;
pub mod fetch;

#[cfg(test)]
mod test_server;

pub use client::SynthesisClient;
pub use fetch::HttpAssetFetcher;
