//! HTTP client infrastructure

mod client;

pub use client::{HttpClient, HttpClientBuilder};
