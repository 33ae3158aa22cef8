//! reqwest-backed adapters for the token endpoint and the resource API

pub mod client;
pub mod token_endpoint;
pub mod transport;

pub use client::HttpClientBuilder;
pub use token_endpoint::HttpTokenEndpoint;
pub use transport::ReqwestTransport;
