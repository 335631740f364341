pub mod config;
pub mod error;
pub mod gemini;
pub mod image_lookup;
pub mod image_processing;
pub mod pipeline;
pub mod resolver;
pub mod scoring;
pub mod store;
pub mod web_api;
