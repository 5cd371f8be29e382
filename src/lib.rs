pub mod channels;
pub mod config;
pub mod db;
pub mod feeds;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod preview;
pub mod publisher;
pub mod rewrite;
pub mod selector;
pub mod transform;
