// Library modules for integration tests
pub mod auth;
pub mod blobstore;
pub mod clients;
pub mod config;
pub mod context;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod models;
pub mod segmenter;
pub mod server;
pub mod stitcher;
pub mod store;
pub mod worker;
