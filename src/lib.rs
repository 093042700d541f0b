//! GPS logger: ingest location reports over HTTP, store them, serve maps and exports

pub mod config;
pub mod database;
pub mod errors;
pub mod geo;
pub mod models;
pub mod normalize;
pub mod render;
pub mod routes;
pub mod view;
