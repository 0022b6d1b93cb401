// Library exports for TechDaily
// Integration tests build the router and state from here

pub mod articles;
pub mod auth;
pub mod authors;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod upload;
