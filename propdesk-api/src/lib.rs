//! # PropDesk API Server Library
//!
//! HTTP surface of the rental-property management backend. The engine lives
//! in `propdesk-shared`; this crate maps requests onto it.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Session resolution and security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
