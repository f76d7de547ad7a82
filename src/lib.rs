//! `epicast` library crate.
//!
//! Per-country epidemic forecasting: prioritized data-source resolution,
//! model-registry lookup with alternative-kind fallback, and a two-path
//! forecaster. The binary (`epicast`) is a thin wrapper around [`app::run`].

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod io;
pub mod logging;
pub mod models;
pub mod report;
