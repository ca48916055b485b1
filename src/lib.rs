//! Web backend for managing, training and testing seismic magnitude
//! estimation models.

pub mod artifacts;
pub mod config;
pub mod core;
pub mod data;
pub mod models;
pub mod runner;
pub mod store;
pub mod web;
