//! Client for the Spatial Omics DataBase (SODB).
//!
//! The catalog loads the server manifest once, answers listing queries from
//! it, and keeps downloaded experiments in a local cache where a file is
//! either absent or complete.

pub mod app;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod manifest;
pub mod output;
pub mod reader;
pub mod store;
