//! Core library for larder.
//!
//! Signs requests against the FatSecret REST API with OAuth 1.0a, keeps the
//! access token pair on disk, fetches food diary entries and merges them into
//! a per-date cache without introducing duplicates.

pub mod api;
pub mod auth;
pub mod cache;
pub mod dates;
pub mod error;
pub mod models;
pub mod oauth;
pub mod service;
pub mod sync;
pub mod tokens;
pub mod transport;
pub mod verifier;

pub use error::{Error, RemoteErrorKind, Result};
