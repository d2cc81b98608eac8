// Copyright 2026 Pagefetch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pagefetch runtime library: reliable page acquisition.
//!
//! Plain HTTP with rate-limit aware retries, browser rendering with
//! readiness polling for script-rendered and bot-protected pages, and a
//! single-flight cache for expensive per-item fetches.

pub mod acquisition;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod listing;
pub mod logging;
pub mod renderer;

pub use cache::{CacheKey, KeyedCache};
pub use config::FetchConfig;
pub use error::{FetchError, RenderFailure};
pub use fetcher::{FetchMode, FetchRequest, FetchResult, Fetcher};
