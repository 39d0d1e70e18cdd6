#![forbid(unsafe_code)]

//! Stateless HTTP relay for gdplayer-hosted Google Drive videos.
//!
//! A browser asks the relay to resolve a Drive file id into a slug, then plays
//! `/stream/{slug}/{quality}` which the relay turns into an upstream media
//! request and streams back untouched. Nothing is cached between requests.

pub mod config;
pub mod error;
pub mod extractor;
pub mod logging;
pub mod pages;
pub mod proxy;
pub mod resolver;
pub mod router;
pub mod upstream;

#[cfg(test)]
mod testing;
