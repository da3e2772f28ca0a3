//! Core library for the `loadrig` load generator.
//!
//! A [`task::Task`] wraps an [`engine::Engine`] that drives concurrent
//! workers against one target. Each worker asks a [`protocol::Requester`]
//! for attempts whose payloads come from the [`data`] resolver, and every
//! outcome is folded into a [`report::Report`]. The `loadrig` binary is a
//! thin runner around these pieces.
pub mod args;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod logger;
pub mod protocol;
pub mod report;
pub mod task;

#[cfg(feature = "fuzzing")]
pub mod fuzzing;
