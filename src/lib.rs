//! Word quiz engine: turns a document into a word-frequency table, builds
//! multiple-choice questions from it and scores a play session.
//!
//! The Telegram bot in `main.rs` is a thin driver on top of this crate.

pub mod config;
pub mod quiz;
pub mod store;
