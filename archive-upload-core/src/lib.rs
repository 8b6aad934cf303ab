#![doc = "archive-upload-core: transfer engine and session orchestration for archive-upload."]

//! This crate holds the bounded-concurrency upload engine and the run
//! orchestration around it. It never talks to a network or a database
//! directly: all external calls go through the traits in [`contract`].
//!
//! # Usage
//! Implement the [`contract`] traits and call [`session::run_session`], or drive
//! a [`dispatcher::Dispatcher`] directly.

pub mod bootstrap;
pub mod config;
pub mod contract;
pub mod dispatcher;
pub mod error;
pub mod finalize;
pub mod pool;
pub mod progress;
pub mod retry;
pub mod session;
pub mod stats;
pub mod task;
