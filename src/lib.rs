//! # docqa
//!
//! A small login-gated web application: a user signs up, logs in, uploads a
//! PDF or plain-text document together with a question, and gets back a
//! response whose shape depends on how similar the question is to the
//! document.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  server  │──▶│  upload  │──▶│ extract  │──▶│ analysis │
//! │ (axum)   │   │ (disk+db)│   │ pdf/txt  │   │ embed +  │
//! └────┬─────┘   └──────────┘   └──────────┘   │ fallback │
//!      │                                       └──────────┘
//!      ▼
//! ┌──────────┐   ┌──────────┐
//! │ session  │   │   auth   │──▶ SQLite (users, documents)
//! └──────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`models`] | Row types and analysis results |
//! | [`auth`] | Signup, login, password hashing |
//! | [`session`] | Cookie sessions and flash messages |
//! | [`upload`] | Filename sanitizing, allow-list, storage |
//! | [`extract`] | Text extraction from PDF and text files |
//! | [`embedding`] | Embedding providers and cosine similarity |
//! | [`generation`] | Optional text generation backends |
//! | [`analysis`] | Similarity branch and fallback answering |
//! | [`pipeline`] | Upload → extract → analyze glue |
//! | [`error`] | JSON error responses |
//! | [`server`] | HTTP routes |

pub mod analysis;
pub mod auth;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod upload;
