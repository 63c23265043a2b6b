//! # compspec
//!
//! The compspec application: fetches compatibility artifacts and schemas,
//! builds the compatibility graph with `compspec-core`, and describes the
//! host through extractor plugins.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   apps/compspec (THE BINARY)                 │
//! │                                                              │
//! │  ┌──────────┐   ┌────────────────────┐   ┌───────────────┐   │
//! │  │   CLI    │──▶│ Pipeline           │   │ Plugins       │   │
//! │  │  (clap)  │   │ schemas + registry │   │ kernel/system │   │
//! │  └──────────┘   │ + artifact cache   │   │ library       │   │
//! │                 └─────────┬──────────┘   └──────┬────────┘   │
//! │                           ▼                     ▼            │
//! │                   ┌────────────────────────────────┐         │
//! │                   │   compspec-core (THE ENGINE)   │         │
//! │                   └────────────────────────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod config;
pub mod documents;
pub mod fetch;
pub mod pipeline;
pub mod plugins;
