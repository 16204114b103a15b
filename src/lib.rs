//! Labelflow: labels moving through state machines.
//!
//! A label is a named document of JSON metadata that sits in one state of a
//! state machine at a time. States come in two kinds:
//!
//! - **Gates** hold a label until their exit condition, written in a small
//!   English-like language, is true.
//! - **Actions** deliver a webhook and move on once it succeeds.
//!
//! Gates are evaluated when a label enters them, when metadata updates fire
//! their triggers, and when their time triggers come round in the cron
//! orchestrator. Every step appends to the label's history under a per-label
//! lock.
//!
//! # Example
//!
//! ```rust
//! use labelflow::builder::{action, gate, StateMachineBuilder};
//! use labelflow::exit_conditions::ExitConditionProgram;
//! use chrono::Utc;
//! use serde_json::json;
//!
//! let machine = StateMachineBuilder::new("signup")
//!     .gate(gate("pending", "metadata.verified and metadata.age >= 18").next_state("welcome"))
//!     .action(action("welcome", "https://example.com/welcome").next_state("member"))
//!     .gate(gate("member", "false"))
//!     .build()
//!     .unwrap();
//! assert_eq!(machine.states().len(), 3);
//!
//! let program = ExitConditionProgram::compile("metadata.age >= 18").unwrap();
//! let ready = program.run(&json!({"metadata": {"age": 21}}), Utc::now()).unwrap();
//! assert!(ready);
//! ```

pub mod app;
pub mod builder;
pub mod config;
pub mod context;
pub mod core;
pub mod cron;
pub mod engine;
pub mod exit_conditions;
pub mod feeds;
pub mod hooks;
pub mod labels;
pub mod logging;
pub mod settings;
pub mod store;
pub mod triggers;
pub mod webhooks;

// Re-export commonly used types
pub use app::App;
pub use builder::{BuildError, StateMachineBuilder};
pub use config::Config;
pub use core::{HistoryEntry, LabelHistory, LabelRef, State, StateMachine};
pub use engine::TransitionError;
pub use exit_conditions::ExitConditionProgram;
pub use settings::Settings;
pub use store::{MemoryStore, Store};
