//! Crisis Experiment: runs the Kallipolis crisis cycle against a live model.
//!
//! This crate wires the kernel's orchestrator to:
//! - An OpenAI-compatible chat completions backend
//! - The predefined crisis scenarios
//! - Batch execution with per-scenario JSONL transcripts and a JSON summary

pub mod batch;
pub mod chat_client;
pub mod results;
pub mod scenarios;
