//! Content Pipeline
//!
//! Staged, mostly sequential processor that turns the raw Z0 pool into the
//! quality-gated, channel-balanced event set behind the daily brief.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! │   (owns the run context, drives stages, computes verdict)    │
//! └──────────────────────────────────────────────────────────────┘
//!        │
//!        ▼
//!  Collector (Z0) ─▶ Dedupe/Filter ─▶ Hydrator ─▶ Entities/Class
//!        │                               │              │
//!        │        (only concurrent stage)┘              ▼
//!        │                                   Scoring + Event Gate
//!        │                                               │
//!        ▼                                               ▼
//!  Supply Fallback                        Selection + Bucket Backfill
//!                                                        │
//!                                                        ▼
//!                                          Faithful ZH Rewriter
//!                                                        │
//!                                                        ▼
//!                                      Renderer ─▶ Gate Engine ─▶ Meta
//! ```
//!
//! # Determinism
//!
//! - Items are sorted `(published_at desc, id asc)` before every
//!   order-sensitive step.
//! - Selection and tie-breaks follow one total order.
//! - Hydration results merge by item id; completion order never leaks.
//! - Meta files land atomically (tmp + fsync + rename), one writer.

pub mod classify;
pub mod dedupe;
pub mod entities;
pub mod extract;
pub mod gates;
pub mod hydrator;
pub mod llm;
pub mod meta_writer;
pub mod normalize;
pub mod orchestrator;
pub mod render;
pub mod rewriter;
pub mod scheduler;
pub mod scoring;
pub mod selection;
pub mod snapshot;

#[cfg(test)]
mod rewriter_tests;
