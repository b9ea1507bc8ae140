//! Consolidated test modules.
//!
//! End-to-end scenarios driven through the real router with an
//! in-memory recording sink in place of Langfuse.
