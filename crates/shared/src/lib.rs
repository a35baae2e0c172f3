//! Shared utilities for the sfswitch backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Opaque job token generation and credential fingerprints
//! - Field validators for Salesforce identifiers and instance URLs

pub mod crypto;
pub mod validation;
