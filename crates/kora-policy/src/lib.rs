//! # kora-policy
//!
//! Pure policy arithmetic for the kora economy: conversion rates, hold
//! durations, withdrawal rules, boost splits, and daily earn caps.
//!
//! Nothing here touches storage or time sources; every function takes its
//! inputs explicitly and is deterministic, which is what lets the engine
//! and the background sweep agree on results.
//!
//! ## Modules
//!
//! - [`rates`] — fixed-point SA→fiat conversion
//! - [`holds`] — hold durations per entry kind
//! - [`splits`] — boost cost distribution
//! - [`withdrawal`] — minimum, daily caps, cooldown composition
//! - [`earn`] — daily earn caps

pub mod earn;
pub mod holds;
pub mod rates;
pub mod splits;
pub mod withdrawal;

/// Error types for policy configuration and arithmetic.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Boost split percentages do not sum to 100.
    #[error("split percentages must sum to 100, got {total}")]
    InvalidSplitTotal {
        /// The actual total.
        total: u16,
    },

    /// Amount is zero where a positive amount is required.
    #[error("amount is zero")]
    ZeroAmount,

    /// Arithmetic overflow.
    #[error("arithmetic overflow in policy calculation")]
    Overflow,

    /// A conversion rate with a zero term.
    #[error("invalid rate: {0}")]
    InvalidRate(String),

    /// The amount does not convert exactly at the configured rate.
    #[error("{sa_amount} SA does not convert exactly at rate {numer}/{denom}")]
    InexactConversion {
        /// The SA amount requested.
        sa_amount: u64,
        /// Rate numerator (fiat units).
        numer: u64,
        /// Rate denominator (SA units).
        denom: u64,
    },

    /// A policy knob set to a value that can never pass.
    #[error("invalid policy configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
