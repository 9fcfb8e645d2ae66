#![warn(missing_docs)]
//! Domain models and ports for coordinating concurrent, deadline-bounded
//! header-bidding auctions.
//!
//! An auction is one fan-out/fan-in round: a set of participants (bidders) is
//! solicited for responses to one or more placements (ad units), responses are
//! collected under a deadline, and the aggregate result stays queryable for a
//! bounded time after completion. This crate holds the pure data structures
//! and the interface traits of that domain; the stateful engine lives in
//! `hbx-memory`.

/// Core domain models for the auction system.
///
/// The models in this module are primarily data structures with minimal
/// business logic, following the principles of the hexagonal architecture to
/// separate domain entities from the engine that coordinates them.
pub mod models;

/// Interface traits for the auction system.
///
/// This module contains the "ports" in the hexagonal architecture pattern:
/// the contracts between the engine and its external collaborators (currently
/// the cache-retention configuration source), specified without implementation
/// details so that collaborators can be swapped or faked in tests.
pub mod ports;
