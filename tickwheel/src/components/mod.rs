//! Contains the building blocks for tick-driven logic.
//!
//! This module provides the event descriptor that the `EventRegistry`
//! stores and executes: an owned callback paired with one of the three
//! firing policies.

pub mod event;
