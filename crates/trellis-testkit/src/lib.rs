//! # Trellis Testkit
//!
//! Testing utilities for the Trellis kernel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a seeded kernel over the in-memory store and directory
//!   for integration scenarios
//! - **Chaos**: a fault-injecting store wrapper for fail-closed and
//!   atomicity tests
//! - **Generators**: proptest strategies for roles, subjects and entities
//!
//! ## Fixtures
//!
//! ```rust
//! use trellis_testkit::TestFixture;
//!
//! # async fn example() {
//! let fx = TestFixture::new();
//! let task = fx.seed_task("t-1", "u-owner");
//! # }
//! ```
//!
//! ## Fault injection
//!
//! [`ChaosStore`] wraps the memory store and fails selected read paths on
//! demand, so tests can assert that resolution fails closed and that the
//! container cascade leaves no partial state behind.

pub mod chaos;
pub mod fixtures;
pub mod generators;

pub use chaos::ChaosStore;
pub use fixtures::TestFixture;
pub use generators::{entity_kind, optional_role, role, user_id};
