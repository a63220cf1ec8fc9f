//! Testing utilities and mock implementations
//!
//! Mock channel implementations for exercising the publisher, subscriber,
//! and shutdown coordination without a broker.

pub mod mocks;

pub use mocks::*;
