//! Common test utilities for chunk-relay integration tests

#[allow(dead_code)]
pub mod assertions;
#[allow(dead_code)]
pub mod fakes;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fakes::*;
