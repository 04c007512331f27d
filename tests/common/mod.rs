//! Common test infrastructure
//!
//! In-process doubles for the two network collaborators, so integration tests
//! drive the push stream and the REST api deterministically.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{FakeApi, ScriptedTransport};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_push() {
//!     let transport = ScriptedTransport::new();
//!     let api = FakeApi::new();
//!     // ...
//! }
//! ```

mod api;
mod fixtures;
mod transport;

// Public API - this is what tests import
pub use api::{ApiCall, FakeApi};
#[allow(unused_imports)]
pub use fixtures::*;
pub use transport::ScriptedTransport;
