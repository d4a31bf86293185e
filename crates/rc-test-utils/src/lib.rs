//! # Room Controller Test Utilities
//!
//! Shared test utilities for the Room Controller.
//!
//! This crate provides mock implementations and test fixtures for isolated
//! controller testing without real infrastructure:
//!
//! - `mock_engine` - in-memory media engine with failure injection and a
//!   close-order log
//! - `fixtures` - pre-wired controller instances (in-memory store + mock
//!   engine) and capability documents
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestHarness::new();
//!     let mut session = harness.session("peer-a");
//!
//!     let response = session
//!         .handle(SignalingRequest::Join { room_id: "alpha".into() })
//!         .await;
//!     assert!(!response.is_error());
//! }
//! ```

pub mod fixtures;
pub mod mock_engine;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_engine::*;
