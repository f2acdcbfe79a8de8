//! # API Gateway Test Suite
//!
//! Cross-component flows that drive the real router end to end.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs    # Stub upstreams and request helpers
//!     ├── flows.rs      # Auth, routing, throttling, and error flows
//!     └── forwarding.rs # What upstreams actually receive
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p gateway-tests
//! cargo test -p gateway-tests integration::flows::
//! ```

pub mod integration;
