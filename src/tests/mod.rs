//! Tests that exercise a real PostgreSQL backend.
//!
//! Container-backed tests are ignored by default:
//!
//! ```bash
//! cargo test -- --ignored    # requires Docker
//! ```

mod harness;
