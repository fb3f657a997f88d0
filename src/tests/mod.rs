//! Internal test modules - whitebox tests with crate access
//!
//! Property suites that drive internal types directly and check the
//! invariants the controller relies on.
