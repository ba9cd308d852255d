//! Signal-safe synchronization primitives
//!
//! - `spin_lock`: one-word exclusive/shared busy-wait lock
//! - `stripes`: fixed array of spin locks guarding per-stripe data

pub mod spin_lock;
pub mod stripes;

pub use spin_lock::SpinLock;
pub use stripes::{AllStripes, HoldMode, SharedStripeGuard, StripeGuard, StripeSet};
