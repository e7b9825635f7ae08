//! # System Module
//!
//! The fixed stage catalogue and the progress rollup computed over it.
//!
//! Both halves are pure: nothing here touches storage or the clock.

mod progress;
mod stage;

pub use progress::*;
pub use stage::*;
