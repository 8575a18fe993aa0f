//! Domain models for the clinic queue.

mod change;
mod entry;
mod notification;
mod resources;
mod tenant;

pub use change::*;
pub use entry::*;
pub use notification::*;
pub use resources::*;
pub use tenant::*;
