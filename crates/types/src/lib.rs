mod amount;
mod clock;
mod common;
mod events;
mod ids;

pub use amount::*;
pub use clock::*;
pub use common::*;
pub use events::*;
pub use ids::*;
