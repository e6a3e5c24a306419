mod error;
mod snapshot;
mod store;
mod types;

pub use error::*;
pub use snapshot::*;
pub use store::*;
pub use types::*;
