pub mod enums;
pub mod guidance;
pub mod query;

pub use enums::*;
pub use guidance::*;
pub use query::*;
