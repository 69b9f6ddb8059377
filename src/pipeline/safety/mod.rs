pub mod fallback;
pub mod keywords;
pub mod knowledge;
pub mod sanitize;

pub use fallback::*;
pub use keywords::*;
pub use knowledge::*;
pub use sanitize::*;
