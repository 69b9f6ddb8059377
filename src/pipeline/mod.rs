pub mod guidance;
pub mod safety;
