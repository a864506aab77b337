pub mod installer;
pub use installer::*;

pub mod probe;
pub use probe::*;
