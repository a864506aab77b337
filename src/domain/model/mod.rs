pub mod package;
pub mod paths;

pub use package::*;
pub use paths::*;
