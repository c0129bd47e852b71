pub mod evidence;
pub mod execution;
pub mod outcome;
pub mod status;

pub use evidence::*;
pub use execution::*;
pub use outcome::*;
pub use status::*;
