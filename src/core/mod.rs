pub mod adaptive;
pub mod aggregate;
pub mod file;
pub mod flatten;
pub mod fs;
pub mod partition;
pub mod path;

pub use adaptive::*;
pub use aggregate::*;
pub use file::*;
pub use fs::*;
pub use partition::*;
