pub mod cache;
pub mod commerce;
pub mod repository;

pub use cache::*;
pub use commerce::*;
pub use repository::*;
