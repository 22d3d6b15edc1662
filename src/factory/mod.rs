/// Named constructor table
pub mod catalog;
/// Configuration-selected, hot-swappable singleton
pub mod singleton;

pub use catalog::{Catalog, Constructor};
pub use singleton::SingletonFactory;
