pub mod config;
pub mod error;
pub mod recipe;
pub mod report;

pub use config::*;
pub use error::*;
pub use recipe::*;
pub use report::*;
