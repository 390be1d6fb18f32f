pub mod core;
pub mod error;
pub mod fs;
pub mod retry;
