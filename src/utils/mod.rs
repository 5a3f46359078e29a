//! Utility functions

pub mod fs;
pub mod hashing;
pub mod paths;
pub mod tokens;

pub use fs::write_atomic;
pub use hashing::sha256_hex;
pub use paths::file_safe;
pub use tokens::estimate_tokens;
