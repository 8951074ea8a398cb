pub mod authentication;
pub mod permissions;

pub use authentication::*;
pub use permissions::*;
