pub mod coaching;
pub mod error;
pub mod features;
pub mod risk;
pub mod sanitize;
pub mod schema;
pub mod skills;
