pub mod coach;
pub mod features;
pub mod health;
