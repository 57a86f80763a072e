pub mod approval;
pub mod expense;
pub mod money;
pub mod rule;
pub mod user;
