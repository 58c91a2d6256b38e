pub mod dispatch;
pub mod health;
pub mod job;
pub mod order;
