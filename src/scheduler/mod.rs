pub mod scheduler;
pub mod timing;
