pub mod error;
pub mod segment;
pub mod transcript;
pub mod translate;
