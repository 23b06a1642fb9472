pub mod client;
pub mod compose;
pub mod gpu;
