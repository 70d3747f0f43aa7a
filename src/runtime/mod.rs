pub mod context;
pub mod engine;
pub mod outcome;
pub mod protocol;
pub mod resolver;
pub mod store;
pub mod task;
pub mod worker;
