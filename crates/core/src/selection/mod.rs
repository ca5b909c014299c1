pub mod candidates;
pub mod selector;
pub mod summary;
