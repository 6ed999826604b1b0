pub mod plots;
pub mod tables;
