pub mod controller;
pub mod error;
pub mod repos;
pub mod update;
