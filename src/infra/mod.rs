pub mod db;
pub mod memory;
pub mod postgres;
pub mod repo;
