pub mod config;
pub mod inference;
pub mod predict;
pub mod routes;
pub mod startup;
pub mod storage;
