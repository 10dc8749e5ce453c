pub mod app;
pub mod classify;
pub mod config;
pub mod db;
pub mod gateway;
pub mod marks;
pub mod model;
pub mod report;
pub mod sync;
