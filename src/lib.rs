pub mod cache;
pub mod compression;
pub mod config;
pub mod database;
pub mod entities;
pub mod errors;
pub mod job_scheduling;
pub mod models;
pub mod repositories;
pub mod services;
pub mod storage;
pub mod utils;
pub mod web;
