//! Backend for the portfolio apps: the Tetris engine and its leaderboard,
//! the drawing stroke smoother, and the Daily Tracker API with its offline
//! sync client.

pub mod config;
pub mod dates;
pub mod db;
pub mod error_handler;
pub mod handlers;
pub mod leaderboard;
pub mod models;
pub mod schema;
pub mod stroke;
pub mod sync;
pub mod tetris;
