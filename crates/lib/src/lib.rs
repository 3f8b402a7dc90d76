//! Parley core library — session state, chat backend clients, and the
//! controllers shared by the CLI and desktop applications.

pub mod api;
pub mod auth;
pub mod chats;
pub mod config;
pub mod models;
pub mod thread;
pub mod tools;
