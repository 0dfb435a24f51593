//! Terminal client and headless sync agent for an LMS backend.
//!
//! `main` builds one [`lms::Services`] per process and hands it to the
//! [`runtime::Runtime`], which owns the connectivity monitor, the WebSocket
//! client and the sync loop. The TUI in [`app`] sits on top of both.

pub mod app;
pub mod cache;
pub mod chat;
pub mod commands;
pub mod config;
pub mod event;
pub mod http;
pub mod lms;
pub mod logging;
pub mod query;
pub mod runtime;
pub mod session;
pub mod subject;
pub mod sync;
pub mod toast;
pub mod ui;
pub mod ws;
