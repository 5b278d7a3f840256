#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod feed;
pub mod images;
pub mod likes;
pub mod model;
pub mod navigation;
pub mod notify;
pub mod session;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
pub use client::{Client, ClientConfig, Request};
pub use error::{ApiError, ErrorKind};
pub use feed::{CommentFeed, Feed};
pub use notify::{Notice, Notifier};
