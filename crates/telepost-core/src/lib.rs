//! # Telepost Core
//!
//! Shared types, configuration, errors, and the seams the dispatch engine
//! plugs into: the `DeliveryPort` (where rendered posts go) and the `Clock`
//! (so retry and catch-up timing stay deterministic under test).

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::TelepostConfig;
pub use error::{Result, TelepostError};
pub use traits::{Clock, Delivery, DeliveryError, DeliveryPort, SystemClock};
pub use types::{
    BlacklistRule, Channel, ChannelRef, InlineButton, MediaItem, Post, PostOptions, PostStatus,
    Publication, PublicationStatus, RenderedPost, RuleKind,
};
