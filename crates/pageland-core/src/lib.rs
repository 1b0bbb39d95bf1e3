//! Pageland Core Library
//!
//! This crate provides shared types, errors, configuration and the clock
//! abstraction used by the ad history and site visit crates.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AdsConfig;
pub use error::{AdsError, AdsResult};
pub use types::{AdInfo, AdType, ConfirmationType, CreativeAd, Tab, TabId};
