pub mod candidate;
pub mod cli;
pub mod client;
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod store;
pub mod telegram;

pub use candidate::{Candidate, CandidateSet, Profile, ScrapeStats};
pub use client::{ClientError, Gateway, Post, Session};
pub use config::Config;
