pub mod about;
pub mod align;
pub mod amplifier;
pub mod blast;
pub mod candidate;
pub mod classify;
pub mod config;
pub mod error;
pub mod filter;
pub mod isoform;
pub mod jobs;
pub mod output;
pub mod pipeline;
pub mod sequence;
pub mod spacing;
pub mod subsample;
pub mod swap;
pub mod thermo;
