//! rate_terminal — command-line front end for `rate_engine`.
//!
//! `app` holds the clap surface and run loop, `store` the Parquet history
//! files written by the `fetch_data` binary.

pub mod app;
pub mod store;
