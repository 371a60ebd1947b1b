//! # Seedgate (per-principal credential revocation)
//!
//! Every principal owns a rotating secret, the *seed*. Each session and
//! remember-me credential issued to a client carries a copy of the seed that
//! was current when it was minted. On every authenticated request the embedded
//! copy is compared against the principal's current seed; rotating the seed
//! therefore revokes every outstanding credential for that principal at once,
//! without enumerating sessions.
//!
//! ## Layout
//!
//! - [`seed`]: generation, storage, minting, validation and rotation.
//! - [`api`]: an axum host that exposes login, session checks, rotation and logout
//!   over cookies.
//! - [`cli`]: command-line parsing, telemetry and server startup.

pub mod api;
pub mod cli;
pub mod seed;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
