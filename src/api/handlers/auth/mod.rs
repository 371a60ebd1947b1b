//! Auth handlers hosting the seed gate.
//!
//! ## Sessions
//!
//! A login mints a session credential and keeps it server side in the
//! [`SessionRegistry`], keyed by the hash of a random cookie token. Every
//! session check re-validates the stored credential against the principal's
//! current seed, so a rotation ends the session on its next use.
//!
//! ## Remember-me
//!
//! With `remember_me` the login also issues a `<series>.<secret>` cookie. When
//! a request arrives without a session, the cookie is redeemed: a new session
//! is opened and the cookie secret is replaced. Presenting an old secret again
//! revokes the whole series.

mod cookies;
pub mod login;
pub mod logout;
pub mod rotate;
pub mod session;
mod state;
pub mod types;

pub use cookies::{REMEMBER_COOKIE_NAME, SESSION_COOKIE_NAME};
pub use state::{AuthConfig, AuthState, SessionRegistry, spawn_sweeper};
