//! SocialHub credential primitives.
//!
//! - `password`: Argon2id hashing for account passwords
//! - `totp`: RFC 6238 one-time codes for the second factor
//! - `state`: signed OAuth `state` tokens binding a provider callback to the
//!   user who started the connection

pub mod password;
pub mod state;
pub mod totp;
