pub mod pkce;
pub mod server;

pub use server::{AuthConfig, AuthServer};
