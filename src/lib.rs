pub mod auth;
pub mod bridge;
pub mod consts;
pub mod dispatch;
pub mod registry;
pub mod secret;
pub mod store;
