//! Project-wide constants.

use std::path::PathBuf;
use std::time::Duration;

/// OAuth client identifier presented to lichess. Public PKCE client,
/// no secret attached to it.
pub const CLIENT_ID: &str = "gambit-bridge";

/// Authorization endpoint the browser is redirected to.
pub const AUTHORIZE_URL: &str = "https://lichess.org/oauth";

/// Token exchange endpoint.
pub const TOKEN_URL: &str = "https://lichess.org/api/token";

/// Base for engine registration and management.
pub const API_BASE: &str = "https://lichess.org/api";

/// Base for the analysis work queue (separate host on lichess).
pub const ENGINE_BASE: &str = "https://engine.lichess.ovh/api";

/// Where declined authorization attempts are sent.
pub const HELP_URL: &str = "https://github.com/gambit-bridge/gambit#authorizing";

/// Where the browser lands after a successful authorization.
pub const COMPLETED_URL: &str = "https://lichess.org/analysis";

/// How long an issued OAuth `state` stays redeemable.
pub const STATE_TTL: Duration = Duration::from_secs(500);

/// Fixed search depth for non-infinite jobs, and the `defaultDepth`
/// advertised in the engine descriptor.
pub const DEFAULT_DEPTH: u32 = 6;

/// `maxHash` (MiB) advertised in the engine descriptor.
pub const MAX_HASH: u32 = 1024;

/// Store key holding the provider secret.
pub const SECRET_KEY: &str = "provider-secret";

/// Store key prefix for `token -> engine id` mappings.
pub const ENGINE_ID_PREFIX: &str = "engine-id:";

/// Default database path: `~/.gambit/gambit.db`.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .expect("cannot determine home directory")
        .join(".gambit")
        .join("gambit.db")
}
