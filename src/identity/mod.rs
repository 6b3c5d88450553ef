//! Identity-provider adapters and bearer-token handling.
//! Keep the public surface thin and split implementation across sub-modules.

mod local;
mod principal;
mod provider;
mod token;

pub use local::LocalIdentityProvider;
pub use principal::Principal;
pub use provider::{HostedIdentityProvider, IdentityProvider};
pub use token::{Claims, TokenService, TOKEN_TTL_SECS};
