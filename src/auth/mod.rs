/// Authentication module
///
/// Password hashing, JWT issuing/parsing, refresh token revocation and the
/// session manager that ties them together.

mod claims;
mod jwt;
mod password;
mod revocation;
mod session;

pub use claims::{Claims, TokenKind};
pub use jwt::{IssuedToken, TokenCodec};
pub use password::{verify_digest, Credential, PasswordHash, PasswordHasher};
pub use revocation::{spawn_purge_task, RevocationRegistry, RevokeOutcome};
pub use session::{LoginOutcome, LogoutOutcome, RefreshOutcome, SessionManager, SessionPolicy};
