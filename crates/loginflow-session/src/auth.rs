//! The authentication service the login workflow drives.
//!
//! loginflow doesn't talk HTTP itself. Token exchange, the `/me` lookup
//! and logout belong to whatever backend the application uses, so the
//! workflow only sees the [`Authenticator`] trait and calls it in a fixed
//! order:
//!
//! ```text
//! retrieve_token → set_token → get_user → set_user_info
//!                                   │
//!                                   └─(failure)─→ logout
//! ```

use std::future::Future;
use std::time::SystemTime;

use crate::{AuthError, HttpError, TokenGrant, UserProfile};

/// Exchanges credentials for a token and loads the authenticated user.
///
/// # Trait bounds
///
/// - `Send + Sync`: the workflow is a cloneable handle and may be driven
///   from any task.
/// - `'static`: the authenticator lives as long as the workflow.
///
/// # Example
///
/// ```rust
/// use std::time::{Duration, SystemTime};
///
/// use loginflow_session::{
///     AuthError, Authenticator, CredentialRejection, HttpError, TokenGrant,
///     UserId, UserProfile,
/// };
///
/// /// Accepts a single hard-coded user. Only for development.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn retrieve_token(
///         &self,
///         username: &str,
///         password: &str,
///     ) -> Result<TokenGrant, AuthError> {
///         if username == "admin" && password == "admin" {
///             Ok(TokenGrant::new(
///                 "dev-token",
///                 SystemTime::now() + Duration::from_secs(1800),
///             ))
///         } else {
///             Err(AuthError::Rejected(CredentialRejection::generic(
///                 "Unable to log in with provided credentials.",
///             )))
///         }
///     }
///
///     fn set_token(&self, _expires: SystemTime) {}
///
///     async fn get_user(&self) -> Result<UserProfile, HttpError> {
///         Ok(UserProfile::new(UserId(1), "admin"))
///     }
///
///     async fn logout(&self) -> Result<(), HttpError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Exchanges a username and password for a token.
    ///
    /// # Returns
    /// - `Ok(TokenGrant)`: the token and when it expires
    /// - `Err(AuthError::Rejected)`: the server refused the credentials and
    ///   sent a rejection payload (generic or per-field)
    /// - `Err(AuthError::Unavailable)`: anything else
    fn retrieve_token(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<TokenGrant, AuthError>> + Send;

    /// Stores the token expiry for later requests.
    fn set_token(&self, expires: SystemTime);

    /// Loads the profile of the user the current token belongs to.
    fn get_user(&self) -> impl Future<Output = Result<UserProfile, HttpError>> + Send;

    /// Stores the loaded profile. Called once per successful user fetch.
    fn set_user_info(&self, _profile: &UserProfile) {}

    /// Invalidates the current token.
    fn logout(&self) -> impl Future<Output = Result<(), HttpError>> + Send;
}
