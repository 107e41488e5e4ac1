//! License lookup contract.

use std::future::Future;

use crate::HttpError;

/// Fetches and validates the product license.
///
/// The workflow never looks at the license itself. It only needs to know
/// whether [`get_config`](Self::get_config) succeeded; [`test`](Self::test)
/// then updates whatever in-memory license state the checker keeps.
pub trait LicenseChecker: Send + Sync + 'static {
    /// Loads the configuration that carries the license.
    ///
    /// Every error returned here ends the login with a post-auth failure.
    fn get_config(&self) -> impl Future<Output = Result<(), HttpError>> + Send;

    /// Evaluates the loaded license.
    fn test(&self);
}
