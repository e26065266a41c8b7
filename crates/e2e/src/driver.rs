//! Page driver abstraction

use async_trait::async_trait;

use crate::error::E2eResult;
use crate::network::NetworkLog;
use crate::spec::UiCommand;

/// A browser page the runner can act on and observe.
///
/// Implementations record every request the page completes into the
/// [`NetworkLog`] returned by [`PageDriver::network`].
#[async_trait]
pub trait PageDriver: Send {
    /// Perform a UI interaction
    async fn perform(&mut self, command: &UiCommand) -> E2eResult<()>;

    /// Text content of every element matching `selector`, in document order
    async fn query(&mut self, selector: &str) -> E2eResult<Vec<String>>;

    /// Handle to the page's intercepted traffic
    fn network(&self) -> NetworkLog;

    /// Release the page
    async fn close(&mut self) -> E2eResult<()>;
}
