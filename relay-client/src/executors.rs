//! Executor API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use relay_core::domain::executor::ExecutorStatus;

impl OrchestratorClient {
    /// Health and load of every registered executor kind
    pub async fn list_executors(&self) -> Result<Vec<ExecutorStatus>> {
        let response = self.client.get(self.url("/executors")).send().await?;
        self.handle_response(response).await
    }
}
