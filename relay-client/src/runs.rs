//! Run-related API endpoints

use crate::OrchestratorClient;
use crate::error::{ClientError, Result};
use relay_core::domain::event::Event;
use relay_core::domain::outcome::RunOutcome;
use relay_core::domain::result::TaskResult;
use relay_core::domain::run::Run;
use relay_core::dto::run::{ListRunsQuery, RunHandle, RunListing, RunView, SubmitRun};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Submission & Control
    // =============================================================================

    /// Submit text and start a run
    ///
    /// Returns as soon as the run is accepted; the run proceeds in the
    /// background.
    pub async fn submit_run(&self, req: SubmitRun) -> Result<RunHandle> {
        let response = self.client.post(self.url("/runs")).json(&req).send().await?;
        self.handle_response(response).await
    }

    /// Cancel a non-terminal run
    ///
    /// Fails with status 409 when the run has already finished.
    pub async fn cancel_run(&self, id: Uuid) -> Result<RunHandle> {
        let url = self.url(&format!("/runs/{}/cancel", id));
        let response = self.client.post(&url).send().await?;
        self.handle_response(response).await
    }

    // =============================================================================
    // Run Queries
    // =============================================================================

    /// List runs, newest first
    pub async fn list_runs(&self, view: RunView) -> Result<Vec<RunListing>> {
        let response = self
            .client
            .get(self.url("/runs"))
            .query(&ListRunsQuery { view })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Get a run with its descriptors and results
    pub async fn get_run(&self, id: Uuid) -> Result<Run> {
        let response = self.client.get(self.url(&format!("/runs/{}", id))).send().await?;
        self.handle_response(response).await
    }

    /// Results recorded so far, in task order
    pub async fn get_results(&self, id: Uuid) -> Result<Vec<TaskResult>> {
        let url = self.url(&format!("/runs/{}/results", id));
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    /// Outcome of a terminal run
    ///
    /// Fails with status 409 while the run is still going.
    pub async fn get_outcome(&self, id: Uuid) -> Result<RunOutcome> {
        let url = self.url(&format!("/runs/{}/outcome", id));
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    /// Events recorded for a run, oldest first
    pub async fn get_run_events(&self, id: Uuid) -> Result<Vec<Event>> {
        let url = self.url(&format!("/runs/{}/events", id));
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    /// Poll a run until it is completed or failed
    pub async fn wait_for_run(&self, id: Uuid, poll: Duration, timeout: Duration) -> Result<Run> {
        let deadline = Instant::now() + timeout;
        loop {
            let run = self.get_run(id).await?;
            if run.state.is_terminal() {
                return Ok(run);
            }
            if Instant::now() >= deadline {
                return Err(ClientError::WaitTimeout(id));
            }
            tracing::debug!("Run {} is {}, waiting", id, run.state);
            tokio::time::sleep(poll).await;
        }
    }
}
