//! Event log API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use relay_core::domain::event::Event;
use relay_core::dto::event::{ClearedEvents, EventQuery};

impl OrchestratorClient {
    /// Query the event log
    pub async fn list_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let response = self
            .client
            .get(self.url("/events"))
            .query(query)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Hide everything recorded so far from later queries
    pub async fn clear_events(&self) -> Result<ClearedEvents> {
        let response = self.client.post(self.url("/events/clear")).send().await?;
        self.handle_response(response).await
    }
}
