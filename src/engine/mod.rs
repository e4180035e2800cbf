use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::mapping::SyncContext;
use crate::storage::Integration;

pub mod http;
pub mod lookup;
pub mod session;
pub mod sync;
pub mod tester;

pub use lookup::LookupResult;
pub use session::{Session, SessionManager};
pub use sync::SyncResult;
pub use tester::TestConnectionResult;

/// Bound on one whole pipeline (login + create, or login + lookup) so a
/// stalled third party cannot hang the caller's workflow.
pub const PIPELINE_TIMEOUT: Duration = Duration::from_secs(60);

/// Entry point for all live traffic against external CRM systems.
///
/// Holds the shared HTTP client and a per-integration lock table:
/// operations for different integrations run freely in parallel, while
/// operations for the same integration serialize across the whole
/// authenticate-then-act pipeline: parallel logins would flood the remote
/// system and race one attempt's cookie jar against another's.
pub struct SyncEngine {
    http: Client,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            http: http::build_client(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().unwrap().entry(id).or_default().clone()
    }

    /// Authenticates and submits one invoice. The session lives and dies
    /// inside this call; cancelling the returned future aborts the
    /// in-flight HTTP request with it.
    pub async fn sync_invoice(
        &self,
        integration: &Integration,
        password: &str,
        context: &SyncContext,
    ) -> Result<SyncResult> {
        let lock = self.lock_for(integration.id);
        let _guard = lock.lock().await;

        tokio::time::timeout(PIPELINE_TIMEOUT, async {
            let manager = SessionManager::new(self.http.clone());
            let mut session = manager.authenticate(integration, password).await?;
            sync::create_invoice(&self.http, integration, &mut session, context).await
        })
        .await
        .map_err(|_| pipeline_timeout())?
    }

    /// Authenticates and resolves the PDF link of an already-synced
    /// invoice. Read-only on the remote side; callers may retry.
    pub async fn find_invoice_pdf(
        &self,
        integration: &Integration,
        password: &str,
        invoice_number: &str,
    ) -> Result<LookupResult> {
        let lock = self.lock_for(integration.id);
        let _guard = lock.lock().await;

        tokio::time::timeout(PIPELINE_TIMEOUT, async {
            let manager = SessionManager::new(self.http.clone());
            let mut session = manager.authenticate(integration, password).await?;
            lookup::find_invoice_pdf(&self.http, integration, &mut session, invoice_number).await
        })
        .await
        .map_err(|_| pipeline_timeout())?
    }

    /// Runs the login handshake only, for configuration validation. Zero
    /// side effects on the remote system.
    pub async fn test_connection(
        &self,
        integration: &Integration,
        password: &str,
    ) -> TestConnectionResult {
        let lock = self.lock_for(integration.id);
        let _guard = lock.lock().await;

        let manager = SessionManager::new(self.http.clone());
        let outcome = match tokio::time::timeout(
            PIPELINE_TIMEOUT,
            manager.authenticate(integration, password),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(pipeline_timeout()),
        };
        tester::result_from(outcome)
    }
}

fn pipeline_timeout() -> Error {
    Error::Network(format!(
        "pipeline timed out after {}s",
        PIPELINE_TIMEOUT.as_secs()
    ))
}
