use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::proto::Record;
use super::session::{ConnectParams, ControllerError, Session};

/// Owner of the single controller connection.
///
/// The session is established lazily on first use and re-established after
/// any transport-level failure. All command traffic serializes on the inner
/// mutex, so at most one connection attempt and one in-flight command exist
/// at a time.
pub struct Controller {
    params: ConnectParams,
    session: Mutex<Option<Session>>,
}

impl Controller {
    pub fn new(params: ConnectParams) -> Self {
        Self {
            params,
            session: Mutex::new(None),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ConnectParams::from_env())
    }

    /// Establish the session if none is held. Used by callers that want a
    /// connection failure up front instead of per-command.
    pub async fn ensure_connected(&self) -> Result<(), ControllerError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            debug!(host = %self.params.host, port = self.params.port, "establishing controller session");
            *guard = Some(Session::connect(&self.params).await?);
        }
        Ok(())
    }

    /// Issue one command and return the normalized record list. On any
    /// transport-level error the held session is discarded so the next call
    /// connects fresh; a command-level trap keeps the session.
    pub async fn execute(
        &self,
        command: &str,
        args: &[String],
    ) -> Result<Vec<Record>, ControllerError> {
        let mut guard = self.session.lock().await;
        let mut session = match guard.take() {
            Some(live) => live,
            None => {
                debug!(host = %self.params.host, port = self.params.port, "establishing controller session");
                Session::connect(&self.params).await?
            }
        };

        match session.run(command, args).await {
            Ok(records) => {
                *guard = Some(session);
                Ok(records)
            }
            Err(err) if err.is_transport_dead() => Err(err),
            Err(err) => {
                *guard = Some(session);
                Err(err)
            }
        }
    }

    /// Read-path wrapper: failures are logged and flattened to an empty
    /// record list. Callers must not treat an empty result as proof of
    /// absence before a destructive command.
    pub async fn query(&self, command: &str, args: &[String]) -> Vec<Record> {
        match self.execute(command, args).await {
            Ok(records) => records,
            Err(err) => {
                warn!(%command, %err, "controller query failed; treating as empty");
                Vec::new()
            }
        }
    }

    /// Best-effort teardown; failures are swallowed since the goal is
    /// resource release.
    pub async fn close(&self) {
        let mut guard = self.session.lock().await;
        if let Some(mut session) = guard.take() {
            if let Err(err) = session.shutdown().await {
                debug!(%err, "controller session teardown failed");
            }
        }
    }
}
