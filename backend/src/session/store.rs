use shared::{AnalysisState, SessionCreated};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::object_store::ObjectStore;
use super::state::{AnalysisTicket, Session, SessionError, SessionView};
use crate::config::DEFAULT_SESSION_TTL_SECS;
use crate::error::DiagnosisError;
use crate::ingest::UploadedImage;
use crate::pipeline::{CancelToken, DiagnosisPipeline};

/// All live sessions plus the objects they own. Locks are never held across an await.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
    objects: Arc<ObjectStore>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }
}

/// Settles the session as cancelled if its analysis future is dropped mid-run.
struct PendingAnalysis<'a> {
    store: &'a SessionStore,
    id: Uuid,
    cancel: CancelToken,
    settled: bool,
}

impl Drop for PendingAnalysis<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.cancel.cancel();
        let abandoned = self
            .store
            .with_session(self.id, |session| session.finish_analysis(Err(DiagnosisError::Cancelled)));
        if let Err(SessionError::Diagnosis(_)) = abandoned {
            log::warn!("Analysis for session {} dropped before completion", self.id);
        }
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions untouched for longer than `ttl` are closed by [`SessionStore::evict_idle`].
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            objects: Arc::default(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut sessions = self.sessions();
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        session.touch();
        f(session)
    }

    pub fn create(&self) -> SessionCreated {
        self.evict_idle();
        let session = Session::new(Uuid::new_v4());
        let created = SessionCreated {
            session_id: session.id(),
            state: session.state(),
        };
        self.sessions().insert(session.id(), session);
        log::info!("Created session {}", created.session_id);
        created
    }

    pub fn view(&self, id: Uuid) -> Result<SessionView, SessionError> {
        self.with_session(id, |session| Ok(session.view()))
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes a fully received file through `Uploading`, releasing whatever it
    /// supersedes. A rejected file sends the session back to `Idle` with the
    /// error recorded.
    pub fn upload(
        &self,
        id: Uuid,
        pipeline: &DiagnosisPipeline,
        received: Result<UploadedImage, DiagnosisError>,
    ) -> Result<SessionView, SessionError> {
        self.begin_upload(id)?;
        self.finish_upload(id, pipeline, received)
    }

    fn begin_upload(&self, id: Uuid) -> Result<(), SessionError> {
        let superseded = self.with_session(id, Session::begin_upload)?;
        self.objects.revoke_all(superseded);
        Ok(())
    }

    fn finish_upload(
        &self,
        id: Uuid,
        pipeline: &DiagnosisPipeline,
        received: Result<UploadedImage, DiagnosisError>,
    ) -> Result<SessionView, SessionError> {
        let result = received
            .and_then(|upload| pipeline.validate(&upload).map(|()| upload))
            .map(|upload| {
                let preview = self.objects.put(&upload);
                (upload, preview)
            });
        let preview = result.as_ref().ok().map(|(_, preview)| *preview);

        let finished = self.with_session(id, |session| {
            session.finish_upload(result)?;
            Ok(session.view())
        });
        match (&finished, preview) {
            (Ok(view), _) => log::info!(
                "Session {} accepted {}",
                id,
                view.file_name.as_deref().unwrap_or("unnamed upload")
            ),
            // the session vanished or left Uploading underneath us
            (Err(_), Some(preview)) => {
                self.objects.revoke(preview);
            }
            (Err(_), None) => {}
        }
        finished
    }

    /// Runs the pipeline for the session's validated upload. Dropping the
    /// returned future leaves the session `Failed` with a cancellation error.
    pub async fn analyze(&self, id: Uuid, pipeline: &DiagnosisPipeline) -> Result<SessionView, SessionError> {
        let (AnalysisTicket { upload, cancel }, superseded) = self.with_session(id, Session::begin_analysis)?;
        if let Some(overlay) = superseded {
            self.objects.revoke(overlay);
        }
        log::info!("Session {} analyzing {} bytes", id, upload.size());

        let mut pending = PendingAnalysis {
            store: self,
            id,
            cancel: cancel.clone(),
            settled: false,
        };
        let result = pipeline.run(&upload, &cancel).await;
        pending.settled = true;

        let result = result.map(|outcome| (outcome.report, self.objects.put(outcome.overlay)));
        let overlay = result.as_ref().ok().map(|(_, overlay)| *overlay);
        if let Err(err) = &result {
            log::warn!("Analysis for session {} failed: {}", id, err);
        }

        let finished = self.with_session(id, |session| {
            session.finish_analysis(result)?;
            Ok(session.view())
        });
        match finished {
            Err(SessionError::NotFound(_)) => {
                if let Some(overlay) = overlay {
                    self.objects.revoke(overlay);
                }
                Err(SessionError::Diagnosis(DiagnosisError::Cancelled))
            }
            other => other,
        }
    }

    pub fn retry(&self, id: Uuid) -> Result<SessionView, SessionError> {
        let (released, view) = self.with_session(id, |session| {
            let released = session.retry()?;
            Ok((released, session.view()))
        })?;
        self.objects.revoke_all(released);
        Ok(view)
    }

    /// Removes the session, cancelling its analysis and revoking its objects.
    pub fn delete(&self, id: Uuid) -> Result<(), SessionError> {
        let session = self.sessions().remove(&id).ok_or(SessionError::NotFound(id))?;
        let released = session.close();
        self.objects.revoke_all(released);
        log::info!("Deleted session {}", id);
        Ok(())
    }

    /// Closes every session idle for longer than the TTL and returns how many
    /// went. Sessions with a running analysis are kept.
    pub fn evict_idle(&self) -> usize {
        let expired: Vec<Session> = {
            let mut sessions = self.sessions();
            let stale: Vec<Uuid> = sessions
                .values()
                .filter(|s| s.state() != AnalysisState::Analyzing && s.idle_for() > self.ttl)
                .map(Session::id)
                .collect();
            stale.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        let evicted = expired.len();
        for session in expired {
            let id = session.id();
            self.objects.revoke_all(session.close());
            log::info!("Evicted idle session {}", id);
        }
        evicted
    }

    /// Calls [`SessionStore::evict_idle`] every `period` until the task is dropped.
    pub async fn sweep_every(self, period: Duration) {
        let mut ticks = tokio::time::interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            let evicted = self.evict_idle();
            if evicted > 0 {
                log::debug!("Sweep closed {} idle sessions, {} remain", evicted, self.len());
            }
        }
    }
}
