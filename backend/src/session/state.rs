use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{AnalysisState, ErrorResponse};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::object_store::object_url;
use crate::error::DiagnosisError;
use crate::ingest::UploadedImage;
use crate::pipeline::CancelToken;
use crate::report::DiagnosisReport;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(Uuid),
    #[error("An analysis is already in progress for this session")]
    AnalysisInProgress,
    #[error("Cannot {action} while the session is {state}")]
    InvalidTransition {
        state: AnalysisState,
        action: &'static str,
    },
    #[error(transparent)]
    Diagnosis(#[from] DiagnosisError),
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "NotFound",
            SessionError::AnalysisInProgress => "AnalysisInProgress",
            SessionError::InvalidTransition { .. } => "InvalidTransition",
            SessionError::Diagnosis(err) => err.kind(),
        }
    }
}

/// What a client sees when it polls a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub state: AnalysisState,
    pub created_at: DateTime<Utc>,
    pub file_name: Option<String>,
    pub preview_url: Option<String>,
    pub overlay_url: Option<String>,
    pub report: Option<DiagnosisReport>,
    pub error: Option<ErrorResponse>,
}

/// Work handed out of the session lock when an analysis starts.
#[derive(Debug)]
pub struct AnalysisTicket {
    pub upload: UploadedImage,
    pub cancel: CancelToken,
}

/// One user's upload-and-analyze lifecycle.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    state: AnalysisState,
    created_at: DateTime<Utc>,
    upload: Option<UploadedImage>,
    preview: Option<Uuid>,
    overlay: Option<Uuid>,
    report: Option<DiagnosisReport>,
    last_error: Option<ErrorResponse>,
    cancel: Option<CancelToken>,
    touched: Instant,
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: AnalysisState::Idle,
            created_at: Utc::now(),
            upload: None,
            preview: None,
            overlay: None,
            report: None,
            last_error: None,
            cancel: None,
            touched: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> AnalysisState {
        self.state
    }

    pub fn touch(&mut self) {
        self.touched = Instant::now();
    }

    /// Time since the session was last read or changed.
    pub fn idle_for(&self) -> Duration {
        self.touched.elapsed()
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state,
            action,
        }
    }

    /// Enters `Uploading`. Returns the preview and overlay objects the new
    /// upload supersedes.
    pub fn begin_upload(&mut self) -> Result<Vec<Uuid>, SessionError> {
        match self.state {
            AnalysisState::Idle | AnalysisState::Validated | AnalysisState::Complete => {}
            AnalysisState::Analyzing => return Err(SessionError::AnalysisInProgress),
            AnalysisState::Uploading | AnalysisState::Failed => return Err(self.invalid("upload")),
        }
        self.state = AnalysisState::Uploading;
        self.upload = None;
        self.report = None;
        self.last_error = None;
        Ok(self.preview.take().into_iter().chain(self.overlay.take()).collect())
    }

    /// Leaves `Uploading` for `Validated`, or back to `Idle` when the file was rejected.
    pub fn finish_upload(&mut self, result: Result<(UploadedImage, Uuid), DiagnosisError>) -> Result<(), SessionError> {
        if self.state != AnalysisState::Uploading {
            return Err(self.invalid("finish an upload"));
        }
        match result {
            Ok((upload, preview)) => {
                self.state = AnalysisState::Validated;
                self.upload = Some(upload);
                self.preview = Some(preview);
                Ok(())
            }
            Err(err) => {
                self.state = AnalysisState::Idle;
                self.last_error = Some(error_body(&err));
                Err(err.into())
            }
        }
    }

    /// Enters `Analyzing`. Returns the work to run and the overlay it supersedes.
    pub fn begin_analysis(&mut self) -> Result<(AnalysisTicket, Option<Uuid>), SessionError> {
        match self.state {
            AnalysisState::Validated | AnalysisState::Complete => {}
            AnalysisState::Analyzing => return Err(SessionError::AnalysisInProgress),
            _ => return Err(self.invalid("analyze")),
        }
        let upload = self.upload.clone().ok_or_else(|| self.invalid("analyze"))?;
        let cancel = CancelToken::new();
        self.state = AnalysisState::Analyzing;
        self.cancel = Some(cancel.clone());
        self.report = None;
        self.last_error = None;
        Ok((AnalysisTicket { upload, cancel }, self.overlay.take()))
    }

    pub fn finish_analysis(&mut self, result: Result<(DiagnosisReport, Uuid), DiagnosisError>) -> Result<(), SessionError> {
        if self.state != AnalysisState::Analyzing {
            return Err(self.invalid("finish an analysis"));
        }
        self.cancel = None;
        match result {
            Ok((report, overlay)) => {
                self.state = AnalysisState::Complete;
                self.report = Some(report);
                self.overlay = Some(overlay);
                Ok(())
            }
            Err(err) => {
                self.state = AnalysisState::Failed;
                self.last_error = Some(error_body(&err));
                Err(err.into())
            }
        }
    }

    /// `Failed → Idle`. Returns the objects released with the failed upload.
    pub fn retry(&mut self) -> Result<Vec<Uuid>, SessionError> {
        if self.state != AnalysisState::Failed {
            return Err(self.invalid("retry"));
        }
        self.state = AnalysisState::Idle;
        self.upload = None;
        self.last_error = None;
        Ok(self.preview.take().into_iter().chain(self.overlay.take()).collect())
    }

    /// Cancels any in-flight analysis and hands back every object the session owns.
    pub fn close(mut self) -> Vec<Uuid> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.preview.take().into_iter().chain(self.overlay.take()).collect()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id,
            state: self.state,
            created_at: self.created_at,
            file_name: self
                .upload
                .as_ref()
                .and_then(|u| u.file_name().map(str::to_string)),
            preview_url: self.preview.map(object_url),
            overlay_url: self.overlay.map(object_url),
            report: self.report.clone(),
            error: self.last_error.clone(),
        }
    }
}

pub fn error_body(err: &DiagnosisError) -> ErrorResponse {
    ErrorResponse {
        error: err.to_string(),
        kind: err.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attention::synthesize_attention;
    use crate::inference::PredictionSet;
    use crate::report::{ReportContext, assemble};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::Duration;

    fn upload() -> UploadedImage {
        UploadedImage::new(vec![0x89, b'P', b'N', b'G'], "image/png", Some("eye.png".to_string()))
    }

    fn report() -> DiagnosisReport {
        assemble(
            PredictionSet::from_primary(1, 0.8).unwrap(),
            synthesize_attention(1, &mut StdRng::seed_from_u64(3)),
            ReportContext {
                model_used: "Mock Model (demo)".to_string(),
                elapsed: Duration::from_millis(900),
                advice: None,
                image_digest: "d".to_string(),
            },
        )
        .unwrap()
    }

    fn validated() -> Session {
        let mut session = Session::new(Uuid::new_v4());
        session.begin_upload().unwrap();
        session.finish_upload(Ok((upload(), Uuid::new_v4()))).unwrap();
        session
    }

    #[test]
    fn happy_path_reaches_complete() {
        let mut session = validated();
        assert_eq!(session.state(), AnalysisState::Validated);

        let (ticket, superseded) = session.begin_analysis().unwrap();
        assert!(superseded.is_none());
        assert_eq!(ticket.upload.file_name(), Some("eye.png"));
        assert_eq!(session.state(), AnalysisState::Analyzing);

        let overlay = Uuid::new_v4();
        session.finish_analysis(Ok((report(), overlay))).unwrap();
        let view = session.view();
        assert_eq!(view.state, AnalysisState::Complete);
        assert_eq!(view.overlay_url, Some(object_url(overlay)));
        assert!(view.report.is_some());
        assert!(view.error.is_none());
    }

    #[test]
    fn second_analysis_is_rejected_while_running() {
        let mut session = validated();
        session.begin_analysis().unwrap();
        assert!(matches!(session.begin_analysis(), Err(SessionError::AnalysisInProgress)));
        assert!(matches!(session.begin_upload(), Err(SessionError::AnalysisInProgress)));
    }

    #[test]
    fn rejected_upload_returns_to_idle() {
        let mut session = Session::new(Uuid::new_v4());
        session.begin_upload().unwrap();
        let err = session
            .finish_upload(Err(DiagnosisError::InvalidFileType("image/gif".to_string())))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidFileType");
        let view = session.view();
        assert_eq!(view.state, AnalysisState::Idle);
        assert_eq!(view.error.unwrap().kind, "InvalidFileType");
    }

    #[test]
    fn failure_then_retry() {
        let mut session = validated();
        session.begin_analysis().unwrap();
        session
            .finish_analysis(Err(DiagnosisError::DecodeFailure("truncated".to_string())))
            .unwrap_err();
        assert_eq!(session.state(), AnalysisState::Failed);
        assert!(matches!(session.begin_upload(), Err(SessionError::InvalidTransition { .. })));

        let released = session.retry().unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(session.state(), AnalysisState::Idle);
        assert!(matches!(session.retry(), Err(SessionError::InvalidTransition { .. })));
    }

    #[test]
    fn reanalysis_and_new_upload_supersede_objects() {
        let mut session = validated();
        session.begin_analysis().unwrap();
        let overlay = Uuid::new_v4();
        session.finish_analysis(Ok((report(), overlay))).unwrap();

        let (_, superseded) = session.begin_analysis().unwrap();
        assert_eq!(superseded, Some(overlay));
        let second = Uuid::new_v4();
        session.finish_analysis(Ok((report(), second))).unwrap();

        let released = session.begin_upload().unwrap();
        assert_eq!(released.len(), 2);
        assert!(released.contains(&second));
        assert!(session.view().report.is_none());
    }

    #[test]
    fn idle_session_cannot_analyze() {
        let mut session = Session::new(Uuid::new_v4());
        let err = session.begin_analysis().err().unwrap();
        assert_eq!(err.to_string(), "Cannot analyze while the session is Idle");
    }

    #[test]
    fn close_cancels_running_analysis() {
        let mut session = validated();
        let (ticket, _) = session.begin_analysis().unwrap();
        let released = session.close();
        assert!(ticket.cancel.is_cancelled());
        assert_eq!(released.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn touch_resets_idle_time() {
        let mut session = Session::new(Uuid::new_v4());
        tokio::time::advance(Duration::from_secs(90)).await;
        assert!(session.idle_for() >= Duration::from_secs(90));
        session.touch();
        assert_eq!(session.idle_for(), Duration::ZERO);
    }
}
