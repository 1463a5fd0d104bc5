use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;
use log::{error, info, warn};
use serde::Serialize;
use shared::ErrorResponse;
use uuid::Uuid;

use crate::error::DiagnosisError;
use crate::ingest::{self, UploadedImage};
use crate::pipeline::{CancelToken, DiagnosisPipeline};
use crate::report::DiagnosisReport;
use crate::session::{SessionError, SessionStore, StoredObject};

const UPLOAD_FIELD: &str = "file";

#[derive(Debug, thiserror::Error)]
enum UploadReadError {
    #[error("Multipart field 'file' is missing")]
    MissingFile,
    #[error("Malformed multipart body: {0}")]
    Multipart(String),
    #[error(transparent)]
    Rejected(#[from] DiagnosisError),
}

#[derive(Serialize)]
struct InferenceResponse {
    report: DiagnosisReport,
    overlay_data_url: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, frontend_dir: String) {
    cfg.service(web::resource("/api/inference").route(web::post().to(handle_inference)))
        .service(web::resource("/api/model/status").route(web::get().to(model_status)))
        .service(web::resource("/api/sessions").route(web::post().to(create_session)))
        .service(
            web::resource("/api/sessions/{session_id}")
                .route(web::get().to(get_session))
                .route(web::delete().to(delete_session)),
        )
        .service(web::resource("/api/sessions/{session_id}/upload").route(web::post().to(upload_image)))
        .service(web::resource("/api/sessions/{session_id}/analyze").route(web::post().to(analyze_session)))
        .service(web::resource("/api/sessions/{session_id}/retry").route(web::post().to(retry_session)))
        .service(web::resource("/api/objects/{object_id}").route(web::get().to(get_object)))
        .service(Files::new("/static", frontend_dir).show_files_listing());
}

fn error_json(status: StatusCode, error: String, kind: &str) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error,
        kind: kind.to_string(),
    })
}

fn diagnosis_status(err: &DiagnosisError) -> StatusCode {
    match err {
        DiagnosisError::InvalidFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        DiagnosisError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        DiagnosisError::DecodeFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DiagnosisError::ModelUnavailable(_) => StatusCode::BAD_GATEWAY,
        DiagnosisError::AssemblyFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        DiagnosisError::Cancelled => StatusCode::CONFLICT,
    }
}

fn diagnosis_error_response(err: &DiagnosisError) -> HttpResponse {
    error_json(diagnosis_status(err), err.to_string(), err.kind())
}

fn session_error_response(err: &SessionError) -> HttpResponse {
    let status = match err {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::AnalysisInProgress | SessionError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SessionError::Diagnosis(inner) => diagnosis_status(inner),
    };
    error_json(status, err.to_string(), err.kind())
}

fn parse_id(raw: &str) -> Result<Uuid, HttpResponse> {
    Uuid::parse_str(raw)
        .map_err(|_| error_json(StatusCode::BAD_REQUEST, "Invalid UUID format".to_string(), "BadRequest"))
}

/// Reads the `file` field, buffering at most `limit` bytes. Oversized uploads
/// are drained and rejected, with the type still checked ahead of the size.
async fn read_upload(payload: &mut Multipart, limit: usize) -> Result<UploadedImage, UploadReadError> {
    let multipart_error = |e: actix_multipart::MultipartError| UploadReadError::Multipart(e.to_string());

    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            while field.try_next().await.map_err(multipart_error)?.is_some() {}
            continue;
        }

        let mime_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut data = Vec::new();
        let mut size = 0usize;
        while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
            size += chunk.len();
            if size <= limit {
                data.extend_from_slice(&chunk);
            }
        }

        if size > limit {
            ingest::validate(&UploadedImage::new(Vec::new(), mime_type, None), limit)?;
            return Err(DiagnosisError::FileTooLarge { size, limit }.into());
        }
        return Ok(UploadedImage::new(data, mime_type, file_name));
    }
    Err(UploadReadError::MissingFile)
}

async fn handle_inference(pipeline: web::Data<DiagnosisPipeline>, mut payload: Multipart) -> HttpResponse {
    let upload = match read_upload(&mut payload, pipeline.max_upload_bytes()).await {
        Ok(upload) => upload,
        Err(UploadReadError::Rejected(err)) => return diagnosis_error_response(&err),
        Err(err) => return error_json(StatusCode::BAD_REQUEST, err.to_string(), "BadRequest"),
    };

    match pipeline.run(&upload, &CancelToken::new()).await {
        Ok(outcome) => HttpResponse::Ok().json(InferenceResponse {
            report: outcome.report,
            overlay_data_url: StoredObject::from(outcome.overlay).data_url(),
        }),
        Err(err) => {
            error!("Inference failed: {}", err);
            diagnosis_error_response(&err)
        }
    }
}

async fn model_status(pipeline: web::Data<DiagnosisPipeline>) -> HttpResponse {
    HttpResponse::Ok().json(pipeline.backend().status())
}

async fn create_session(sessions: web::Data<SessionStore>) -> HttpResponse {
    HttpResponse::Created().json(sessions.create())
}

async fn get_session(sessions: web::Data<SessionStore>, path: web::Path<String>) -> HttpResponse {
    let session_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match sessions.view(session_id) {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(err) => session_error_response(&err),
    }
}

async fn upload_image(
    pipeline: web::Data<DiagnosisPipeline>,
    sessions: web::Data<SessionStore>,
    path: web::Path<String>,
    mut payload: Multipart,
) -> HttpResponse {
    let session_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(err) = sessions.view(session_id) {
        return session_error_response(&err);
    }

    // the session is only touched once the whole body is in hand
    let received = match read_upload(&mut payload, pipeline.max_upload_bytes()).await {
        Ok(upload) => Ok(upload),
        Err(UploadReadError::Rejected(err)) => Err(err),
        Err(err) => {
            warn!("Upload for session {} not received: {}", session_id, err);
            return error_json(StatusCode::BAD_REQUEST, err.to_string(), "BadRequest");
        }
    };

    match sessions.upload(session_id, &pipeline, received) {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(err) => {
            info!("Upload for session {} rejected: {}", session_id, err);
            session_error_response(&err)
        }
    }
}

async fn analyze_session(
    pipeline: web::Data<DiagnosisPipeline>,
    sessions: web::Data<SessionStore>,
    path: web::Path<String>,
) -> HttpResponse {
    let session_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match sessions.analyze(session_id, &pipeline).await {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(err) => session_error_response(&err),
    }
}

async fn retry_session(sessions: web::Data<SessionStore>, path: web::Path<String>) -> HttpResponse {
    let session_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match sessions.retry(session_id) {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(err) => session_error_response(&err),
    }
}

async fn delete_session(sessions: web::Data<SessionStore>, path: web::Path<String>) -> HttpResponse {
    let session_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match sessions.delete(session_id) {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(err) => session_error_response(&err),
    }
}

async fn get_object(sessions: web::Data<SessionStore>, path: web::Path<String>) -> HttpResponse {
    let object_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match sessions.objects().get(object_id) {
        Some(object) => HttpResponse::Ok()
            .content_type(object.content_type)
            .body(object.bytes.to_vec()),
        None => error_json(
            StatusCode::NOT_FOUND,
            format!("Object {} not found", object_id),
            "NotFound",
        ),
    }
}
