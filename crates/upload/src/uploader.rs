//! Upload orchestrator: dispatch, resume, part loop, completion, verification.

use std::sync::Arc;

use blobsend_protocol::{ResumeStateRecord, UploadEvent, UploadPhase};
use blobsend_resume::{StateError, StateStore};
use blobsend_store::{ObjectStore, StoreError};
use blobsend_transfer::{PartPlan, PartSpec, Payload, TransferError, validate_object_key};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::dispatch::UploadMode;
use crate::error::{BoxError, Stage, UploadError};
use crate::finalize::{abort_session, complete_session, forget_session};
use crate::part::{PartFailure, PartWorker};
use crate::session::UploadSession;
use crate::verify::{Verification, verify_object};

/// Result of a verified upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub mode: UploadMode,
    pub bucket: String,
    pub key: String,
    /// Size of the stored object.
    pub bytes_uploaded: u64,
    /// Bytes actually transmitted by this call; less than `bytes_uploaded`
    /// when a session was resumed.
    pub bytes_sent: u64,
    pub session_id: Option<String>,
    pub parts_uploaded: u32,
    pub parts_skipped: u32,
    pub verification: Verification,
}

impl UploadReport {
    pub fn verified(&self) -> bool {
        self.verification.verified
    }

    pub fn local_digest(&self) -> &str {
        &self.verification.local_digest
    }

    pub fn remote_digest(&self) -> Option<&str> {
        self.verification.remote_digest.as_deref()
    }
}

#[derive(Debug, Default)]
struct PartStats {
    uploaded: u32,
    skipped: u32,
    bytes_sent: u64,
}

/// Why the part loop stopped early.
#[derive(Debug)]
enum Halt {
    Part {
        part_number: u32,
        attempts: u32,
        error: StoreError,
    },
    Source {
        part_number: u32,
        error: TransferError,
    },
    Save {
        part_number: u32,
        error: StateError,
    },
    Worker(String),
    Cancelled,
}

/// Uploads payloads to one object store, resuming from one state store.
///
/// The store and state handles are passed in explicitly, so concurrent
/// uploaders to different destinations share nothing. Each destination
/// needs its own state store.
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    state: Arc<dyn StateStore>,
    config: UploadConfig,
    events: Option<mpsc::Sender<UploadEvent>>,
    cancel: CancellationToken,
}

impl Uploader {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        state: Arc<dyn StateStore>,
        config: UploadConfig,
    ) -> Self {
        Self {
            store,
            state,
            config,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Sends progress events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<UploadEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Uses `cancel` instead of a private token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns a token that stops the upload between parts.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Uploads `payload` to `bucket`/`key`, picking single-request or
    /// multipart by size, and verifies the stored object.
    pub async fn upload(
        &self,
        payload: &Payload,
        bucket: &str,
        key: &str,
    ) -> Result<UploadReport, UploadError> {
        match UploadMode::for_size(payload.len(), self.config.multipart_threshold) {
            UploadMode::SinglePut => self.single_put(payload, bucket, key).await,
            UploadMode::Multipart => self.multipart_upload(payload, bucket, key).await,
        }
    }

    /// Sends `payload` in one request and verifies it.
    pub async fn single_put(
        &self,
        payload: &Payload,
        bucket: &str,
        key: &str,
    ) -> Result<UploadReport, UploadError> {
        self.config.validate().map_err(UploadError::Invalid)?;
        validate_object_key(key)?;
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled {
                session_id: None,
                abort_error: None,
            });
        }

        let data = payload.read_all().await?;
        let bytes = data.len() as u64;
        info!(bucket, key, bytes, "uploading in a single request");
        self.store
            .put_object(bucket, key, data)
            .await
            .map_err(|source| UploadError::Transient {
                stage: Stage::Put,
                source,
            })?;
        self.emit(UploadEvent::SinglePut { bytes }).await;

        let verification = self.verify(payload, bucket, key).await?;
        Ok(UploadReport {
            mode: UploadMode::SinglePut,
            bucket: bucket.to_string(),
            key: key.to_string(),
            bytes_uploaded: bytes,
            bytes_sent: bytes,
            session_id: None,
            parts_uploaded: 0,
            parts_skipped: 0,
            verification,
        })
    }

    /// Uploads `payload` as a resumable multipart session and verifies it.
    ///
    /// A trustworthy record in the state store resumes its session and skips
    /// the parts it lists; otherwise a new session is opened.
    pub async fn multipart_upload(
        &self,
        payload: &Payload,
        bucket: &str,
        key: &str,
    ) -> Result<UploadReport, UploadError> {
        self.config
            .validate_for(payload.len())
            .map_err(UploadError::Invalid)?;
        validate_object_key(key)?;
        if payload.is_empty() {
            return Err(UploadError::Invalid(
                "multipart upload needs a non-empty payload".into(),
            ));
        }
        let plan = PartPlan::new(payload.len(), self.config.part_size)?;

        let mut session = match self.resume(bucket, key, &plan).await {
            Some(session) => session,
            None => self.open(bucket, key, &plan).await?,
        };

        self.emit_phase(UploadPhase::Uploading).await;
        let stats = match self.upload_parts(&mut session, &plan, payload).await {
            Ok(stats) => stats,
            Err(halt) => return Err(self.halt(&session, halt).await),
        };

        if !session.is_complete(plan.total_parts()) {
            let source = format!(
                "{} of {} parts confirmed",
                session.completed_count(),
                plan.total_parts()
            );
            let abort_error = self.abort(&session).await;
            return Err(UploadError::SessionFatal {
                stage: Stage::Complete,
                session_id: session.session_id.clone(),
                part_number: None,
                attempts: 0,
                source: source.into(),
                abort_error,
            });
        }

        self.emit_phase(UploadPhase::Completing).await;
        if let Err(e) =
            complete_session(self.store.as_ref(), self.state.as_ref(), &session).await
        {
            let abort_error = if matches!(e, StoreError::NoSuchUpload(_)) {
                forget_session(self.state.as_ref(), &session).await;
                self.emit_phase(UploadPhase::Aborted).await;
                None
            } else {
                self.abort(&session).await
            };
            return Err(UploadError::SessionFatal {
                stage: Stage::Complete,
                session_id: session.session_id.clone(),
                part_number: None,
                attempts: 1,
                source: Box::new(e),
                abort_error,
            });
        }
        self.emit_phase(UploadPhase::Completed).await;

        let verification = self.verify(payload, bucket, key).await?;
        Ok(UploadReport {
            mode: UploadMode::Multipart,
            bucket: bucket.to_string(),
            key: key.to_string(),
            bytes_uploaded: payload.len(),
            bytes_sent: stats.bytes_sent,
            session_id: Some(session.session_id),
            parts_uploaded: stats.uploaded,
            parts_skipped: stats.skipped,
            verification,
        })
    }

    /// Loads and vets the stored record for this upload.
    async fn resume(&self, bucket: &str, key: &str, plan: &PartPlan) -> Option<UploadSession> {
        let record = self.state.load().await?;
        match UploadSession::resume(&record, bucket, key, plan) {
            Ok(session) => {
                info!(
                    session_id = %session.session_id,
                    completed = session.completed_count(),
                    total_parts = plan.total_parts(),
                    "resuming multipart session"
                );
                self.emit(UploadEvent::SessionResumed {
                    session_id: session.session_id.clone(),
                    completed: session.completed_count(),
                    total_parts: plan.total_parts(),
                })
                .await;
                Some(session)
            }
            Err(e) => {
                warn!(
                    state = %self.state.describe(),
                    session_id = %record.session_id,
                    error = %e,
                    "resume state does not fit this upload, starting fresh"
                );
                self.discard_stale(&record).await;
                None
            }
        }
    }

    /// Best-effort abort of the session a rejected record names.
    ///
    /// Records without a destination cannot be aborted and are left alone.
    async fn discard_stale(&self, record: &ResumeStateRecord) {
        let (Some(bucket), Some(key)) = (record.bucket.as_deref(), record.key.as_deref()) else {
            return;
        };
        match self
            .store
            .abort_multipart(bucket, key, &record.session_id)
            .await
        {
            Ok(()) => info!(
                session_id = %record.session_id,
                bucket,
                key,
                "aborted stale multipart session"
            ),
            Err(e) => warn!(
                session_id = %record.session_id,
                bucket,
                key,
                error = %e,
                "could not abort stale multipart session"
            ),
        }
    }

    async fn open(
        &self,
        bucket: &str,
        key: &str,
        plan: &PartPlan,
    ) -> Result<UploadSession, UploadError> {
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled {
                session_id: None,
                abort_error: None,
            });
        }

        self.emit_phase(UploadPhase::Opening).await;
        let session_id = self
            .store
            .open_multipart(bucket, key)
            .await
            .map_err(|source| UploadError::Transient {
                stage: Stage::Open,
                source,
            })?;
        info!(
            %session_id,
            bucket,
            key,
            total_size = plan.total_size(),
            total_parts = plan.total_parts(),
            "opened multipart session"
        );
        self.emit(UploadEvent::SessionOpened {
            session_id: session_id.clone(),
            total_parts: plan.total_parts(),
        })
        .await;
        Ok(UploadSession::new(session_id, bucket, key, plan))
    }

    /// Uploads every part the session lacks, at most `concurrency` at once.
    ///
    /// Each acknowledged part is saved to the state store before it counts
    /// as uploaded. After the first failure or cancellation no new part is
    /// started; parts already in flight run to completion.
    async fn upload_parts(
        &self,
        session: &mut UploadSession,
        plan: &PartPlan,
        payload: &Payload,
    ) -> Result<PartStats, Halt> {
        let mut stats = PartStats::default();
        let total_parts = plan.total_parts();

        let mut pending: Vec<PartSpec> = Vec::new();
        for spec in plan {
            if session.contains(spec.part_number) {
                debug!(session_id = %session.session_id, part_number = spec.part_number, "part already uploaded, skipping");
                self.emit(UploadEvent::PartSkipped {
                    part_number: spec.part_number,
                })
                .await;
                stats.skipped += 1;
            } else {
                pending.push(spec);
            }
        }

        let worker = PartWorker {
            store: self.store.clone(),
            bucket: session.bucket.clone(),
            key: session.key.clone(),
            session_id: session.session_id.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        };

        let mut queue = pending.into_iter();
        let mut tasks = JoinSet::new();
        let mut stop: Option<Halt> = None;

        loop {
            while stop.is_none()
                && tasks.len() < self.config.concurrency
                && !queue.as_slice().is_empty()
            {
                if self.cancel.is_cancelled() {
                    info!(session_id = %session.session_id, "cancelled, no further parts will start");
                    stop = Some(Halt::Cancelled);
                    break;
                }
                let Some(spec) = queue.next() else { break };
                match payload.read_part(&spec).await {
                    Ok(data) => {
                        let worker = worker.clone();
                        tasks.spawn(async move {
                            let result = worker.upload(spec.part_number, data).await;
                            (spec, result)
                        });
                    }
                    Err(error) => {
                        stop = Some(Halt::Source {
                            part_number: spec.part_number,
                            error,
                        });
                    }
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (spec, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    stop.get_or_insert(Halt::Worker(e.to_string()));
                    continue;
                }
            };

            match result {
                Ok(token) => {
                    session.mark_uploaded(spec.part_number, token);
                    if let Err(error) = self.state.save(&session.to_record()).await {
                        stop.get_or_insert(Halt::Save {
                            part_number: spec.part_number,
                            error,
                        });
                        continue;
                    }
                    stats.uploaded += 1;
                    stats.bytes_sent += spec.length;
                    debug!(
                        session_id = %session.session_id,
                        part_number = spec.part_number,
                        bytes = spec.length,
                        completed = session.completed_count(),
                        total_parts,
                        "part uploaded and recorded"
                    );
                    self.emit(UploadEvent::PartUploaded {
                        part_number: spec.part_number,
                        completed: session.completed_count(),
                        total_parts,
                        bytes: spec.length,
                    })
                    .await;
                }
                Err(PartFailure::Exhausted { attempts, error }) => {
                    stop.get_or_insert(Halt::Part {
                        part_number: spec.part_number,
                        attempts,
                        error,
                    });
                }
                Err(PartFailure::Cancelled { .. }) => {
                    stop.get_or_insert(Halt::Cancelled);
                }
            }
        }

        match stop {
            Some(halt) => Err(halt),
            None => Ok(stats),
        }
    }

    /// Tears the session down after the part loop stopped early.
    async fn halt(&self, session: &UploadSession, halt: Halt) -> UploadError {
        let session_id = session.session_id.clone();
        let (stage, part_number, attempts, source): (Stage, Option<u32>, u32, BoxError) =
            match halt {
                Halt::Cancelled => {
                    let abort_error = self.abort(session).await;
                    return UploadError::Cancelled {
                        session_id: Some(session_id),
                        abort_error,
                    };
                }
                Halt::Part {
                    part_number,
                    attempts,
                    error,
                } if matches!(error, StoreError::NoSuchUpload(_)) => {
                    warn!(%session_id, part_number, "remote session no longer exists");
                    forget_session(self.state.as_ref(), session).await;
                    self.emit_phase(UploadPhase::Aborted).await;
                    return UploadError::SessionFatal {
                        stage: Stage::UploadPart,
                        session_id,
                        part_number: Some(part_number),
                        attempts,
                        source: Box::new(error),
                        abort_error: None,
                    };
                }
                Halt::Part {
                    part_number,
                    attempts,
                    error,
                } => (Stage::UploadPart, Some(part_number), attempts, error.into()),
                Halt::Source { part_number, error } => {
                    (Stage::ReadSource, Some(part_number), 0, error.into())
                }
                Halt::Save { part_number, error } => {
                    (Stage::SaveState, Some(part_number), 1, error.into())
                }
                Halt::Worker(msg) => (Stage::UploadPart, None, 0, msg.into()),
            };

        let abort_error = self.abort(session).await;
        UploadError::SessionFatal {
            stage,
            session_id,
            part_number,
            attempts,
            source,
            abort_error,
        }
    }

    async fn abort(&self, session: &UploadSession) -> Option<StoreError> {
        let abort_error =
            abort_session(self.store.as_ref(), self.state.as_ref(), session).await;
        self.emit_phase(UploadPhase::Aborted).await;
        abort_error
    }

    async fn verify(
        &self,
        payload: &Payload,
        bucket: &str,
        key: &str,
    ) -> Result<Verification, UploadError> {
        self.emit_phase(UploadPhase::Verifying).await;
        let verification = verify_object(self.store.as_ref(), bucket, key, payload).await?;
        self.emit(UploadEvent::Verified {
            verified: verification.verified,
            local_digest: verification.local_digest.clone(),
            remote_digest: verification.remote_digest.clone(),
        })
        .await;

        if verification.verified {
            Ok(verification)
        } else {
            Err(UploadError::IntegrityMismatch(Box::new(verification)))
        }
    }

    async fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    async fn emit_phase(&self, phase: UploadPhase) {
        self.emit(UploadEvent::Phase { phase }).await;
    }
}
