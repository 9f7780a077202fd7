//! The delivery loop and per-document state machine.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use postrider_common::{Clock, Signal};
use postrider_store::{
    AdminStore, AgentState, MailSnapshot, MailStore, Value, WriteBatch, mail::fields,
};
use tokio::sync::broadcast;

use crate::{
    backoff::{fixed_backoff, smtp_backoff},
    error::Result,
    fingerprint::message_hash,
    mailer::Mailer,
    overlay::{ConfigOverlay, EffectiveConfig, OverlayDefaults},
};

/// Persisted error messages are capped at this many characters.
const MAX_ERROR_CHARS: usize = 300;

/// Advisory lease horizon written on `PROCESSING`. Never enforced; it only
/// makes concurrent workers visible to each other.
const LEASE_SECS: i64 = 60;

/// Identity stamped into every `smtpAgent` write.
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    pub version: String,
    pub host: String,
    pub pid: u32,
}

impl WorkerIdentity {
    #[must_use]
    pub fn detect() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: hostname(),
            pid: std::process::id(),
        }
    }

    /// The `processing.by` marker, `<host>:<pid>`.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{}:{}", self.host, self.pid)
    }
}

fn hostname() -> String {
    let mut buf = [0_u8; 256];
    // SAFETY: buf outlives the call and len matches its size.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc == 0 {
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        if len > 0 {
            return String::from_utf8_lossy(&buf[..len]).into_owned();
        }
    }
    "localhost".to_string()
}

fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_CHARS).collect()
}

fn seconds(duration: Duration) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
}

/// The polling delivery engine.
///
/// One instance per process. Each tick refreshes the config overlay, pulls
/// the candidate set, runs every candidate through the admission cascade,
/// and writes results back. All state lives in the store: a crash between
/// ticks loses nothing, and a write failure is only logged because the next
/// tick re-derives everything.
pub struct DeliveryEngine {
    mail: MailStore,
    admin: AdminStore,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    identity: WorkerIdentity,
    overlay: ConfigOverlay,
}

impl DeliveryEngine {
    #[must_use]
    pub fn new(
        mail: MailStore,
        admin: AdminStore,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        defaults: OverlayDefaults,
    ) -> Self {
        Self {
            mail,
            admin,
            mailer,
            clock,
            identity: WorkerIdentity::detect(),
            overlay: ConfigOverlay::new(defaults),
        }
    }

    /// The configuration the next tick will run with.
    #[must_use]
    pub const fn effective(&self) -> &EffectiveConfig {
        self.overlay.effective()
    }

    /// Run until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Never returns an error today; the signature leaves room for fatal
    /// initialization failures surfaced at `serve` time.
    pub async fn serve(mut self, mut shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        tracing::info!(
            host = %self.identity.host,
            pid = self.identity.pid,
            version = %self.identity.version,
            "delivery engine starting"
        );

        loop {
            self.refresh_overlay().await;
            if let Err(error) = self.tick().await {
                tracing::error!(%error, "tick skipped");
            }

            let interval = Duration::from_secs(self.overlay.effective().poll_interval_secs);
            tokio::select! {
                () = self.clock.sleep(interval) => {}
                _ = shutdown.recv() => {
                    tracing::info!("delivery engine received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Fetch the admin config document and apply it to the overlay. A
    /// fetch failure leaves the previous effective configuration standing.
    pub async fn refresh_overlay(&mut self) {
        match self.admin.read_overrides().await {
            Ok(overrides) => {
                self.overlay.apply(&overrides);
            }
            Err(error) => {
                tracing::debug!(%error, "failed to read admin config, keeping effective values");
            }
        }
    }

    /// Run one tick: query candidates and push each through the admission
    /// cascade. Per-document failures never abort the tick.
    ///
    /// # Errors
    ///
    /// Returns an error only when both candidate queries fail; the caller
    /// logs it and the loop continues.
    pub async fn tick(&self) -> Result<()> {
        let effective = self.overlay.effective().clone();
        let batch = self.mail.list_candidates(effective.cutoff).await?;

        if !batch.terminal_filtered {
            tracing::debug!("store returned unfiltered candidates, dropping finished docs here");
        }

        // The store may hand back the same document twice in one tick;
        // each id is processed at most once.
        let mut seen = HashSet::new();
        for snapshot in batch.docs {
            if !seen.insert(snapshot.id.clone()) {
                continue;
            }
            if let Err(error) = self.process(&snapshot, &effective).await {
                tracing::error!(id = %snapshot.id, %error, "error processing document");
                self.record_error(&snapshot.id, "EXCEPTION", &error.to_string())
                    .await;
            }
        }

        Ok(())
    }

    /// The admission cascade for one candidate.
    async fn process(&self, snapshot: &MailSnapshot, cfg: &EffectiveConfig) -> Result<()> {
        let state = snapshot.state();
        if state.is_terminal() {
            tracing::debug!(id = %snapshot.id, %state, "skipping finished document");
            return Ok(());
        }

        if let (Some(cutoff), Some(created_at)) = (cfg.cutoff, snapshot.created_at())
            && created_at < cutoff
        {
            tracing::debug!(id = %snapshot.id, %created_at, "document predates cutoff");
            self.record_skip(&snapshot.id, "before_cutoff").await;
            return Ok(());
        }

        let attempts = snapshot.attempts();
        if attempts >= i64::from(cfg.max_retry_count) {
            tracing::debug!(id = %snapshot.id, attempts, "retry budget exhausted");
            self.record_skip(&snapshot.id, "max_retries").await;
            return Ok(());
        }

        let now = self.clock.now();
        if let Some(next_retry) = snapshot.next_retry_at()
            && next_retry > now
        {
            tracing::debug!(id = %snapshot.id, %next_retry, "deferring until retry is due");
            return Ok(());
        }

        let recipients = snapshot.recipients();
        let subject = snapshot.subject().unwrap_or_default().to_string();
        let html = snapshot.html().unwrap_or_default().to_string();
        if recipients.is_empty() || subject.is_empty() || html.is_empty() {
            tracing::error!(id = %snapshot.id, "document missing required fields");
            self.record_error(&snapshot.id, "VALIDATION", "Missing required fields")
                .await;
            return Ok(());
        }

        let hash = message_hash(&subject, &html, &recipients);
        self.mark_processing(&snapshot.id, now).await?;

        let outcome = self.mailer.send(&recipients, &subject, &html).await;
        self.record_result(&snapshot.id, outcome.success, outcome.error.as_deref(), &recipients, &hash, attempts)
            .await;
        Ok(())
    }

    fn identity_writes(&self) -> WriteBatch {
        WriteBatch::new()
            .set(fields::VERSION, self.identity.version.as_str())
            .set(fields::HOST, self.identity.host.as_str())
            .set(fields::PID, i64::from(self.identity.pid))
    }

    /// Claim the document: `PROCESSING` plus worker identity and an
    /// advisory lease. Uses `update` so a vanished document fails loudly.
    async fn mark_processing(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let writes = self
            .identity_writes()
            .set(fields::STATE, AgentState::Processing.as_str())
            .server_now(fields::LAST_UPDATED_AT)
            .set(fields::PROCESSING_BY, self.identity.tag())
            .set(fields::PROCESSING_LEASE, now + chrono::Duration::seconds(LEASE_SECS))
            .server_now(fields::ATTEMPT_START);
        self.mail.update(id, &writes).await?;
        Ok(())
    }

    /// Persist the outcome of a send. Success is terminal; failure
    /// schedules the next retry from the post-increment attempt count.
    async fn record_result(
        &self,
        id: &str,
        success: bool,
        error: Option<&str>,
        recipients: &[String],
        hash: &str,
        prior_attempts: i64,
    ) {
        let to_resolved = Value::Array(
            recipients
                .iter()
                .map(|recipient| Value::from(recipient.as_str()))
                .collect::<Vec<_>>(),
        );

        let mut writes = self
            .identity_writes()
            .server_now(fields::LAST_UPDATED_AT)
            .increment(fields::ATTEMPTS, 1)
            .server_now(fields::ATTEMPT_END)
            .set(fields::ATTEMPT_SUCCESS, success)
            .null(fields::ATTEMPT_SMTP_RESPONSE)
            .set(fields::ATTEMPT_TO_RESOLVED, to_resolved)
            .set(fields::PROCESSING_BY, self.identity.tag())
            .null(fields::PROCESSING_LEASE)
            .set(fields::DELIVERY_SUCCESS, success)
            .server_now(fields::DELIVERY_TIMESTAMP)
            .set(fields::DELIVERY_PROVIDER, "smtp")
            .null(fields::DELIVERY_MESSAGE_ID);

        if success {
            writes = writes
                .set(fields::STATE, AgentState::Sent.as_str())
                .server_now(fields::LAST_SUCCESS_AT)
                .null(fields::NEXT_RETRY_AT)
                .null(fields::ATTEMPT_ERROR_CODE)
                .null(fields::ATTEMPT_ERROR_MESSAGE)
                .set(fields::IDEMPOTENCY_HASH, hash)
                .server_now(fields::IDEMPOTENCY_SEEN_AT);
        } else {
            let next_retry = self.clock.now() + seconds(smtp_backoff(prior_attempts + 1));
            writes = writes
                .set(fields::STATE, AgentState::Error.as_str())
                .null(fields::LAST_SUCCESS_AT)
                .set(fields::NEXT_RETRY_AT, next_retry)
                .set(fields::ATTEMPT_ERROR_CODE, "SMTP")
                .set(
                    fields::ATTEMPT_ERROR_MESSAGE,
                    truncate_error(error.unwrap_or("send failed")),
                );
        }

        if let Err(error) = self.mail.set_merge(id, &writes).await {
            tracing::error!(id, %error, "failed to record send result");
        } else {
            let state = if success { AgentState::Sent } else { AgentState::Error };
            tracing::info!(id, %state, "recorded send result");
        }
    }

    /// Persist a `VALIDATION` or `EXCEPTION` error with the fixed retry
    /// delay.
    async fn record_error(&self, id: &str, code: &str, message: &str) {
        let next_retry = self.clock.now() + seconds(fixed_backoff());
        let writes = self
            .identity_writes()
            .set(fields::STATE, AgentState::Error.as_str())
            .server_now(fields::LAST_UPDATED_AT)
            .increment(fields::ATTEMPTS, 1)
            .set(fields::NEXT_RETRY_AT, next_retry)
            .server_now(fields::ATTEMPT_END)
            .set(fields::ATTEMPT_SUCCESS, false)
            .set(fields::ATTEMPT_ERROR_CODE, code)
            .set(fields::ATTEMPT_ERROR_MESSAGE, truncate_error(message))
            .set(fields::PROCESSING_BY, self.identity.tag())
            .null(fields::PROCESSING_LEASE);

        if let Err(error) = self.mail.set_merge(id, &writes).await {
            tracing::error!(id, %error, "failed to record document error");
        }
    }

    /// Terminally skip a document for a policy reason (`before_cutoff`,
    /// `max_retries`).
    async fn record_skip(&self, id: &str, reason: &str) {
        let writes = self
            .identity_writes()
            .set(fields::STATE, AgentState::Skipped.as_str())
            .server_now(fields::LAST_UPDATED_AT)
            .null(fields::NEXT_RETRY_AT)
            .server_now(fields::ATTEMPT_END)
            .set(fields::ATTEMPT_SUCCESS, false)
            .set(fields::ATTEMPT_ERROR_CODE, "SKIP")
            .set(fields::ATTEMPT_ERROR_MESSAGE, reason)
            .null(fields::PROCESSING_LEASE);

        if let Err(error) = self.mail.set_merge(id, &writes).await {
            tracing::error!(id, %error, "failed to record skip");
        }
    }
}
