//! Authorization adapter.
//!
//! [`Authorizer`] turns an [`AuthorizationRequest`] into a processor
//! transaction, sends it through a [`ProcessorClient`] and maps the returned
//! code onto an [`AuthorizationOutcome`]. Each call holds a permit from a
//! shared limiter for its whole duration and always attempts to release its
//! transaction afterwards.

use std::{sync::Arc, time::Duration};

use tokio::{sync::Semaphore, time::sleep};
use tracing::{debug, info, warn};

pub mod amount;
pub mod errors;
pub mod stats;

pub use amount::{Amount, AmountError};
pub use errors::AuthorizationError;
pub use stats::{AuthorizationStatistics, StatisticsSnapshot};

use crate::{
    client::ProcessorClient,
    transaction::{Response, TransactionId},
};

/// Default number of authorization calls allowed in flight at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 50;
/// Attempts made to delete a transaction after a call.
pub const DELETE_ATTEMPTS: u32 = 10;
/// Pause between delete attempts.
pub const DELETE_RETRY_INTERVAL: Duration = Duration::from_millis(10);
/// Smallest amount sent for a preauthorization.
pub const PREAUTH_MINIMUM: Amount = Amount::from_cents(101);

/// Kind of authorization requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizeMode {
    /// Authorize and capture.
    #[default]
    Normal,
    /// Hold funds for a later finalization.
    Preauth,
    /// Complete an earlier preauth, referenced by its ttid.
    Finalize,
}

impl AuthorizeMode {
    /// Value sent in the `action` field.
    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::Normal => "sale",
            Self::Preauth => "preauth",
            Self::Finalize => "PreauthComplete",
        }
    }
}

/// Everything the adapter needs to authorize one payment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Caller reference, echoed back as the receipt reference.
    pub id_string: String,
    /// Processor username.
    pub merchant_id: String,
    /// Processor password.
    pub merchant_password: String,
    /// Card number, used when no track data is present.
    pub pan: String,
    /// Card expiry as `MMYY`.
    pub expiry_mmyy: String,
    /// Raw track two data; takes precedence over `pan`.
    pub track_two_data: String,
    /// Amount to authorize.
    pub amount: Amount,
    /// Order number.
    pub order_number: String,
    /// Customer reference.
    pub customer_reference: String,
    /// Station or meter serial number.
    pub station_id: String,
    /// Processor id of the preauth being finalized.
    pub preauth_ttid: Option<i32>,
}

/// Normalized result of an authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationResultCode {
    /// The processor approved the payment.
    Approved,
    /// The processor declined the payment.
    Declined,
    /// The request never reached the processor.
    ConnectionError,
    /// Any other processor answer.
    UnknownError,
}

/// Outcome handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationOutcome {
    /// Normalized result.
    pub result: AuthorizationResultCode,
    /// Authorization number issued by the processor.
    pub authorization_code: Option<String>,
    /// Card brand reported by the processor.
    pub card_type: Option<String>,
    /// Caller reference of the request.
    pub receipt_reference: String,
    /// Diagnostic note for logging.
    pub note: String,
    /// Processor transaction id, or 0.
    pub ttid: i32,
    /// Settlement batch, or 0.
    pub batch: i16,
}

impl AuthorizationOutcome {
    /// Outcome recorded for a call that failed with `err`.
    ///
    /// Retry-safe failures become [`AuthorizationResultCode::ConnectionError`];
    /// everything else is an [`AuthorizationResultCode::UnknownError`].
    #[must_use]
    pub fn from_error(err: &AuthorizationError, receipt_reference: impl Into<String>) -> Self {
        let result = if err.allow_retry() {
            AuthorizationResultCode::ConnectionError
        } else {
            AuthorizationResultCode::UnknownError
        };
        Self {
            result,
            authorization_code: None,
            card_type: None,
            receipt_reference: receipt_reference.into(),
            note: err.to_string(),
            ttid: 0,
            batch: 0,
        }
    }
}

fn trim_credential(value: &str) -> &str { value.trim_matches([' ', '\0']) }

/// Build the request fields in wire order.
///
/// # Errors
/// Returns [`AuthorizationError::MissingPreauthTtid`] when finalizing without
/// the preauth ttid.
pub fn request_fields(
    request: &AuthorizationRequest,
    mode: AuthorizeMode,
) -> Result<Vec<(&'static str, String)>, AuthorizationError> {
    let mut fields = vec![
        ("username", trim_credential(&request.merchant_id).to_owned()),
        ("password", trim_credential(&request.merchant_password).to_owned()),
        ("nsf", "no".to_owned()),
        ("action", mode.action().to_owned()),
    ];
    if mode == AuthorizeMode::Finalize {
        let ttid = request.preauth_ttid.ok_or_else(|| AuthorizationError::MissingPreauthTtid {
            receipt: request.id_string.clone(),
        })?;
        fields.push(("ttid", ttid.to_string()));
    }
    let amount = match mode {
        AuthorizeMode::Preauth => request.amount.max(PREAUTH_MINIMUM),
        AuthorizeMode::Normal | AuthorizeMode::Finalize => request.amount,
    };
    fields.extend([
        ("custref", request.customer_reference.clone()),
        ("stationid", request.station_id.clone()),
        ("amount", amount.to_string()),
        ("ordernum", request.order_number.clone()),
    ]);
    if mode != AuthorizeMode::Finalize {
        let track = trim_credential(&request.track_two_data);
        if track.is_empty() {
            fields.push(("account", request.pan.clone()));
            fields.push(("expdate", request.expiry_mmyy.clone()));
        } else {
            fields.push(("trackdata", track.to_owned()));
        }
    }
    Ok(fields)
}

/// Map a completed response onto an outcome.
///
/// # Errors
/// Returns [`AuthorizationError::ProcessorRetry`] for a `RETRY` code.
pub fn interpret_response(
    response: &Response,
    receipt: &str,
) -> Result<AuthorizationOutcome, AuthorizationError> {
    let code = response.code().unwrap_or_default();
    let summary = format!(
        "Code={code}, PHardCode={}, MSoftCode={}, Verbiage={}",
        response.phard_code().unwrap_or_default(),
        response.msoft_code().unwrap_or_default(),
        response.verbiage().unwrap_or_default(),
    );
    let (result, note) = match code.to_ascii_uppercase().as_str() {
        "AUTH" => (AuthorizationResultCode::Approved, summary),
        "CALL" | "DENY" | "PKUP" => (AuthorizationResultCode::Declined, summary),
        "RETRY" => {
            return Err(AuthorizationError::ProcessorRetry {
                receipt: receipt.to_owned(),
                note: summary,
            });
        }
        _ => (AuthorizationResultCode::UnknownError, response.describe("\t")),
    };
    Ok(AuthorizationOutcome {
        result,
        authorization_code: response.auth_code().map(str::to_owned),
        card_type: response.card_type().map(str::to_owned),
        receipt_reference: receipt.to_owned(),
        note,
        ttid: response.ttid().and_then(|v| v.trim().parse().ok()).unwrap_or(0),
        batch: response.batch().and_then(|v| v.trim().parse().ok()).unwrap_or(0),
    })
}

/// Deletes the transaction once if the call is abandoned mid-flight.
struct PendingTransaction<'a, C: ProcessorClient + ?Sized> {
    client: &'a C,
    id: TransactionId,
    armed: bool,
}

impl<C: ProcessorClient + ?Sized> Drop for PendingTransaction<'_, C> {
    fn drop(&mut self) {
        if self.armed && self.client.delete_transaction(self.id).is_err() {
            debug!(transaction_id = %self.id, "abandoned transaction already gone");
        }
    }
}

/// Authorization adapter over a [`ProcessorClient`].
#[derive(Debug)]
pub struct Authorizer<C> {
    client: Arc<C>,
    limiter: Arc<Semaphore>,
    statistics: AuthorizationStatistics,
}

impl<C: ProcessorClient> Authorizer<C> {
    /// Adapter with its own limiter of [`DEFAULT_MAX_IN_FLIGHT`] permits.
    #[must_use]
    pub fn new(client: Arc<C>) -> Self {
        Self::with_limiter(client, Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)))
    }

    /// Adapter sharing `limiter` with whoever else holds it.
    #[must_use]
    pub fn with_limiter(client: Arc<C>, limiter: Arc<Semaphore>) -> Self {
        Self {
            client,
            limiter,
            statistics: AuthorizationStatistics::default(),
        }
    }

    /// Return the client.
    #[must_use]
    pub const fn client(&self) -> &Arc<C> { &self.client }

    /// Return the running totals.
    #[must_use]
    pub const fn statistics(&self) -> &AuthorizationStatistics { &self.statistics }

    /// Authorize one payment.
    ///
    /// # Errors
    /// Returns an [`AuthorizationError`]; consult
    /// [`AuthorizationError::allow_retry`] before resending.
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
        mode: AuthorizeMode,
    ) -> Result<AuthorizationOutcome, AuthorizationError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| AuthorizationError::LimiterClosed)?;
        if !self.client.is_connected() {
            self.statistics.record_connection_error();
            return Err(AuthorizationError::NotConnected(self.client.connection_error()));
        }

        let id = self.client.new_transaction();
        let mut pending = PendingTransaction {
            client: self.client.as_ref(),
            id,
            armed: true,
        };
        let result = self.exchange(id, request, mode).await;
        pending.armed = false;
        self.release(id).await;
        self.statistics.record_processed();
        result
    }

    async fn exchange(
        &self,
        id: TransactionId,
        request: &AuthorizationRequest,
        mode: AuthorizeMode,
    ) -> Result<AuthorizationOutcome, AuthorizationError> {
        let receipt = request.id_string.as_str();
        for (key, value) in request_fields(request, mode)? {
            self.client
                .set_field(id, key, &value)
                .map_err(|source| AuthorizationError::Populate {
                    receipt: receipt.to_owned(),
                    source,
                })?;
        }

        debug!(receipt, transaction_id = %id, "verifying processor connection");
        if let Err(source) = self.client.check_connection().await {
            self.statistics.record_connection_error();
            return Err(AuthorizationError::ConnectionCheck {
                receipt: receipt.to_owned(),
                source,
            });
        }

        info!(receipt, transaction_id = %id, action = mode.action(), "sending authorization");
        if let Err(source) = self.client.send(id).await {
            warn!(receipt, transaction_id = %id, error = %source, "failed to send transaction");
            self.client.mark_not_connected();
            self.statistics.record_connection_error();
            return Err(AuthorizationError::Send {
                receipt: receipt.to_owned(),
                source,
            });
        }

        let Some(response) = self.client.response(id) else {
            self.statistics.record_error();
            return Err(AuthorizationError::MissingResponse {
                receipt: receipt.to_owned(),
            });
        };
        let outcome = interpret_response(&response, receipt).inspect_err(|err| {
            warn!(receipt, transaction_id = %id, error = %err, "processor asked for a retry");
            self.statistics.record_error();
        })?;
        match outcome.result {
            AuthorizationResultCode::Approved => self.statistics.record_approved(),
            AuthorizationResultCode::Declined => {
                info!(receipt, note = %outcome.note, "transaction declined");
                self.statistics.record_declined();
            }
            AuthorizationResultCode::ConnectionError | AuthorizationResultCode::UnknownError => {
                warn!(receipt, transaction_id = %id, "processor returned an unrecognised code");
                self.statistics.record_error();
            }
        }
        info!(receipt, transaction_id = %id, result = ?outcome.result, "authorization complete");
        Ok(outcome)
    }

    async fn release(&self, id: TransactionId) {
        for attempt in 1..=DELETE_ATTEMPTS {
            match self.client.delete_transaction(id) {
                Ok(()) => {
                    if attempt > 1 {
                        warn!(transaction_id = %id, attempts = attempt, "transaction deleted only after retrying");
                    }
                    return;
                }
                Err(err) => {
                    debug!(transaction_id = %id, attempt, error = %err, "delete attempt failed");
                    if attempt < DELETE_ATTEMPTS {
                        sleep(DELETE_RETRY_INTERVAL).await;
                    }
                }
            }
        }
        warn!(transaction_id = %id, attempts = DELETE_ATTEMPTS, "could not delete transaction");
    }
}
