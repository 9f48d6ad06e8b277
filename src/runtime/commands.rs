//! Implementations of the `paygate` subcommands.
//!
//! Each command connects with its own [`NativeClient`], writes a short report
//! to `out` and disconnects before returning.

use std::{io::Write, sync::Arc};

use anyhow::{Context, Result};
use cli_defs::{AuthorizeArgs, ModeArg, QueryArgs};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::config::GatewayConfig;
use crate::{
    authorization::{
        Amount,
        AuthorizationOutcome,
        AuthorizationRequest,
        AuthorizeMode,
        Authorizer,
    },
    client::{NativeClient, ProcessorClient},
    transaction::{Response, ResponseBody},
};

async fn connect(config: &GatewayConfig) -> Result<NativeClient> {
    let client = NativeClient::new(config.connection_config())
        .with_plaintext_fallback(config.plaintext_fallback);
    client
        .connect(config.request_timeout())
        .await
        .with_context(|| format!("failed to connect to {}:{}", config.host, config.port))?;
    Ok(client)
}

/// Connect, verify the link and report the transport in use.
///
/// # Errors
/// Returns an error when the connect or verification ping fails.
pub async fn ping<W: Write + Send>(config: &GatewayConfig, out: &mut W) -> Result<()> {
    let client = connect(config).await?;
    let transport = client.connection().transport_mode().await;
    client.disconnect().await;
    let label = transport.map_or_else(|| "unknown".to_owned(), |mode| mode.to_string());
    writeln!(out, "connected to {}:{} over {label}", config.host, config.port)?;
    Ok(())
}

const fn authorize_mode(mode: ModeArg) -> AuthorizeMode {
    match mode {
        ModeArg::Normal => AuthorizeMode::Normal,
        ModeArg::Preauth => AuthorizeMode::Preauth,
        ModeArg::Finalize => AuthorizeMode::Finalize,
    }
}

fn authorization_request(args: &AuthorizeArgs) -> Result<AuthorizationRequest> {
    let amount: Amount = args.amount.parse()?;
    Ok(AuthorizationRequest {
        id_string: args.receipt.clone(),
        merchant_id: args.merchant.clone(),
        merchant_password: args.password.clone(),
        pan: args.account.clone().unwrap_or_default(),
        expiry_mmyy: args.expdate.clone().unwrap_or_default(),
        track_two_data: args.trackdata.clone().unwrap_or_default(),
        amount,
        order_number: args.order.clone().unwrap_or_default(),
        customer_reference: args.custref.clone().unwrap_or_default(),
        station_id: args.station.clone().unwrap_or_default(),
        preauth_ttid: args.ttid,
    })
}

/// Run one authorization and print its outcome.
///
/// Failures after a successful connect are reported as an outcome rather
/// than an error, so the caller always sees the receipt reference and note.
///
/// # Errors
/// Returns an error for an unparsable amount or a failed connect.
pub async fn authorize<W: Write + Send>(
    config: &GatewayConfig,
    args: &AuthorizeArgs,
    out: &mut W,
) -> Result<()> {
    let request = authorization_request(args)?;
    let client = Arc::new(connect(config).await?);
    let authorizer = Authorizer::with_limiter(
        Arc::clone(&client),
        Arc::new(Semaphore::new(config.max_in_flight.max(1))),
    );
    let outcome = match authorizer.authorize(&request, authorize_mode(args.mode)).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(receipt = %args.receipt, retry_safe = err.allow_retry(), error = %err, "authorization failed");
            AuthorizationOutcome::from_error(&err, args.receipt.clone())
        }
    };
    client.disconnect().await;
    info!(receipt = %outcome.receipt_reference, result = ?outcome.result, "authorization finished");
    write_outcome(out, &outcome)
}

fn write_outcome<W: Write>(out: &mut W, outcome: &AuthorizationOutcome) -> Result<()> {
    writeln!(out, "result: {:?}", outcome.result)?;
    if let Some(code) = &outcome.authorization_code {
        writeln!(out, "authorization: {code}")?;
    }
    if let Some(card_type) = &outcome.card_type {
        writeln!(out, "card type: {card_type}")?;
    }
    writeln!(out, "ttid: {}", outcome.ttid)?;
    writeln!(out, "batch: {}", outcome.batch)?;
    writeln!(out, "receipt: {}", outcome.receipt_reference)?;
    writeln!(out, "note: {}", outcome.note)?;
    Ok(())
}

/// Send the given fields as one transaction and print the response.
///
/// # Errors
/// Returns an error when connecting, sending or reading the response fails.
pub async fn query<W: Write + Send>(
    config: &GatewayConfig,
    args: &QueryArgs,
    out: &mut W,
) -> Result<()> {
    let client = connect(config).await?;
    let connection = client.connection();
    let id = connection.new_transaction();
    let result = async {
        for (key, value) in &args.fields {
            connection.set_field(id, key.as_str(), value.as_str())?;
        }
        connection.send(id).await?;
        connection.response(id)
    }
    .await;
    if let Err(err) = connection.delete_transaction(id) {
        warn!(transaction_id = %id, error = %err, "could not delete query transaction");
    }
    client.disconnect().await;
    let response = result.with_context(|| format!("query transaction {id} failed"))?;
    write_response(out, &response)
}

fn write_response<W: Write>(out: &mut W, response: &Response) -> Result<()> {
    match response.body() {
        ResponseBody::KeyValue(map) => {
            for (key, value) in map {
                writeln!(out, "{key}={value}")?;
            }
        }
        ResponseBody::Tabular(table) => {
            writeln!(out, "{}", table.headers().join("\t"))?;
            for row in 0..table.rows() {
                if let Some(cells) = table.row(row) {
                    writeln!(out, "{}", cells.join("\t"))?;
                }
            }
        }
    }
    Ok(())
}
