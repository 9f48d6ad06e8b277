//! End-to-end authorizations through `NativeClient` and the mock processor.

use std::{sync::Arc, time::Duration};

use paygate::{
    authorization::{
        Amount,
        AuthorizationError,
        AuthorizationRequest,
        AuthorizationResultCode,
        AuthorizeMode,
        Authorizer,
    },
    client::{NativeClient, ProcessorClient},
    connection::{ConnectionConfig, TransportMode},
};
use rstest::rstest;
use test_util::{AnyError, MockProcessor, RecordedRequest, Reply};

fn request(cents: u64) -> AuthorizationRequest {
    AuthorizationRequest {
        id_string: "R-100".to_owned(),
        merchant_id: " merchant1\0".to_owned(),
        merchant_password: "secret".to_owned(),
        pan: "4111111111111111".to_owned(),
        expiry_mmyy: "1229".to_owned(),
        amount: Amount::from_cents(cents),
        order_number: "55".to_owned(),
        station_id: "meter-9".to_owned(),
        ..AuthorizationRequest::default()
    }
}

async fn connected_client(mock: &MockProcessor, verify: bool) -> Result<Arc<NativeClient>, AnyError> {
    let config = ConnectionConfig::new("127.0.0.1", mock.port())
        .with_mode(TransportMode::Plain)
        .with_verify_connection(verify);
    let client = NativeClient::new(config);
    client.connect(Some(Duration::from_secs(30))).await?;
    Ok(Arc::new(client))
}

/// Answers every request with an approval whose ttid echoes the request id.
fn approve(request: &RecordedRequest) -> Reply {
    Reply::Body(
        format!(
            "code=\"AUTH\"\r\nauth=\"123456\"\r\ncardtype=\"VISA\"\r\nttid=\"{}\"\r\nbatch=\"1\"\r\n",
            request.id
        )
        .into_bytes(),
    )
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn approves_sale_on_the_seventh_transaction() -> Result<(), AnyError> {
    let mock = MockProcessor::start(approve).await?;
    let client = connected_client(&mock, false).await?;
    for _ in 0..6 {
        let id = client.new_transaction();
        client.delete_transaction(id)?;
    }
    let authorizer = Authorizer::new(Arc::clone(&client));

    let outcome = authorizer.authorize(&request(490), AuthorizeMode::Normal).await?;

    assert_eq!(outcome.result, AuthorizationResultCode::Approved);
    assert_eq!(outcome.authorization_code.as_deref(), Some("123456"));
    assert_eq!(outcome.card_type.as_deref(), Some("VISA"));
    assert_eq!(outcome.ttid, 7);
    assert_eq!(outcome.batch, 1);
    assert_eq!(outcome.receipt_reference, "R-100");

    let sent = mock.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id, "7");
    assert_eq!(
        sent[0].keys(),
        [
            "username", "password", "nsf", "action", "custref", "stationid", "amount", "ordernum",
            "account", "expdate", "timeout",
        ]
    );
    assert_eq!(sent[0].field("username").as_deref(), Some("merchant1"));
    assert_eq!(sent[0].field("action").as_deref(), Some("sale"));
    assert_eq!(sent[0].field("amount").as_deref(), Some("4.90"));
    assert_eq!(sent[0].field("nsf").as_deref(), Some("no"));
    assert_eq!(client.connection().transactions_in_queue(), 0);
    assert_eq!(authorizer.statistics().snapshot().approved, 1);
    client.disconnect().await;
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[rstest]
#[case::preauth_raised(AuthorizeMode::Preauth, 50, "preauth", "1.01")]
#[case::preauth_kept(AuthorizeMode::Preauth, 2500, "preauth", "25.00")]
#[case::sale_kept(AuthorizeMode::Normal, 50, "sale", "0.50")]
#[tokio::test]
async fn sends_action_and_amount_for_mode(
    #[case] mode: AuthorizeMode,
    #[case] cents: u64,
    #[case] action: &str,
    #[case] amount: &str,
) -> Result<(), AnyError> {
    let mock = MockProcessor::start(approve).await?;
    let client = connected_client(&mock, true).await?;
    let authorizer = Authorizer::new(Arc::clone(&client));

    authorizer.authorize(&request(cents), mode).await?;

    let sent = mock.requests();
    assert_eq!(sent[0].field("action").as_deref(), Some(action));
    assert_eq!(sent[0].field("amount").as_deref(), Some(amount));
    client.disconnect().await;
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn finalization_sends_ttid_without_card_data() -> Result<(), AnyError> {
    let mock = MockProcessor::start(approve).await?;
    let client = connected_client(&mock, true).await?;
    let authorizer = Authorizer::new(Arc::clone(&client));
    let finalize = AuthorizationRequest {
        preauth_ttid: Some(4242),
        ..request(300)
    };

    authorizer.authorize(&finalize, AuthorizeMode::Finalize).await?;

    let sent = &mock.requests()[0];
    assert_eq!(sent.field("action").as_deref(), Some("PreauthComplete"));
    assert_eq!(sent.field("ttid").as_deref(), Some("4242"));
    assert_eq!(sent.field("account"), None);
    assert_eq!(sent.field("trackdata"), None);
    client.disconnect().await;
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn declines_with_processor_codes_in_the_note() -> Result<(), AnyError> {
    let mock = MockProcessor::start(|_| {
        Reply::Body(
            b"code=\"DENY\"\r\nphard_code=\"05\"\r\nmsoft_code=\"INT-1\"\r\nverbiage=\"Do not honor\"\r\n".to_vec(),
        )
    })
    .await?;
    let client = connected_client(&mock, true).await?;
    let authorizer = Authorizer::new(Arc::clone(&client));

    let outcome = authorizer.authorize(&request(490), AuthorizeMode::Normal).await?;

    assert_eq!(outcome.result, AuthorizationResultCode::Declined);
    assert_eq!(
        outcome.note,
        "Code=DENY, PHardCode=05, MSoftCode=INT-1, Verbiage=Do not honor"
    );
    assert_eq!(outcome.ttid, 0);
    assert_eq!(authorizer.statistics().snapshot().declined, 1);
    client.disconnect().await;
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn retry_answer_is_not_retry_safe() -> Result<(), AnyError> {
    let mock = MockProcessor::start(|_| Reply::Body(b"code=\"RETRY\"\r\n".to_vec())).await?;
    let client = connected_client(&mock, true).await?;
    let authorizer = Authorizer::new(Arc::clone(&client));

    let err = authorizer
        .authorize(&request(490), AuthorizeMode::Normal)
        .await
        .expect_err("RETRY is an error");

    assert!(matches!(err, AuthorizationError::ProcessorRetry { .. }));
    assert!(!err.allow_retry());
    assert_eq!(client.connection().transactions_in_queue(), 0);
    client.disconnect().await;
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn waits_for_the_response_on_a_non_blocking_connection() -> Result<(), AnyError> {
    let mock = MockProcessor::start(approve).await?;
    let client = Arc::new(NativeClient::new(
        ConnectionConfig::new("127.0.0.1", mock.port()).with_mode(TransportMode::Plain),
    ));
    client.connection().connect().await?;
    assert!(!client.connection().is_blocking());
    let authorizer = Authorizer::new(Arc::clone(&client));

    let first = authorizer.authorize(&request(490), AuthorizeMode::Normal).await?;

    assert_eq!(first.result, AuthorizationResultCode::Approved);
    assert_eq!(mock.requests().len(), 1);
    assert!(client.connection().transactions_sent().await);

    let second = authorizer.authorize(&request(120), AuthorizeMode::Normal).await?;

    assert_eq!(second.result, AuthorizationResultCode::Approved);
    let sent = mock.requests();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].field("amount").as_deref(), Some("1.20"));
    assert_eq!(client.connection().transactions_in_queue(), 0);
    client.disconnect().await;
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn refuses_quickly_when_never_connected() -> Result<(), AnyError> {
    let mock = MockProcessor::start(approve).await?;
    let client = Arc::new(NativeClient::new(
        ConnectionConfig::new("127.0.0.1", mock.port()).with_mode(TransportMode::Plain),
    ));
    let authorizer = Authorizer::new(Arc::clone(&client));

    let err = authorizer
        .authorize(&request(490), AuthorizeMode::Normal)
        .await
        .expect_err("not connected");

    assert!(matches!(err, AuthorizationError::NotConnected(_)));
    assert!(err.allow_retry());
    assert!(mock.all_requests().is_empty());
    assert_eq!(authorizer.statistics().snapshot().connection_errors, 1);
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn concurrent_calls_share_one_connection() -> Result<(), AnyError> {
    let mock = MockProcessor::start(approve).await?;
    let client = connected_client(&mock, true).await?;
    let authorizer = Arc::new(Authorizer::new(Arc::clone(&client)));

    let calls: Vec<_> = (0..8)
        .map(|n| {
            let shared = Arc::clone(&authorizer);
            tokio::spawn(async move {
                let mut req = request(100 + n);
                req.id_string = format!("R-{n}");
                shared.authorize(&req, AuthorizeMode::Normal).await
            })
        })
        .collect();
    let mut ttids = Vec::new();
    for call in calls {
        let outcome = call.await??;
        assert_eq!(outcome.result, AuthorizationResultCode::Approved);
        ttids.push(outcome.ttid);
    }
    ttids.sort_unstable();
    ttids.dedup();

    assert_eq!(ttids.len(), 8);
    assert_eq!(mock.connections(), 1);
    assert_eq!(mock.requests().len(), 8);
    assert_eq!(authorizer.statistics().snapshot().processed, 8);
    assert_eq!(client.connection().transactions_in_queue(), 0);
    client.disconnect().await;
    Ok(())
}
