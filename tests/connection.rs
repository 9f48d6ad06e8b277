//! Drives a real `Connection` against the mock processor over loopback TCP.

use std::time::Duration;

use paygate::{
    connection::{Connection, ConnectionConfig, ConnectionError, TransportMode},
    transaction::{ReturnStatus, TransactionStatus},
};
use test_util::{AnyError, MockProcessor, RecordedRequest, Reply, frame};
use tokio::time::{Instant, sleep};

fn plain(mock: &MockProcessor) -> Connection {
    Connection::new(ConnectionConfig::new("127.0.0.1", mock.port()).with_mode(TransportMode::Plain))
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn connect_verifies_with_a_ping() -> Result<(), AnyError> {
    let mock = MockProcessor::start(|_| Reply::Silent).await?;
    let connection = plain(&mock);

    connection.connect().await?;

    assert!(connection.is_connected());
    assert_eq!(connection.transport_mode().await, Some(TransportMode::Plain));
    let seen = mock.all_requests();
    assert_eq!(seen.len(), 1);
    assert!(seen.iter().all(RecordedRequest::is_ping));
    assert_eq!(connection.transactions_in_queue(), 0);
    connection.disconnect().await;
    assert!(!connection.is_connected());
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn unanswered_ping_fails_the_connect() -> Result<(), AnyError> {
    let mock = MockProcessor::start_raw(|_| Reply::Silent).await?;
    let connection = plain(&mock);

    let err = connection.connect().await.expect_err("ping must time out");

    assert!(matches!(err, ConnectionError::PingFailed));
    assert!(!connection.is_connected());
    assert_eq!(connection.connection_error(), "PING request failed");
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn matches_out_of_order_responses_by_id() -> Result<(), AnyError> {
    // Both answers go out once the second request arrives, newest first.
    let mock = MockProcessor::start(|request| {
        if request.field("order").as_deref() == Some("second") {
            let first = request.id.parse::<u32>().map_or(0, |id| id - 1);
            let mut bytes = frame(&request.id, b"code=\"AUTH\"\r\nauth=\"B\"\r\n");
            bytes.extend(frame(&first.to_string(), b"code=\"DENY\"\r\n"));
            Reply::Raw(bytes)
        } else {
            Reply::Silent
        }
    })
    .await?;
    let connection = plain(&mock);
    connection.connect().await?;

    let first = connection.new_transaction();
    connection.set_field(first, "order", "first")?;
    let second = connection.new_transaction();
    connection.set_field(second, "order", "second")?;
    connection.send(first).await?;
    connection.send(second).await?;

    let deadline = Instant::now() + Duration::from_secs(5);
    while connection.completed_transactions().len() < 2 && Instant::now() < deadline {
        connection.monitor().await?;
        sleep(Duration::from_millis(10)).await;
    }

    assert!(connection.transactions_sent().await);
    assert_eq!(connection.status(first), Some(TransactionStatus::Done));
    assert_eq!(connection.return_status(first), Some(ReturnStatus::Fail));
    assert_eq!(connection.return_status(second), Some(ReturnStatus::Success));
    assert_eq!(connection.response_param(second, "auth").as_deref(), Some("B"));
    assert_eq!(connection.response(first)?.code(), Some("DENY"));
    connection.disconnect().await;
    assert_eq!(connection.transactions_in_queue(), 0);
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn blocking_send_waits_for_the_response() -> Result<(), AnyError> {
    let body = b"code=\"SUCCESS\"\r\nverbiage=\"ok\"\r\n";
    let mock = MockProcessor::start(|_| Reply::Body(body.to_vec())).await?;
    let connection = plain(&mock);
    connection.set_blocking(true);
    connection.set_timeout(Some(Duration::from_secs(30)));
    connection.connect().await?;

    let id = connection.new_transaction();
    connection.set_field(id, "action", "chkpwd")?;
    connection.send(id).await?;

    assert_eq!(connection.status(id), Some(TransactionStatus::Done));
    assert_eq!(
        connection.response_keys(id),
        Some(vec!["code".to_owned(), "verbiage".to_owned()])
    );
    assert_eq!(connection.raw_response(id).as_deref(), Some(&body[..]));
    let sent = mock.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id, id.to_string());
    assert_eq!(sent[0].field("action").as_deref(), Some("chkpwd"));
    assert_eq!(sent[0].field("timeout").as_deref(), Some("30"));

    connection.delete_transaction(id)?;
    assert_eq!(connection.status(id), None);
    connection.disconnect().await;
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn remote_close_is_fatal_and_recorded() -> Result<(), AnyError> {
    let mock = MockProcessor::start(|_| Reply::Close).await?;
    let connection = plain(&mock);
    connection.set_blocking(true);
    connection.connect().await?;

    let id = connection.new_transaction();
    connection.set_field(id, "action", "sale")?;
    let err = connection.send(id).await.expect_err("server closed");

    assert!(err.is_fatal());
    assert!(!connection.is_connected());
    assert_eq!(connection.connection_error(), "read failure: remote disconnect");
    assert_eq!(connection.transport_mode().await, None);
    assert_eq!(connection.status(id), Some(TransactionStatus::Sent));
    assert!(matches!(
        connection.monitor().await,
        Err(ConnectionError::NotConnected)
    ));
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn corrupt_stream_closes_the_connection() -> Result<(), AnyError> {
    let mock = MockProcessor::start(|_| Reply::Raw(b"garbage".to_vec())).await?;
    let connection = plain(&mock);
    connection.set_blocking(true);
    connection.connect().await?;

    let id = connection.new_transaction();
    connection.set_field(id, "action", "sale")?;
    let err = connection.send(id).await.expect_err("corrupt stream");

    assert!(matches!(err, ConnectionError::Protocol(_)));
    assert!(!connection.is_connected());
    assert!(connection.connection_error().contains("must start with STX"));
    Ok(())
}

#[expect(clippy::panic_in_result_fn, reason = "test assertions")]
#[tokio::test]
async fn reconnect_replaces_the_transport() -> Result<(), AnyError> {
    let mock = MockProcessor::start(|_| Reply::Silent).await?;
    let connection = plain(&mock);
    connection.connect().await?;
    connection.connect().await?;

    assert_eq!(mock.connections(), 2);
    assert!(connection.is_connected());
    connection.disconnect().await;
    Ok(())
}
