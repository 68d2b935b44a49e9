//! Supersession and shutdown behavior of interactive clients.

mod common;

use common::{fast_config, product_json, products_json, FakeTransport, Script};
use fakestore_client::{CancelReason, FakeStoreClient};
use std::sync::Arc;
use std::time::Duration;

fn client(
    config: fakestore_client::ClientConfig,
    transport: Arc<FakeTransport>,
) -> Arc<FakeStoreClient> {
    Arc::new(FakeStoreClient::with_transport(config, transport).unwrap())
}

#[tokio::test]
async fn rapid_duplicate_call_supersedes_the_first_request() {
    let transport =
        FakeTransport::scripted(vec![Script::Hang, Script::Ok(products_json(&[7]))]);
    let client = client(fast_config(), transport.clone());

    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.products(Some(1)).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Same key again: the hung first call must be cancelled, and this call
    // must get a fresh execution rather than joining the dying one.
    let second = client.products(Some(1)).await.unwrap();
    assert_eq!(second[0].id, 7);

    let first = first.await.unwrap().unwrap_err();
    assert_eq!(first.cancel_reason(), Some(CancelReason::Superseded));

    assert_eq!(transport.calls(), 2);
    assert_eq!(transport.cancellations(), 1, "the first transport attempt observed the cancel");
    assert_eq!(client.pending_requests(), 0, "no entries may outlive settlement");
    assert_eq!(client.live_cancel_handles(), 0);
}

#[tokio::test]
async fn cancel_all_aborts_everything_in_flight() {
    let transport = FakeTransport::scripted(vec![Script::Hang, Script::Hang]);
    let client = client(fast_config(), transport.clone());

    let list = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.products(None).await }
    });
    let single = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.product(1).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    client.cancel_all();

    let list = list.await.unwrap().unwrap_err();
    let single = single.await.unwrap().unwrap_err();
    assert_eq!(list.cancel_reason(), Some(CancelReason::Shutdown));
    assert_eq!(single.cancel_reason(), Some(CancelReason::Shutdown));
    assert_eq!(client.live_cancel_handles(), 0);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn requests_for_different_keys_do_not_interfere() {
    let transport = FakeTransport::scripted(vec![
        Script::OkAfter(Duration::from_millis(30), products_json(&[1])),
        Script::OkAfter(Duration::from_millis(30), product_json(2)),
    ]);
    let client = client(fast_config(), transport.clone());

    let (listing, single) = tokio::join!(client.products(None), client.product(2));

    assert_eq!(listing.unwrap()[0].id, 1);
    assert_eq!(single.unwrap().id, 2);
    assert_eq!(transport.calls(), 2);
    assert_eq!(transport.cancellations(), 0);
    assert_eq!(client.live_cancel_handles(), 0);
}

#[tokio::test]
async fn server_clients_join_instead_of_cancelling() {
    let transport = FakeTransport::scripted(vec![Script::OkAfter(
        Duration::from_millis(30),
        products_json(&[5]),
    )]);
    let client = client(fast_config().server(), transport.clone());

    let (a, b) = tokio::join!(client.products(None), client.products(None));

    assert_eq!(a.unwrap()[0].id, 5);
    assert_eq!(b.unwrap()[0].id, 5);
    assert_eq!(transport.calls(), 1, "server-side duplicates share one execution");
    assert_eq!(transport.cancellations(), 0);
    assert_eq!(client.live_cancel_handles(), 0, "server clients carry no registry");
}

#[tokio::test]
async fn cancel_all_on_a_server_client_is_a_noop() {
    let transport = FakeTransport::scripted(vec![Script::Ok(products_json(&[1]))]);
    let client = client(fast_config().server(), transport.clone());

    client.cancel_all();
    assert_eq!(client.products(None).await.unwrap().len(), 1);
}
