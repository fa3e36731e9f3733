use calendar_execution::{
    client::okx::{OkxCredentials, OkxSession},
    dispatch::OrderListener,
    order::OrderId,
};
use calendar_integration::protocol::stream::{ConnectionConfig, PersistentConnection};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const ORDER_PUSH: &str = r#"{
    "arg": { "channel": "orders", "instType": "FUTURES" },
    "data": [{
        "instId": "BTC-USD-250131", "ordId": "7", "ordType": "limit",
        "state": "filled", "sz": "1", "accFillSz": "1", "px": "100",
        "avgPx": "100", "fee": "-0.01", "uTime": "1597026383085"
    }]
}"#;

async fn next_json(
    websocket: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
) -> Value {
    loop {
        match websocket.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_private_session_login_subscribe_and_route() {
    let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", server.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (stream, _) = server.accept().await.unwrap();
        let mut websocket = tokio_tungstenite::accept_async(stream).await.unwrap();

        let login = next_json(&mut websocket).await;
        assert_eq!(login["op"], "login");
        assert_eq!(login["args"][0]["apiKey"], "key");
        websocket
            .send(Message::text(r#"{"event":"login","code":"0","msg":""}"#))
            .await
            .unwrap();

        let subscribe = next_json(&mut websocket).await;
        assert_eq!(subscribe["op"], "subscribe");
        assert_eq!(subscribe["args"][0]["channel"], "orders");
        websocket
            .send(Message::text(
                r#"{"event":"subscribe","arg":{"channel":"orders","instType":"FUTURES"}}"#,
            ))
            .await
            .unwrap();

        websocket.send(Message::text(ORDER_PUSH)).await.unwrap();

        // hold the socket open until the client goes away
        while let Some(Ok(_)) = websocket.next().await {}
    });

    let orders = Arc::new(OrderListener::new());
    let session = OkxSession::private(
        &url,
        OkxCredentials::new("key", "secret", "pass"),
        orders.clone(),
    )
    .unwrap();
    let connection = Arc::new(PersistentConnection::new(session, ConnectionConfig::default()));
    let client = tokio::spawn({
        let connection = connection.clone();
        async move { connection.run().await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while orders.buffered(OrderId(7)) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("order push not routed");

    client.abort();
    let _ = client.await;
    let _ = server.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_private_session_login_rejected() {
    let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", server.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = server.accept().await.unwrap();
        let mut websocket = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = next_json(&mut websocket).await;
        websocket
            .send(Message::text(r#"{"event":"error","code":"60009","msg":"Login failed."}"#))
            .await
            .unwrap();
        while let Some(Ok(_)) = websocket.next().await {}
    });

    let session = OkxSession::private(
        &url,
        OkxCredentials::new("key", "secret", "pass"),
        Arc::new(OrderListener::new()),
    )
    .unwrap();
    let connection = PersistentConnection::new(session, ConnectionConfig::default());

    let (error, established) = connection.serve().await;
    assert!(!established);
    assert!(
        matches!(error, calendar_integration::error::SocketError::Login(msg) if msg.contains("60009"))
    );
}
