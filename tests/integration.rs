use redis::aio::MultiplexedConnection;
use redis::{RedisError, Value};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration, Instant};

use redkv::server::serve;
use redkv::store::Store;

/// Starts a server on a free port and returns a client connection to it.
async fn connect() -> Result<MultiplexedConnection, RedisError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    tokio::spawn(serve(listener, Store::new()));

    let client = redis::Client::open(format!("redis://{}/", address))?;
    client.get_multiplexed_async_connection().await
}

#[tokio::test]
async fn test_ping_and_echo() {
    let mut connection = connect().await.unwrap();

    let pong: String = redis::cmd("PING").query_async(&mut connection).await.unwrap();
    assert_eq!(pong, "PONG");

    let echo: String = redis::cmd("ECHO")
        .arg("Hello, World!")
        .query_async(&mut connection)
        .await
        .unwrap();
    assert_eq!(echo, "Hello, World!");
}

#[tokio::test]
async fn test_set_and_get() {
    let mut connection = connect().await.unwrap();

    let (a, b, missing): (String, Vec<u8>, Option<String>) = redis::pipe()
        .cmd("SET")
        .arg("set_get_key_1")
        .arg("Argentina")
        .ignore()
        .cmd("SET")
        .arg("set_get_key_2")
        .arg(&[0u8, 159, 146, 150][..])
        .ignore()
        .cmd("GET")
        .arg("set_get_key_1")
        .cmd("GET")
        .arg("set_get_key_2")
        .cmd("GET")
        .arg("set_get_nonexistentkey")
        .query_async(&mut connection)
        .await
        .unwrap();

    assert_eq!(a, "Argentina");
    assert_eq!(b, vec![0u8, 159, 146, 150]);
    assert_eq!(missing, None);
}

#[tokio::test]
async fn test_set_px_expires() {
    let mut connection = connect().await.unwrap();

    let _: () = redis::cmd("SET")
        .arg("px_key")
        .arg("v")
        .arg("PX")
        .arg(100)
        .query_async(&mut connection)
        .await
        .unwrap();

    let value: Option<String> = redis::cmd("GET")
        .arg("px_key")
        .query_async(&mut connection)
        .await
        .unwrap();
    assert_eq!(value.as_deref(), Some("v"));

    sleep(Duration::from_millis(150)).await;

    let value: Option<String> = redis::cmd("GET")
        .arg("px_key")
        .query_async(&mut connection)
        .await
        .unwrap();
    assert_eq!(value, None);

    let type_: String = redis::cmd("TYPE")
        .arg("px_key")
        .query_async(&mut connection)
        .await
        .unwrap();
    assert_eq!(type_, "none");
}

#[tokio::test]
async fn test_lists() {
    let mut connection = connect().await.unwrap();

    let (pushed, prepended, all, tail, len, popped, popped_many, type_): (
        i64,
        i64,
        Vec<String>,
        Vec<String>,
        i64,
        String,
        Vec<String>,
        String,
    ) = redis::pipe()
        .cmd("RPUSH")
        .arg("list")
        .arg("c")
        .arg("d")
        .arg("e")
        .cmd("LPUSH")
        .arg("list")
        .arg("b")
        .arg("a")
        .cmd("LRANGE")
        .arg("list")
        .arg(0)
        .arg(-1)
        .cmd("LRANGE")
        .arg("list")
        .arg(-2)
        .arg(100)
        .cmd("LLEN")
        .arg("list")
        .cmd("LPOP")
        .arg("list")
        .cmd("LPOP")
        .arg("list")
        .arg(10)
        .cmd("TYPE")
        .arg("list")
        .query_async(&mut connection)
        .await
        .unwrap();

    assert_eq!(pushed, 3);
    assert_eq!(prepended, 5);
    assert_eq!(all, vec!["a", "b", "c", "d", "e"]);
    assert_eq!(tail, vec!["d", "e"]);
    assert_eq!(len, 5);
    assert_eq!(popped, "a");
    assert_eq!(popped_many, vec!["b", "c", "d", "e"]);
    assert_eq!(type_, "none");
}

#[tokio::test]
async fn test_wrong_type() {
    let mut connection = connect().await.unwrap();

    let _: () = redis::cmd("SET")
        .arg("string")
        .arg("v")
        .query_async(&mut connection)
        .await
        .unwrap();

    let err = redis::cmd("RPUSH")
        .arg("string")
        .arg("x")
        .query_async::<_, i64>(&mut connection)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("WRONGTYPE"), "{}", err);
}

#[tokio::test]
async fn test_incr() {
    let mut connection = connect().await.unwrap();

    let (first, second): (i64, i64) = redis::pipe()
        .cmd("INCR")
        .arg("counter")
        .cmd("INCR")
        .arg("counter")
        .query_async(&mut connection)
        .await
        .unwrap();
    assert_eq!((first, second), (1, 2));

    let _: () = redis::cmd("SET")
        .arg("counter")
        .arg("ten")
        .query_async(&mut connection)
        .await
        .unwrap();
    let err = redis::cmd("INCR")
        .arg("counter")
        .query_async::<_, i64>(&mut connection)
        .await
        .unwrap_err();

    assert_eq!(err.detail(), Some("value is not an integer or out of range"));
}

#[tokio::test]
async fn test_blpop_woken_by_push() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, Store::new()));
    let client = redis::Client::open(format!("redis://{}/", address)).unwrap();

    let mut blocked = client.get_multiplexed_async_connection().await.unwrap();
    let mut pusher = client.get_multiplexed_async_connection().await.unwrap();

    let pop = tokio::spawn(async move {
        redis::cmd("BLPOP")
            .arg("queue")
            .arg(0)
            .query_async::<_, (String, String)>(&mut blocked)
            .await
    });
    sleep(Duration::from_millis(50)).await;

    let length: i64 = redis::cmd("RPUSH")
        .arg("queue")
        .arg("job")
        .query_async(&mut pusher)
        .await
        .unwrap();
    assert_eq!(length, 1);

    let popped = pop.await.unwrap().unwrap();
    assert_eq!(popped, ("queue".to_string(), "job".to_string()));

    // The element was handed over, never stored.
    let rest: Vec<String> = redis::cmd("LRANGE")
        .arg("queue")
        .arg(0)
        .arg(-1)
        .query_async(&mut pusher)
        .await
        .unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_blpop_timeout() {
    let mut connection = connect().await.unwrap();
    let start = Instant::now();

    let popped: Option<(String, String)> = redis::cmd("BLPOP")
        .arg("empty")
        .arg(0.1)
        .query_async(&mut connection)
        .await
        .unwrap();

    assert_eq!(popped, None);
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_transaction() {
    let mut connection = connect().await.unwrap();

    let (set, incremented): (String, i64) = redis::pipe()
        .atomic()
        .cmd("SET")
        .arg("tx_key")
        .arg(1)
        .cmd("INCR")
        .arg("tx_key")
        .query_async(&mut connection)
        .await
        .unwrap();

    assert_eq!(set, "OK");
    assert_eq!(incremented, 2);

    let value: i64 = redis::cmd("GET")
        .arg("tx_key")
        .query_async(&mut connection)
        .await
        .unwrap();
    assert_eq!(value, 2);
}

#[tokio::test]
async fn test_exec_without_multi() {
    let mut connection = connect().await.unwrap();

    let err = redis::cmd("EXEC")
        .query_async::<_, Value>(&mut connection)
        .await
        .unwrap_err();

    assert_eq!(err.detail(), Some("EXEC without MULTI"));
}

#[tokio::test]
async fn test_info_replication() {
    let mut connection = connect().await.unwrap();

    let info: String = redis::cmd("INFO")
        .arg("replication")
        .query_async(&mut connection)
        .await
        .unwrap();

    assert!(info.contains("role:master"));
    assert!(info.contains("master_repl_offset:0"));
}
