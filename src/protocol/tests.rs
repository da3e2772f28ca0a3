use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::codec::Encoder;

use super::*;
use crate::config::{DataField, FieldKind, Form, Options, SendData, Step, TransactionSpec};
use crate::data::{FileSources, Resolver};
use crate::error::{CODE_CONNECT, CODE_UNSUPPORTED, TransportError};

fn run_async_test<F>(future: F) -> Result<(), String>
where
    F: Future<Output = Result<(), String>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("Failed to build runtime: {}", err))?;
    runtime.block_on(future)
}

fn context(options: Options) -> Result<RequesterContext, String> {
    Ok(RequesterContext {
        options: Arc::new(options),
        resolver: Resolver::new(Arc::new(FileSources::new("."))),
        timeout: Duration::from_secs(2),
        http_client: build_http_client().map_err(|err| format!("client failed: {}", err))?,
        pool: Arc::new(ConnectionPool::new()),
    })
}

fn literal(name: &str, value: &str) -> DataField {
    DataField {
        name: name.to_owned(),
        default: Some(value.to_owned()),
        ..DataField::default()
    }
}

async fn spawn_echo() -> Result<String, String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|err| format!("bind failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("addr failed: {}", err))?;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut framed = frame_codec(1024).new_framed(stream);
                while let Some(Ok(frame)) = framed.next().await {
                    if framed.send(frame.freeze()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    Ok(addr.to_string())
}

async fn spawn_http(status_line: &'static str) -> Result<String, String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|err| format!("bind failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("addr failed: {}", err))?;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0_u8; 4096];
                let mut seen = Vec::new();
                while let Ok(read) = stream.read(&mut buf).await {
                    if read == 0 {
                        return;
                    }
                    seen.extend_from_slice(buf.get(..read).unwrap_or_default());
                    if seen.windows(4).any(|window| window == b"\r\n\r\n") {
                        break;
                    }
                }
                let body = "{\"ok\":true}";
                let reply = format!(
                    "{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                drop(stream.write_all(reply.as_bytes()).await);
            });
        }
    });
    Ok(format!("http://{}/", addr))
}

async fn closed_port() -> Result<String, String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|err| format!("bind failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("addr failed: {}", err))?;
    drop(listener);
    Ok(addr.to_string())
}

#[test]
fn builtins_cover_http_and_tcp_only() -> Result<(), String> {
    let table = ProtocolTable::with_builtins();
    if !table.supports(Form::Http) || !table.supports(Form::Tcp) {
        return Err("expected http and tcp builtins".to_owned());
    }
    if table.supports(Form::WebSocket) {
        return Err("websocket must not be registered".to_owned());
    }
    Ok(())
}

#[test]
fn duplicate_registration_is_rejected() -> Result<(), String> {
    fn ctor(_ctx: &RequesterContext) -> Result<Box<dyn Requester>, TransportError> {
        Err(TransportError::ConnectionClosed)
    }
    let mut table = ProtocolTable::empty();
    table
        .register(Form::WebSocket, ctor)
        .map_err(|err| err.message)?;
    match table.register(Form::WebSocket, ctor) {
        Err(err) if err.message.contains("websocket") => Ok(()),
        other => Err(format!("expected duplicate error, got {:?}", other)),
    }
}

#[test]
fn websocket_form_is_unsupported() -> Result<(), String> {
    run_async_test(async {
        let ctx = context(Options {
            url: "ws://127.0.0.1:1".to_owned(),
            concurrent: 1,
            form: Form::WebSocket,
            ..Options::default()
        })?;
        match ProtocolTable::with_builtins().build(&ctx) {
            Err(err) if err.code() == CODE_UNSUPPORTED => Ok(()),
            Err(err) => Err(format!("unexpected error {}", err)),
            Ok(_) => Err("websocket requester should not build".to_owned()),
        }
    })
}

#[test]
fn tcp_address_accepts_plain_and_scheme_forms() -> Result<(), String> {
    let plain = tcp_address("127.0.0.1:9000").map_err(|err| err.to_string())?;
    let scheme = tcp_address("tcp://127.0.0.1:9000").map_err(|err| err.to_string())?;
    if plain != "127.0.0.1:9000" || scheme != "127.0.0.1:9000" {
        return Err(format!("unexpected addresses {} {}", plain, scheme));
    }
    if tcp_address("localhost").is_ok() || tcp_address("tcp://localhost").is_ok() {
        return Err("addresses without a port must be rejected".to_owned());
    }
    Ok(())
}

#[test]
fn frame_codec_prefixes_big_endian_length() -> Result<(), String> {
    let mut codec = frame_codec(1024).new_codec();
    let mut out = BytesMut::new();
    codec
        .encode(Bytes::from_static(b"abc"), &mut out)
        .map_err(|err| format!("encode failed: {}", err))?;
    if out.as_ref() != [0, 0, 0, 3, b'a', b'b', b'c'] {
        return Err(format!("unexpected frame {:?}", out));
    }
    Ok(())
}

#[test]
fn tcp_single_exchange_reuses_pooled_connection() -> Result<(), String> {
    run_async_test(async {
        let addr = spawn_echo().await?;
        let ctx = context(Options {
            url: addr.clone(),
            concurrent: 1,
            form: Form::Tcp,
            send_data: Some(SendData {
                data_field_list: vec![literal("hello", "world")],
            }),
            ..Options::default()
        })?;
        let mut requester = ProtocolTable::with_builtins()
            .build(&ctx)
            .map_err(|err| err.to_string())?;

        for _ in 0..3 {
            let response = requester
                .dispose()
                .await
                .map_err(|failure| failure.error.to_string())?;
            if response.data.as_ref() != b"{\"hello\":\"world\"}" {
                return Err(format!("unexpected echo {:?}", response.data));
            }
        }
        if ctx.pool.open_count(&addr) != 1 || ctx.pool.idle_count(&addr) != 1 {
            return Err(format!(
                "expected one pooled connection, open={} idle={}",
                ctx.pool.open_count(&addr),
                ctx.pool.idle_count(&addr)
            ));
        }
        Ok(())
    })
}

#[test]
fn tcp_dial_failure_reports_connect_code() -> Result<(), String> {
    run_async_test(async {
        let addr = closed_port().await?;
        let ctx = context(Options {
            url: addr.clone(),
            concurrent: 1,
            form: Form::Tcp,
            ..Options::default()
        })?;
        let mut requester = ProtocolTable::with_builtins()
            .build(&ctx)
            .map_err(|err| err.to_string())?;
        match requester.dispose().await {
            Err(failure) if failure.response.err_code == CODE_CONNECT => {}
            Err(failure) => return Err(format!("unexpected failure {}", failure.error)),
            Ok(_) => return Err("dial to a closed port succeeded".to_owned()),
        }
        if ctx.pool.open_count(&addr) != 0 {
            return Err("failed dial must not hold a pool slot".to_owned());
        }
        Ok(())
    })
}

#[test]
fn transaction_feeds_previous_response_forward() -> Result<(), String> {
    run_async_test(async {
        let addr = spawn_echo().await?;
        let login = Step {
            name: "login".to_owned(),
            url: addr.clone(),
            send_data: Some(SendData {
                data_field_list: vec![literal("token", "abc")],
            }),
            ..Step::default()
        };
        let order = Step {
            name: "order".to_owned(),
            url: addr.clone(),
            send_data: Some(SendData {
                data_field_list: vec![
                    DataField {
                        name: "echoed".to_owned(),
                        kind: FieldKind::TransactionResponse,
                        dynamic: Some("login---token".to_owned()),
                        ..DataField::default()
                    },
                    DataField {
                        name: "ahead".to_owned(),
                        kind: FieldKind::TransactionResponse,
                        dynamic: Some("order---token".to_owned()),
                        ..DataField::default()
                    },
                ],
            }),
            ..Step::default()
        };
        let ctx = context(Options {
            url: addr,
            concurrent: 1,
            form: Form::Tcp,
            transaction_options: TransactionSpec {
                steps: vec![login, order],
            },
            ..Options::default()
        })?;
        let mut requester = ProtocolTable::with_builtins()
            .build(&ctx)
            .map_err(|err| err.to_string())?;

        for _ in 0..2 {
            let response = requester
                .dispose()
                .await
                .map_err(|failure| failure.error.to_string())?;
            let value: serde_json::Value = serde_json::from_slice(&response.data)
                .map_err(|err| format!("bad echo: {}", err))?;
            if value != serde_json::json!({"echoed": "abc", "ahead": ""}) {
                return Err(format!("unexpected final payload {}", value));
            }
            let steps = response
                .transaction_waste_time
                .ok_or_else(|| "missing step times".to_owned())?;
            if !steps.contains_key("login") || !steps.contains_key("order") {
                return Err(format!("unexpected step times {:?}", steps));
            }
        }
        Ok(())
    })
}

#[test]
fn transaction_failure_names_the_step() -> Result<(), String> {
    run_async_test(async {
        let addr = spawn_echo().await?;
        let dead = closed_port().await?;
        let ctx = context(Options {
            url: addr.clone(),
            concurrent: 1,
            form: Form::Tcp,
            transaction_options: TransactionSpec {
                steps: vec![
                    Step {
                        name: "login".to_owned(),
                        url: addr,
                        ..Step::default()
                    },
                    Step {
                        name: "checkout".to_owned(),
                        url: dead,
                        ..Step::default()
                    },
                ],
            },
            ..Options::default()
        })?;
        let mut requester = ProtocolTable::with_builtins()
            .build(&ctx)
            .map_err(|err| err.to_string())?;
        match requester.dispose().await {
            Err(failure)
                if failure.response.err_msg.starts_with("checkout")
                    && failure.response.err_code == CODE_CONNECT =>
            {
                Ok(())
            }
            Err(failure) => Err(format!("unexpected failure {:?}", failure.response)),
            Ok(_) => Err("transaction with a dead step succeeded".to_owned()),
        }
    })
}

#[test]
fn http_ok_is_success() -> Result<(), String> {
    run_async_test(async {
        let url = spawn_http("HTTP/1.1 200 OK").await?;
        let ctx = context(Options {
            url,
            concurrent: 1,
            ..Options::default()
        })?;
        let mut requester = ProtocolTable::with_builtins()
            .build(&ctx)
            .map_err(|err| err.to_string())?;
        let response = requester
            .dispose()
            .await
            .map_err(|failure| failure.error.to_string())?;
        if !response.is_success || response.data.as_ref() != b"{\"ok\":true}" {
            return Err(format!("unexpected response {:?}", response));
        }
        Ok(())
    })
}

#[test]
fn http_non_200_uses_status_as_code() -> Result<(), String> {
    run_async_test(async {
        let url = spawn_http("HTTP/1.1 500 Internal Server Error").await?;
        let ctx = context(Options {
            url,
            concurrent: 1,
            ..Options::default()
        })?;
        let mut requester = ProtocolTable::with_builtins()
            .build(&ctx)
            .map_err(|err| err.to_string())?;
        match requester.dispose().await {
            Err(failure) if failure.response.err_code == 500 => {
                if failure.response.err_msg.is_empty() {
                    return Err("missing error message".to_owned());
                }
                Ok(())
            }
            Err(failure) => Err(format!("unexpected failure {:?}", failure.response)),
            Ok(_) => Err("500 must not count as success".to_owned()),
        }
    })
}

#[test]
fn recv_without_send_fails() -> Result<(), String> {
    run_async_test(async {
        let ctx = context(Options {
            url: "http://127.0.0.1:1/".to_owned(),
            concurrent: 1,
            ..Options::default()
        })?;
        let mut requester = ProtocolTable::with_builtins()
            .build(&ctx)
            .map_err(|err| err.to_string())?;
        match requester.recv().await {
            Err(TransportError::NothingSent) => Ok(()),
            other => Err(format!("expected NothingSent, got {:?}", other.map(|_| ()))),
        }
    })
}

#[test]
fn pool_waits_then_dials_past_capacity() -> Result<(), String> {
    run_async_test(async {
        let addr = spawn_echo().await?;
        let pool = ConnectionPool::new();
        let options = crate::config::TcpOptions {
            pool_capacity: 1,
            pool_wait_ms: 50,
            ..crate::config::TcpOptions::default()
        };
        let timeout = Duration::from_secs(1);
        let first = pool
            .get("k", &addr, &options, timeout)
            .await
            .map_err(|err| err.to_string())?;
        let started = tokio::time::Instant::now();
        let second = pool
            .get("k", &addr, &options, timeout)
            .await
            .map_err(|err| err.to_string())?;
        if started.elapsed() < Duration::from_millis(40) {
            return Err("second checkout did not wait for a return".to_owned());
        }
        if pool.open_count("k") != 2 {
            return Err(format!("expected 2 open, got {}", pool.open_count("k")));
        }
        pool.put("k", first, options.pool_capacity);
        pool.put("k", second, options.pool_capacity);
        if pool.idle_count("k") != 1 || pool.open_count("k") != 1 {
            return Err(format!(
                "expected capacity-bounded idle set, idle={} open={}",
                pool.idle_count("k"),
                pool.open_count("k")
            ));
        }
        Ok(())
    })
}

#[test]
fn pool_hands_back_returned_connection_to_waiter() -> Result<(), String> {
    run_async_test(async {
        let addr = spawn_echo().await?;
        let pool = Arc::new(ConnectionPool::new());
        let options = crate::config::TcpOptions {
            pool_capacity: 1,
            pool_wait_ms: 5_000,
            ..crate::config::TcpOptions::default()
        };
        let timeout = Duration::from_secs(1);
        let first = pool
            .get("k", &addr, &options, timeout)
            .await
            .map_err(|err| err.to_string())?;

        let waiter_pool = Arc::clone(&pool);
        let waiter_options = options.clone();
        let waiter_addr = addr.clone();
        let waiter = tokio::spawn(async move {
            waiter_pool
                .get("k", &waiter_addr, &waiter_options, timeout)
                .await
                .map(|_| ())
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.put("k", first, options.pool_capacity);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .map_err(|_elapsed| "waiter was not woken".to_owned())?
            .map_err(|err| format!("waiter panicked: {}", err))?
            .map_err(|err| err.to_string())?;
        if pool.open_count("k") != 1 {
            return Err(format!("expected reuse, open={}", pool.open_count("k")));
        }
        Ok(())
    })
}
