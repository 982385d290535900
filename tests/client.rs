//! 针对回环 fixture 服务器的端到端场景。
//!
//! 驱动任务经 `spawn_local` 派生，所有测试体都跑在 `LocalSet` 内。

mod support;

use std::time::Duration;

use onereq::error::Kind;
use onereq::{Body, OneShot, State};
use serde::Serialize;
use tokio::task::LocalSet;

const PATTERN: &[u8] = b"This is a pattern!";
const PATTERN_LEN: usize = 2_000_000;

fn pattern_body() -> Vec<u8> {
    PATTERN.iter().copied().cycle().take(PATTERN_LEN).collect()
}

#[tokio::test]
async fn silent_rejection_without_body_maps_to_connection_reset() {
    let _ = pretty_env_logger::try_init();
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/silentrejection"))
                .build()
                .unwrap();
            let err = req.perform().unwrap().await.unwrap_err();
            assert_eq!(err.kind(), Kind::ConnectionReset, "{err:?}");
            assert_eq!(req.state(), State::Failed);
        })
        .await;
}

#[tokio::test]
async fn silent_rejection_with_body_fails_the_write() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/silentrejection"))
                .method("POST")
                .body(pattern_body())
                .build()
                .unwrap();
            let err = req.perform().unwrap().await.unwrap_err();
            // which chunk observes the reset depends on kernel timing
            assert!(
                matches!(err.kind(), Kind::BrokenPipe | Kind::ConnectionReset),
                "{err:?}",
            );
            assert_eq!(req.state(), State::Failed);
        })
        .await;
}

#[tokio::test]
async fn silent_wait_trips_the_response_timer() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/silenttimeout"))
                .timeout(Duration::from_millis(200))
                .build()
                .unwrap();
            let err = req.perform().unwrap().await.unwrap_err();
            assert_eq!(err.kind(), Kind::ResponseTimedOut, "{err:?}");
            assert!(err.is_timeout());
            let msg = err.to_string();
            assert!(msg.contains("200ms"), "{msg}");
            assert!(msg.contains(&server.addr().to_string()), "{msg}");
            assert_eq!(req.state(), State::Failed);
        })
        .await;
}

#[tokio::test]
async fn stalled_request_write_trips_the_request_timer() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            // the endpoint stops reading after the head, so a body larger
            // than anything the socket buffers can absorb stalls the write
            let req = OneShot::builder(server.url("/silenttimeout"))
                .method("POST")
                .timeout(Duration::from_millis(200))
                .body(vec![0u8; 64 * 1024 * 1024])
                .build()
                .unwrap();
            let err = req.perform().unwrap().await.unwrap_err();
            assert_eq!(err.kind(), Kind::RequestTimedOut, "{err:?}");
            assert_eq!(req.state(), State::Failed);
        })
        .await;
}

#[tokio::test]
async fn check_pattern_echoes_the_body_byte_for_byte() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let body = pattern_body();
            let req = OneShot::builder(server.url("/checkpattern"))
                .method("POST")
                .header("content-type", "application/octet-stream")
                .body(body.clone())
                .build()
                .unwrap();
            let resp = req.perform().unwrap().await.unwrap();
            assert_eq!(resp.status_code(), 200);
            assert_eq!(resp.status_message(), "OK");
            assert_eq!(resp.headers()["content-type"], "application/octet-stream");
            assert_eq!(resp.headers()["content-length"], "2000000");
            assert_eq!(&resp.bytes().unwrap()[..], &body[..]);
            assert_eq!(req.state(), State::Fulfilled);
        })
        .await;
}

#[tokio::test]
async fn cancel_during_silent_wait_is_acknowledged() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/silenttimeout"))
                .build()
                .unwrap();
            let perform = req.perform().unwrap();

            let (result, acked) = tokio::join!(perform, async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                let cancel = req.cancel().unwrap();
                // the transition is observable before the future resolves
                assert_eq!(req.state(), State::Cancelling);
                cancel.await
            });

            let err = result.unwrap_err();
            assert_eq!(err.kind(), Kind::RequestCancelled, "{err:?}");
            assert!(err.is_cancelled());
            assert!(acked);
            assert_eq!(req.state(), State::Cancelled);
        })
        .await;
}

#[tokio::test]
async fn empty_response_has_no_body_field() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/silentresponse"))
                .build()
                .unwrap();
            let resp = req.perform().unwrap().await.unwrap();
            assert_eq!(resp.status_code(), 204);
            assert_eq!(resp.status_message(), "No Content");
            assert!(resp.body().is_none());
            assert_eq!(req.state(), State::Fulfilled);
        })
        .await;
}

#[tokio::test]
async fn unserializable_body_rejects_at_perform_time() {
    struct Cyclic;

    impl Serialize for Cyclic {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cannot serialize a cycle"))
        }
    }

    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/checkpattern"))
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::json(&Cyclic))
                .build()
                .expect("construction never fails on the body");
            let err = req.perform().unwrap().await.unwrap_err();
            assert_eq!(err.kind(), Kind::BodyNotSerializable, "{err:?}");
            assert_eq!(req.state(), State::Failed);
        })
        .await;
}

#[tokio::test]
async fn perform_is_idempotent_while_requesting() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/json")).build().unwrap();
            let first = req.perform().unwrap();
            assert_eq!(req.state(), State::Requesting);
            let second = req.perform().unwrap();

            let (a, b) = tokio::join!(first, second);
            let (a, b) = (a.unwrap(), b.unwrap());
            assert_eq!(a.status_code(), 200);
            assert_eq!(b.status_code(), 200);
            assert_eq!(req.state(), State::Fulfilled);
        })
        .await;
}

#[tokio::test]
async fn cancel_is_idempotent_while_cancelling() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/silenttimeout"))
                .build()
                .unwrap();
            let perform = req.perform().unwrap();

            let ((), both) = tokio::join!(
                async {
                    let _ = perform.await;
                },
                async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let first = req.cancel().unwrap();
                    let second = req.cancel().unwrap();
                    tokio::join!(first, second)
                }
            );
            assert_eq!(both, (true, true));
            assert_eq!(req.state(), State::Cancelled);
        })
        .await;
}

#[tokio::test]
async fn terminal_states_reject_further_calls() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/silentresponse"))
                .build()
                .unwrap();
            req.perform().unwrap().await.unwrap();
            assert_eq!(req.state(), State::Fulfilled);

            assert_eq!(
                req.perform().unwrap_err().kind(),
                Kind::PerformUnavailable
            );
            assert_eq!(req.cancel().unwrap_err().kind(), Kind::CancelUnavailable);
        })
        .await;
}

#[tokio::test]
async fn json_response_is_auto_decoded() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/json")).build().unwrap();
            let resp = req.perform().unwrap().await.unwrap();
            let value = resp.json().expect("decoded body");
            assert_eq!(value["hello"], "world");
            assert_eq!(value["count"], 3);
        })
        .await;
}

#[tokio::test]
async fn json_response_honors_the_charset_parameter() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/json16")).build().unwrap();
            let resp = req.perform().unwrap().await.unwrap();
            assert_eq!(resp.json().unwrap()["wide"], true);
        })
        .await;
}

#[tokio::test]
async fn disabled_auto_parse_keeps_json_bytes_raw() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/json"))
                .auto_json_response_parse(false)
                .build()
                .unwrap();
            let resp = req.perform().unwrap().await.unwrap();
            assert!(resp.json().is_none());
            let bytes = resp.bytes().unwrap();
            assert!(bytes.starts_with(b"{"));
        })
        .await;
}

#[tokio::test]
async fn undecodable_json_body_fails_the_request() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            let req = OneShot::builder(server.url("/jsonbad")).build().unwrap();
            let err = req.perform().unwrap().await.unwrap_err();
            assert_eq!(err.kind(), Kind::ResponseBodyNotJson, "{err:?}");
            assert_eq!(req.state(), State::Failed);
        })
        .await;
}

#[tokio::test]
async fn inbound_chunks_refresh_the_response_timer() {
    LocalSet::new()
        .run_until(async {
            let server = support::spawn().await;
            // six bytes dripped 60ms apart: 360ms total, but never more
            // than 60ms between chunks, well under the 200ms timeout
            let req = OneShot::builder(server.url("/drip"))
                .timeout(Duration::from_millis(200))
                .build()
                .unwrap();
            let resp = req.perform().unwrap().await.unwrap();
            assert_eq!(&resp.bytes().unwrap()[..], b"dreams");
            assert_eq!(req.state(), State::Fulfilled);
        })
        .await;
}
