//! Integration test: local HTTP server as the remote side, full verification runs.

mod common;

use common::file_server::{self, Route};
use hashmatch_core::checksum::{self, StreamDigest};
use hashmatch_core::fetch::{FetchError, FetchOptions, RemoteFetcher};
use hashmatch_core::verify::{VerificationRequest, Verifier};
use std::io::Cursor;
use std::thread;
use std::time::Duration;

const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

fn local(bytes: &[u8]) -> Cursor<Vec<u8>> {
    Cursor::new(bytes.to_vec())
}

#[test]
fn identical_bytes_match() {
    let base = file_server::start(vec![("/hello", Route::ok("hello"))]);
    let v = Verifier::default().verify(VerificationRequest::new(
        local(b"hello"),
        format!("{}/hello", base),
    ));
    assert_eq!(v.status, 200);
    assert!(v.is_success());
    assert_eq!(v.result.local_digest, HELLO);
    assert_eq!(v.result.remote_digest, HELLO);
    assert!(v.result.matched);
    assert!(v.result.error.is_none());
}

#[test]
fn different_bytes_are_a_mismatch_not_an_error() {
    let base = file_server::start(vec![("/world", Route::ok("world"))]);
    let v = Verifier::default().verify(VerificationRequest::new(
        local(b"hello"),
        format!("{}/world", base),
    ));
    assert_eq!(v.status, 200);
    assert_eq!(v.result.local_digest, HELLO);
    assert_ne!(v.result.remote_digest, HELLO);
    assert_eq!(v.result.remote_digest.len(), checksum::HEX_LEN);
    assert!(!v.result.matched);
    assert!(v.result.error.is_none());
}

#[test]
fn remote_404_is_passed_through() {
    let base = file_server::start(vec![]);
    let v = Verifier::default().verify(VerificationRequest::new(
        local(b"hello"),
        format!("{}/missing", base),
    ));
    assert_eq!(v.status, 404);
    assert_eq!(v.result.local_digest, HELLO);
    assert_eq!(v.result.remote_digest, "");
    assert!(!v.result.matched);
    let err = v.result.error.unwrap();
    assert!(err.contains("404"), "{}", err);
    assert!(err.contains("Not Found"), "{}", err);
}

#[test]
fn remote_503_is_passed_through() {
    let base = file_server::start(vec![("/busy", Route::status(503, "Service Unavailable"))]);
    let v = Verifier::default().verify(VerificationRequest::new(
        local(b"hello"),
        format!("{}/busy", base),
    ));
    assert_eq!(v.status, 503);
    assert_eq!(v.result.local_digest, HELLO);
}

#[test]
fn connection_refused_is_bad_gateway() {
    // Bind then drop to get a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let url = format!("http://127.0.0.1:{}/file", port);
    let v = Verifier::default().verify(VerificationRequest::new(local(b"hello"), url.clone()));
    assert_eq!(v.status, 502);
    assert_eq!(v.result.local_digest, HELLO);
    assert_eq!(v.result.remote_digest, "");
    assert!(v.result.error.unwrap().contains(&url));
}

#[test]
fn truncated_body_is_a_remote_read_error() {
    let base = file_server::start(vec![(
        "/short",
        Route::Truncated {
            body: b"hel".to_vec(),
            claimed_len: 5,
        },
    )]);
    let v = Verifier::default().verify(VerificationRequest::new(
        local(b"hello"),
        format!("{}/short", base),
    ));
    assert_eq!(v.status, 500);
    assert_eq!(v.result.local_digest, HELLO);
    assert_eq!(v.result.remote_digest, "");
    assert!(!v.result.matched);
}

#[test]
fn redirects_are_followed() {
    let base = file_server::start(vec![
        (
            "/old",
            Route::Redirect {
                location: "/new".to_string(),
            },
        ),
        ("/new", Route::ok("hello")),
    ]);
    let v = Verifier::default().verify(VerificationRequest::new(
        local(b"hello"),
        format!("{}/old", base),
    ));
    assert_eq!(v.status, 200);
    assert!(v.result.matched);
}

#[test]
fn non_utf8_reason_phrase_on_200_still_succeeds() {
    let base = file_server::start(vec![
        (
            "/latin1",
            Route::Raw(
                b"HTTP/1.1 200 O\xE9K\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello"
                    .to_vec(),
            ),
        ),
        (
            "/hop",
            Route::Redirect {
                location: "/latin1".to_string(),
            },
        ),
    ]);
    for path in ["/latin1", "/hop"] {
        let v = Verifier::default().verify(VerificationRequest::new(
            local(b"hello"),
            format!("{}{}", base, path),
        ));
        assert_eq!(v.status, 200, "{}: {:?}", path, v.result);
        assert_eq!(v.result.remote_digest, HELLO);
        assert!(v.result.matched);
        assert!(v.result.error.is_none());
    }
}

#[test]
fn slow_remote_hits_timeout() {
    let base = file_server::start(vec![(
        "/slow",
        Route::Stall {
            delay: Duration::from_secs(3),
            body: b"hello".to_vec(),
        },
    )]);
    let fetcher = RemoteFetcher::new(FetchOptions {
        timeout: Duration::from_secs(1),
        connect_timeout: Duration::from_secs(1),
    });
    let mut sink = StreamDigest::new();
    let err = fetcher
        .fetch_to(&format!("{}/slow", base), &mut sink)
        .unwrap_err();
    assert!(matches!(err, FetchError::Network { .. }), "{:?}", err);
    assert_eq!(err.status(), 502);
    assert_eq!(sink.bytes(), 0);
}

#[test]
fn fetch_to_streams_large_body() {
    let body: Vec<u8> = (0u8..100).cycle().take(512 * 1024).collect();
    let expected = checksum::sha256_reader(Cursor::new(&body)).unwrap();
    let base = file_server::start(vec![("/big", Route::ok(body.clone()))]);
    let mut sink = StreamDigest::new();
    let n = RemoteFetcher::default()
        .fetch_to(&format!("{}/big", base), &mut sink)
        .unwrap();
    assert_eq!(n, body.len() as u64);
    assert_eq!(sink.finish_hex(), expected);
}

#[test]
fn concurrent_verifications_do_not_interfere() {
    let bodies: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 1000 + i as usize]).collect();
    let routes: Vec<(String, Route)> = bodies
        .iter()
        .enumerate()
        .map(|(i, b)| (format!("/f{}", i), Route::ok(b.clone())))
        .collect();
    let base = file_server::start(routes.iter().map(|(p, r)| (p.as_str(), r.clone())).collect());
    let verifier = Verifier::default();

    let handles: Vec<_> = bodies
        .into_iter()
        .enumerate()
        .map(|(i, body)| {
            let url = format!("{}/f{}", base, i);
            // Odd callers upload something else and must see a mismatch.
            let upload = if i % 2 == 0 { body.clone() } else { b"other".to_vec() };
            let expected_local = checksum::sha256_reader(Cursor::new(&upload)).unwrap();
            let expected_remote = checksum::sha256_reader(Cursor::new(&body)).unwrap();
            thread::spawn(move || {
                let v = verifier.verify(VerificationRequest::new(Cursor::new(upload), url));
                (i, v, expected_local, expected_remote)
            })
        })
        .collect();

    for h in handles {
        let (i, v, expected_local, expected_remote) = h.join().unwrap();
        assert_eq!(v.status, 200);
        assert_eq!(v.result.local_digest, expected_local);
        assert_eq!(v.result.remote_digest, expected_remote);
        assert_eq!(v.result.matched, i % 2 == 0);
    }
}
