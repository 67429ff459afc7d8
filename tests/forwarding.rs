mod common;

use common::{spawn_batcher, wait_for_status, wait_until};
use mockito::{Matcher, Server};
use reqwest::blocking::Client;
use std::time::Duration;
use tempfile::tempdir;
use time::macros::datetime;
use wait_timeout::ChildExt;
use webhook_batcher::domain::{Event, Login, Meta, PhoneNumbers};

fn event(user_id: i64) -> Event {
    Event {
        user_id,
        total: 10.5 * user_id as f64,
        title: format!("order {user_id}"),
        meta: Meta {
            logins: vec![Login {
                time: datetime!(2024-05-01 12:00:00 UTC),
                ip: "127.0.0.1".into(),
            }],
            phone_numbers: PhoneNumbers {
                home: "555-1000".into(),
                mobile: "555-2000".into(),
            },
        },
        completed: user_id % 2 == 0,
    }
}

fn post_event(client: &Client, url: &str, ev: &Event) -> u16 {
    client
        .post(url)
        .header("content-type", "application/json")
        .body(serde_json::to_string(ev).unwrap())
        .send()
        .expect("post /log")
        .status()
        .as_u16()
}

#[test]
fn size_threshold_forwards_batch_in_order() {
    let mut sink = Server::new();
    let expected = serde_json::to_value(vec![event(1), event(2), event(3)]).unwrap();
    let mock = sink
        .mock("POST", "/log_data")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(expected))
        .with_status(200)
        .expect(1)
        .create();

    let dir = tempdir().unwrap();
    let endpoint = format!("{}/log_data", sink.url());
    let batcher = spawn_batcher(
        dir.path(),
        &[
            ("BATCH_SIZE", "3"),
            ("BATCH_INTERVAL", "3600"),
            ("POST_ENDPOINT", endpoint.as_str()),
        ],
    );

    let client = Client::new();
    for id in 1..=3 {
        assert_eq!(post_event(&client, &batcher.url("/log"), &event(id)), 200);
    }

    assert!(
        wait_until(Duration::from_secs(5), || mock.matched()),
        "sink never received the batch"
    );
    mock.assert();
}

#[test]
fn interval_forwards_partial_batch() {
    let mut sink = Server::new();
    let expected = serde_json::to_value(vec![event(7)]).unwrap();
    let mock = sink
        .mock("POST", "/")
        .match_body(Matcher::Json(expected))
        .with_status(200)
        .create();

    let dir = tempdir().unwrap();
    let batcher = spawn_batcher(
        dir.path(),
        &[
            ("BATCHER__BATCH__SIZE", "10"),
            ("BATCHER__BATCH__INTERVAL_SECS", "1"),
            ("BATCHER__FORWARD__ENDPOINT", sink.url().as_str()),
        ],
    );

    assert_eq!(post_event(&Client::new(), &batcher.url("/log"), &event(7)), 200);
    assert!(
        wait_until(Duration::from_secs(5), || mock.matched()),
        "interval flush never happened"
    );
}

#[test]
fn malformed_event_is_rejected_and_service_keeps_running() {
    let dir = tempdir().unwrap();
    let batcher = spawn_batcher(dir.path(), &[("POST_ENDPOINT", "http://127.0.0.1:9/")]);
    let client = Client::new();

    let status = client
        .post(batcher.url("/log"))
        .body("{\"user_id\": ")
        .send()
        .unwrap()
        .status();
    assert_eq!(status.as_u16(), 400);

    let ack = client.post(batcher.url("/send-data")).body("[]").send().unwrap();
    assert_eq!(ack.status().as_u16(), 200);
    assert_eq!(ack.text().unwrap(), "Data Received");
    assert!(wait_for_status(&batcher.url("/healthz"), 200, Duration::from_secs(2)));
}

#[test]
fn unreachable_sink_drops_batch_without_exiting() {
    let dir = tempdir().unwrap();
    let mut batcher = spawn_batcher(
        dir.path(),
        &[("BATCH_SIZE", "1"), ("POST_ENDPOINT", "http://127.0.0.1:9/")],
    );

    assert_eq!(post_event(&Client::new(), &batcher.url("/log"), &event(1)), 200);

    let exited = batcher
        .child
        .wait_timeout(Duration::from_secs(2))
        .expect("wait_timeout failed");
    assert!(exited.is_none(), "process exited after a transport failure: {exited:?}");
    assert!(wait_for_status(&batcher.url("/healthz"), 200, Duration::from_secs(2)));
}

#[test]
fn recovers_when_sink_accepts_on_retry() {
    let mut sink = Server::new();
    let failing = sink.mock("POST", "/").with_status(503).expect(1).create();
    let dir = tempdir().unwrap();
    let mut batcher = spawn_batcher(
        dir.path(),
        &[
            ("BATCH_SIZE", "1"),
            ("POST_ENDPOINT", sink.url().as_str()),
            ("BATCHER__RETRY__DELAY_MS", "500"),
        ],
    );

    assert_eq!(post_event(&Client::new(), &batcher.url("/log"), &event(1)), 200);
    assert!(wait_until(Duration::from_secs(5), || failing.matched()));

    // With its one hit used up, the next request goes to a mock still expecting hits.
    let accepting = sink.mock("POST", "/").with_status(200).expect(1).create();
    assert!(
        wait_until(Duration::from_secs(5), || accepting.matched()),
        "retry never reached the sink"
    );

    let exited = batcher
        .child
        .wait_timeout(Duration::from_secs(1))
        .expect("wait_timeout failed");
    assert!(exited.is_none(), "process exited after a successful retry");
    failing.assert();
    accepting.assert();
}

#[test]
fn exits_after_retries_are_exhausted() {
    let mut sink = Server::new();
    let mock = sink
        .mock("POST", "/")
        .with_status(500)
        .expect(4)
        .create();

    let dir = tempdir().unwrap();
    let mut batcher = spawn_batcher(
        dir.path(),
        &[
            ("BATCH_SIZE", "1"),
            ("POST_ENDPOINT", sink.url().as_str()),
            ("BATCHER__RETRY__DELAY_MS", "50"),
        ],
    );

    assert_eq!(post_event(&Client::new(), &batcher.url("/log"), &event(1)), 200);

    let status = batcher
        .child
        .wait_timeout(Duration::from_secs(10))
        .expect("wait_timeout failed")
        .expect("process kept running after exhausting retries");
    assert_eq!(status.code(), Some(1));
    mock.assert();
}
