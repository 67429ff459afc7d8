#![allow(dead_code)]

use assert_cmd::prelude::*;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use reqwest::blocking::Client;

/// A running `batcher` binary, killed on drop.
pub struct Batcher {
    pub child: Child,
    pub addr: String,
}

impl Drop for Batcher {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Batcher {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Starts the binary in `dir` bound to an ephemeral port and waits for its
/// `listening on …` line.
pub fn spawn_batcher(dir: &Path, envs: &[(&str, &str)]) -> Batcher {
    let mut cmd = Command::cargo_bin("batcher").unwrap();
    cmd.current_dir(dir)
        .env_remove("RUST_LOG") // keep output predictable
        .env_remove("BATCH_SIZE")
        .env_remove("BATCH_INTERVAL")
        .env_remove("POST_ENDPOINT")
        .env("BATCHER__HTTP__BIND", "127.0.0.1:0")
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    for (k, v) in envs {
        cmd.env(k, v);
    }

    let mut child = cmd.spawn().expect("failed to spawn batcher");
    let stdout = child.stdout.take().expect("no stdout captured");
    let mut reader = BufReader::new(stdout);

    let mut line = String::new();
    let start = Instant::now();
    let addr = loop {
        line.clear();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            if start.elapsed() > Duration::from_secs(5) {
                let _ = child.kill();
                panic!("timed out waiting for 'listening on …'");
            }
            std::thread::sleep(Duration::from_millis(20));
            continue;
        }
        if let Some(rest) = line.trim().strip_prefix("listening on ") {
            break rest.to_string();
        }
        if start.elapsed() > Duration::from_secs(5) {
            let _ = child.kill();
            panic!("did not see 'listening on …'; last line: {line}");
        }
    };

    Batcher { child, addr }
}

pub fn wait_for_status(url: &str, want: u16, timeout: Duration) -> bool {
    let client = Client::new();
    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Ok(resp) = client.get(url).send() {
            if resp.status().as_u16() == want {
                return true;
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    false
}
