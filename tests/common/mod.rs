#![allow(dead_code)]

use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Stand-in for the model relay: answers every POST with the same
/// `generateContent` envelope wrapping `reply`.
pub struct Relay {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl Relay {
    pub fn replying(reply: Value) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind relay");
        let url = format!("http://{}/relay", listener.local_addr().expect("addr"));
        let hits = Arc::new(AtomicUsize::new(0));
        let envelope = json!({
            "candidates": [{
                "content": {"parts": [{"text": reply.to_string()}]},
                "finishReason": "STOP"
            }]
        })
        .to_string();

        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                counter.fetch_add(1, Ordering::SeqCst);
                answer(stream, &envelope);
            }
        });
        Self { url, hits }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn answer(stream: TcpStream, body: &str) {
    let mut reader = BufReader::new(stream);
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }
    let mut request_body = vec![0u8; content_length];
    let _ = reader.read_exact(&mut request_body);

    let mut stream = reader.into_inner();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

/// The binary with a clean environment rooted at `home`.
pub fn daylens(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("daylens");
    cmd.env_clear()
        .current_dir(home)
        .env("HOME", home)
        .env("DAYLENS_HOME", home.join("journal"))
        .env("DAYLENS_LOG", "off");
    cmd
}

pub fn json_output(cmd: &mut assert_cmd::Command) -> Value {
    let output = cmd.arg("--json").assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("command report json")
}
