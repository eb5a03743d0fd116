//! Local HTTP server and archive fixtures shared by the integration tests.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct State {
    routes: HashMap<String, Vec<u8>>,
    /// Body prefix sent before the connection goes quiet, and the length announced
    stalls: HashMap<String, (Vec<u8>, usize)>,
    hits: HashMap<String, usize>,
}

/// Serves fixed bodies by path and counts requests per path
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("No local address");
        let state = Arc::new(Mutex::new(State::default()));

        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        Self { addr, state, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn route(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(path.to_string(), body.into());
    }

    /// Announce `announced` bytes, send `prefix`, then stop sending
    pub fn stall(&self, path: &str, prefix: impl Into<Vec<u8>>, announced: usize) {
        self.state
            .lock()
            .unwrap()
            .stalls
            .insert(path.to_string(), (prefix.into(), announced));
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state.lock().unwrap().hits.get(path).copied().unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<State>>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&request);
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();

    let (body, stall) = {
        let mut state = state.lock().unwrap();
        *state.hits.entry(path.clone()).or_default() += 1;
        (state.routes.get(&path).cloned(), state.stalls.get(&path).cloned())
    };

    if let Some((prefix, announced)) = stall {
        let header = format!("HTTP/1.1 200 OK\r\nContent-Length: {announced}\r\n\r\n");
        stream.write_all(header.as_bytes()).await?;
        stream.write_all(&prefix).await?;
        stream.flush().await?;
        tokio::time::sleep(Duration::from_secs(120)).await;
        return Ok(());
    }

    let (status, body) = match body {
        Some(body) => ("200 OK", body),
        None => ("404 Not Found", b"not found".to_vec()),
    };

    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.shutdown().await
}

/// Gzipped tarball of `(path, contents)` pairs
pub fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
    let files: Vec<(&str, &[u8])> = files.iter().map(|(p, d)| (*p, d.as_bytes())).collect();
    tar_gz_bytes(&files)
}

/// Gzipped tarball of `(path, bytes)` pairs
pub fn tar_gz_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *data)
            .expect("Failed to append tar entry");
    }
    let tarball = builder.into_inner().expect("Failed to finish tarball");

    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(&tarball).expect("Failed to compress");
    encoder.finish().expect("Failed to finish gzip")
}

/// Training config as shipped in translateLocally archives
pub const TRAINING_CONFIG: &str = "\
relative-paths: true
models:
  - model.intgemm.alphas.bin
vocabs:
  - vocab.deen.spm
  - vocab.deen.spm
shortlist:
  - lex.s2t.bin
  - false
beam-size: 1
normalize: 1.0
mini-batch: 32
maxi-batch: 100
workspace: 2000
max-length-break: 1024
mini-batch-words: 4096
gemm-precision: int8shiftAlphaAll
skip-cost: true
";

/// Archive unpacking into `en-de-tiny11/`
pub fn model_archive() -> Vec<u8> {
    tar_gz(&[
        ("en-de-tiny11/model.intgemm.alphas.bin", "weights"),
        ("en-de-tiny11/vocab.deen.spm", "vocab"),
        ("en-de-tiny11/lex.s2t.bin", "lex"),
        ("en-de-tiny11/config.intgemm8bitalpha.yml", TRAINING_CONFIG),
    ])
}

/// `models.json` listing one downloadable model, served from `server`
pub fn listing(server: &TestServer) -> String {
    format!(
        r#"{{
  "models": [
    {{
      "name": "English-German tiny",
      "code": "ende-tiny",
      "shortName": "en-de-tiny",
      "type": "tiny",
      "src": "English",
      "trg": "German",
      "version": 2,
      "API": 1,
      "url": "{}",
      "checksum": "93821e13b3c511b5"
    }},
    {{
      "name": "German-English tiny",
      "code": "deen-tiny",
      "shortName": "de-en-tiny",
      "src": "German",
      "trg": "English",
      "url": "{}"
    }}
  ]
}}"#,
        server.url("/models/en-de-tiny11.tar.gz"),
        server.url("/models/de-en-tiny11.tar.gz"),
    )
}
