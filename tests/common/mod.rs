// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::{Path, PathBuf};

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use axum::{Json, Router, routing::post};
use serde_json::{Value, json};
use tempfile::TempDir;

pub fn cli() -> Command {
    cargo_bin_cmd!("filstore")
}

/// A data directory with a config file pointing at `rpc_url`.
pub struct TestEnv {
    pub dir: TempDir,
    pub config: PathBuf,
}

impl TestEnv {
    pub fn new(rpc_url: &str) -> Self {
        let dir = tempfile::tempdir().expect("couldn't create temp dir");
        let config = format!(
            r#"
[client]
data_dir = "{}"
address = "t1clientaddress"

[chain]
rpc_url = "{rpc_url}"
timeout = 2

[deal]
rpc_timeout = 2

[tracker.thresholds]
waiting_for_data = 0
sealing = 3600
active = 86400
"#,
            dir.path().display()
        );
        let config_file = dir.path().join("config.toml");
        std::fs::write(&config_file, config).expect("couldn't write config");
        Self {
            dir,
            config: config_file,
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cli();
        cmd.arg("--config").arg(&self.config).env("RUST_LOG", "off");
        cmd
    }

    pub fn write_source(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("couldn't write source");
        path
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Parses a command's stdout as JSON.
pub fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

/// Starts a Lotus stand-in answering `Filecoin.ChainHead` with `height` and
/// returns its RPC URL. The server lives until the test process exits.
pub fn spawn_lotus(height: i64) -> String {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("couldn't build runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("couldn't bind");
            let addr = listener.local_addr().expect("no local address");
            let app = Router::new().route(
                "/rpc/v1",
                post(move |Json(request): Json<Value>| async move {
                    let response = match request["method"].as_str() {
                        Some("Filecoin.ChainHead") => {
                            json!({ "jsonrpc": "2.0", "id": request["id"], "result": { "Height": height } })
                        }
                        _ => json!({
                            "jsonrpc": "2.0",
                            "id": request["id"],
                            "error": { "code": -32601, "message": "method not found" }
                        }),
                    };
                    Json(response)
                }),
            );
            tx.send(format!("http://{addr}/rpc/v1")).expect("test went away");
            axum::serve(listener, app).await.expect("mock lotus failed");
        });
    });
    rx.recv().expect("mock lotus did not start")
}

/// An RPC URL nothing listens on.
pub fn dead_lotus() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("couldn't bind");
    let addr = listener.local_addr().expect("no local address");
    drop(listener);
    format!("http://{addr}/rpc/v1")
}
