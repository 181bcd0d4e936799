#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::Path;
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};

fn server_binary_path() -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    format!("{manifest_dir}/../target/debug/strata_bin")
}

pub fn pick_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

pub fn start_server(project: &str, db_dir: &Path, port: u16) -> Child {
    Command::new(server_binary_path())
        .args([
            "-project",
            project,
            "-db",
            db_dir.to_str().expect("utf-8 path"),
            "-p",
            &port.to_string(),
            "-c",
            "false",
        ])
        .spawn()
        .expect("failed to start server")
}

/// SIGKILL: the process gets no chance to flush anything.
pub fn kill_server(server: &mut Child) {
    let _ = server.kill();
    let _ = server.wait();
}

/// A client speaking the line protocol: one command line out, one response
/// line back (the prompt is disabled with `-c false`).
pub struct LineClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl LineClient {
    pub fn connect_with_retry(port: u16, timeout: Duration) -> LineClient {
        let deadline = Instant::now() + timeout;
        loop {
            match TcpStream::connect(("127.0.0.1", port)) {
                Ok(stream) => {
                    let reader = BufReader::new(stream.try_clone().expect("clone stream"));
                    return LineClient {
                        reader,
                        writer: stream,
                    };
                }
                Err(err) => {
                    if Instant::now() >= deadline {
                        panic!("failed to connect in time: {err}");
                    }
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }

    pub fn send(&mut self, command: &str) -> String {
        writeln!(self.writer, "{command}").expect("send command");
        self.writer.flush().expect("flush command");
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response");
        line.trim_end().to_string()
    }
}
