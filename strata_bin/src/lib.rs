//! The Strata server frontend: REPL command sets over stdin or TCP.

use std::io::BufReader;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use uuid::Uuid;

pub mod commands;
pub mod query;
pub mod repl;
pub mod shutdown;

pub use commands::Engine;
pub use repl::Repl;

/// Accept connections forever, one session thread per client. Each
/// connection gets a fresh client id; whatever transaction it leaves open
/// on disconnect is committed on its behalf.
pub fn run_server(
    repl: Arc<Repl>,
    engine: Arc<Engine>,
    port: u16,
    prompt: String,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    println!("strata server started listening on port {port}");
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                eprintln!("connection failed: {err}");
                continue;
            }
        };
        let repl = Arc::clone(&repl);
        let engine = Arc::clone(&engine);
        let prompt = prompt.clone();
        thread::spawn(move || {
            let client_id = Uuid::new_v4();
            strata::strata_debug_log!("[server] client {client_id} connected");
            let reader = match stream.try_clone() {
                Ok(read_half) => BufReader::new(read_half),
                Err(err) => {
                    eprintln!("session setup failed: {err}");
                    return;
                }
            };
            repl.run(reader, &stream, client_id, &prompt);
            engine.finish_session(client_id);
            strata::strata_debug_log!("[server] client {client_id} disconnected");
        });
    }
    Ok(())
}
