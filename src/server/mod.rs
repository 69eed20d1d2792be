//! TCP front end: one OS thread per accepted connection, each running the
//! hex-line wire protocol against its own `Session` (spec.md §4.7/§6,
//! grounded on `original_source/backend/server/Server.go`'s `Start`/
//! `handleConnection`).

mod transport;

use crate::execution::{execute, Engine, Session};
use crate::server::transport::Transporter;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

pub fn serve(engine: Arc<Engine>, port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    info!(port, "server listening");
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let engine = engine.clone();
                thread::spawn(move || handle_connection(engine, stream));
            }
            Err(e) => warn!(error = %e, "failed to accept connection"),
        }
    }
    Ok(())
}

fn handle_connection(engine: Arc<Engine>, stream: TcpStream) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".to_string());
    info!(peer, "connection established");

    let mut transporter = match Transporter::new(stream) {
        Ok(t) => t,
        Err(e) => {
            error!(peer, error = %e, "failed to wrap connection");
            return;
        }
    };
    let mut session = Session::new();

    loop {
        let sql = match transporter.receive() {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(sql) => sql,
                Err(_) => {
                    if transporter.send_error("statement is not valid UTF-8").is_err() {
                        break;
                    }
                    continue;
                }
            },
            Ok(None) => break,
            Err(e) => {
                warn!(peer, error = %e, "malformed wire message");
                break;
            }
        };

        let outcome = execute(&engine, &mut session, &sql);
        let sent = match outcome {
            Ok(text) => transporter.send_data(&text),
            Err(e) => transporter.send_error(&e.to_string()),
        };
        if sent.is_err() {
            break;
        }
    }

    // A connection that drops mid-transaction leaves its xid abandoned;
    // abort it so its locks and its slot in the active-transaction set
    // are released for everyone else.
    if let Some(xid) = session.xid() {
        let _ = engine.vm().abort(xid);
    }
    info!(peer, "connection closed");
}
