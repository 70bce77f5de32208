//! A thin, synchronous HTTP control surface: hand-parsed request lines
//! over `std::net`, one thread per connection, matching the rest of this
//! crate's thread-based concurrency model rather than pulling in an async
//! HTTP framework for a handful of operator-facing routes.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::node::Node;

#[derive(Deserialize)]
struct CreateTransactionRequest {
    sender: String,
    recipient: String,
    amount: f64,
    fee: f64,
}

pub fn serve(node: Arc<Node>, host: &str, port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind((host, port))?;
    info!("api: listening on {}:{}", host, port);
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let node = Arc::clone(&node);
                thread::spawn(move || handle_connection(node, stream));
            }
            Err(e) => warn!("api: accept error: {}", e),
        }
    }
    Ok(())
}

fn handle_connection(node: Arc<Node>, mut stream: TcpStream) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone connection"));
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).is_err() || header == "\r\n" || header.is_empty() {
            break;
        }
        if let Some(value) = header.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        let _ = reader.read_exact(&mut body);
    }

    let (status, payload) = route(&node, &method, &path, &body);
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        payload.len(),
        payload
    );
    let _ = stream.write_all(response.as_bytes());
}

fn route(node: &Arc<Node>, method: &str, path: &str, body: &[u8]) -> (&'static str, String) {
    if !node.is_initialized() {
        return ("503 Service Unavailable", json!({"error": "node not finished initializing"}).to_string());
    }

    match (method, path) {
        ("GET", "/status") => (
            "200 OK",
            json!({"address": node.primary_address()}).to_string(),
        ),
        ("GET", p) if p.starts_with("/balance/") => {
            let address = &p["/balance/".len()..];
            ("200 OK", json!({"address": address, "balance": node.get_balance(address)}).to_string())
        }
        ("GET", "/all-balances") => ("200 OK", json!(node.get_all_balances()).to_string()),
        ("POST", "/create-wallet") => {
            let address = node.create_wallet();
            ("201 Created", json!({"address": address}).to_string())
        }
        ("GET", "/wallets") => ("200 OK", json!({"wallets": node.managed_wallet_addresses()}).to_string()),
        ("POST", "/create-transaction") => match serde_json::from_slice::<CreateTransactionRequest>(body) {
            Ok(req) => match node.create_and_submit_transaction(&req.sender, &req.recipient, req.amount, req.fee) {
                Ok(tx) => ("202 Accepted", json!({"transaction_id": tx.transaction_id}).to_string()),
                Err(e) => ("400 Bad Request", json!({"error": e}).to_string()),
            },
            Err(e) => ("400 Bad Request", json!({"error": e.to_string()}).to_string()),
        },
        _ => ("400 Bad Request", json!({"error": "unknown route"}).to_string()),
    }
}
