#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use abx_replay::{ClientConfig, Packet};

pub enum Reply {
    Bytes(Vec<u8>),
    /// Send nothing, hold the connection open this long, then close.
    Hang(Duration),
}

/// Scripted replay server. Each connection is served on its own thread so a hung
/// exchange does not hold up the next one.
pub struct MockServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<[u8; 2]>>>,
}

impl MockServer {
    pub fn start(stream: Reply, resume: HashMap<u8, Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        let stream = Arc::new(stream);
        let resume = Arc::new(resume);
        thread::spawn(move || {
            for conn in listener.incoming() {
                let Ok(conn) = conn else { break };
                let (stream, resume, seen) = (stream.clone(), resume.clone(), seen.clone());
                thread::spawn(move || serve(conn, &stream, &resume, &seen));
            }
        });

        Self { addr, requests }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.addr.ip().to_string(), self.addr.port())
            .with_timeouts(Duration::from_secs(2), Duration::from_millis(300))
    }

    pub fn requests(&self) -> Vec<[u8; 2]> {
        self.requests.lock().expect("lock").clone()
    }
}

fn serve(
    mut conn: TcpStream,
    stream: &Reply,
    resume: &HashMap<u8, Reply>,
    seen: &Mutex<Vec<[u8; 2]>>,
) {
    let mut request = [0u8; 2];
    if conn.read_exact(&mut request).is_err() {
        return;
    }
    seen.lock().expect("lock").push(request);
    let reply = match request {
        [1, _] => Some(stream),
        [2, seq] => resume.get(&seq),
        _ => None,
    };
    if let Some(reply) = reply {
        send(&mut conn, reply);
    }
}

fn send(conn: &mut TcpStream, reply: &Reply) {
    match reply {
        // Small writes so the client has to reassemble frames.
        Reply::Bytes(bytes) => {
            for chunk in bytes.chunks(7) {
                if conn.write_all(chunk).is_err() {
                    return;
                }
            }
            let _ = conn.flush();
        }
        Reply::Hang(duration) => thread::sleep(*duration),
    }
}

pub fn packet(seq: i32) -> Packet {
    Packet::new(*b"ABXC", if seq % 2 == 0 { b'B' } else { b'S' }, seq * 3, 1000 + seq, seq)
        .expect("packet")
}

pub fn frames(seqs: &[i32]) -> Vec<u8> {
    seqs.iter().flat_map(|&s| packet(s).to_bytes()).collect()
}

pub fn resume_replies(seqs: &[i32]) -> HashMap<u8, Reply> {
    seqs.iter()
        .map(|&s| {
            let seq = u8::try_from(s).expect("small seq");
            (seq, Reply::Bytes(packet(s).to_bytes().to_vec()))
        })
        .collect()
}

/// An address nothing listens on.
pub fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr")
}
