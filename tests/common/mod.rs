#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hotspot_portal::routeros::proto::{self, Record};
use hotspot_portal::routeros::ConnectParams;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// Scripted stand-in for the access controller: speaks the word/sentence
/// wire protocol and keeps its user and profile directories in memory.
#[derive(Default)]
pub struct FakeState {
    pub users: Vec<Record>,
    pub profiles: Vec<Record>,
    /// Every command received, with its argument words, in arrival order.
    pub log: Vec<(String, Vec<String>)>,
    pub fail_user_add: bool,
    /// Close the connection without replying to the next non-login command.
    pub drop_next_command: bool,
    pub next_id: u64,
}

pub struct FakeController {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<FakeState>>,
    pub connections: Arc<AtomicUsize>,
}

impl FakeController {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake controller");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(Mutex::new(FakeState {
            next_id: 1,
            ..FakeState::default()
        }));
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_state = state.clone();
        let accept_connections = connections.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                accept_connections.fetch_add(1, Ordering::SeqCst);
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            connections,
        }
    }

    pub fn params(&self) -> ConnectParams {
        ConnectParams {
            host: "127.0.0.1".to_string(),
            port: self.addr.port(),
            username: "admin".to_string(),
            password: String::new(),
            use_tls: false,
            tls_insecure: false,
            timeout: Duration::from_secs(2),
        }
    }

    pub async fn command_log(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .log
            .iter()
            .map(|(command, _)| command.clone())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

pub fn record(entries: &[(&str, &str)]) -> Record {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<FakeState>>) -> std::io::Result<()> {
    loop {
        let words = read_sentence(&mut stream).await?;
        let Some((command, args)) = words.split_first() else {
            continue;
        };

        {
            let mut locked = state.lock().await;
            if locked.drop_next_command && command != "/login" {
                locked.drop_next_command = false;
                return Ok(());
            }
            locked.log.push((command.clone(), args.to_vec()));
        }

        let replies = handle(command, args, &state).await;
        for sentence in replies {
            write_sentence(&mut stream, &sentence).await?;
        }
    }
}

async fn handle(
    command: &str,
    args: &[String],
    state: &Arc<Mutex<FakeState>>,
) -> Vec<Vec<String>> {
    let mut locked = state.lock().await;
    match command {
        "/login" => vec![done()],
        "/ip/hotspot/user/print" => print_matching(&locked.users, args),
        "/ip/hotspot/user/profile/print" => print_matching(&locked.profiles, args),
        "/ip/hotspot/user/add" => {
            if locked.fail_user_add {
                return vec![trap("failure: already have user with this name"), done()];
            }
            let next_id = locked.next_id;
            let id = insert(&mut locked.users, args, next_id);
            locked.next_id += 1;
            vec![done_ret(&id)]
        }
        "/ip/hotspot/user/profile/add" => {
            let next_id = locked.next_id;
            let id = insert(&mut locked.profiles, args, next_id);
            locked.next_id += 1;
            vec![done_ret(&id)]
        }
        "/ip/hotspot/user/remove" => {
            let target = attributes(args).remove(".id");
            match target {
                Some(id) => {
                    let before = locked.users.len();
                    locked.users.retain(|user| user.get(".id") != Some(&id));
                    if locked.users.len() == before {
                        vec![trap("no such item"), done()]
                    } else {
                        vec![done()]
                    }
                }
                None => vec![trap("no such item"), done()],
            }
        }
        _ => vec![trap("no such command"), done()],
    }
}

fn print_matching(directory: &[Record], args: &[String]) -> Vec<Vec<String>> {
    let filter = args.iter().find_map(|word| {
        word.strip_prefix('?')
            .and_then(|body| body.split_once('='))
            .map(|(key, value)| (key.to_string(), value.to_string()))
    });
    let mut replies = Vec::new();
    for entry in directory {
        let matches = match &filter {
            Some((key, value)) => entry.get(key) == Some(value),
            None => true,
        };
        if matches {
            let mut sentence = vec!["!re".to_string()];
            for (key, value) in entry {
                sentence.push(format!("={key}={value}"));
            }
            replies.push(sentence);
        }
    }
    replies.push(done());
    replies
}

fn insert(directory: &mut Vec<Record>, args: &[String], next_id: u64) -> String {
    let mut entry = attributes(args);
    let id = format!("*{next_id}");
    entry.insert(".id".to_string(), id.clone());
    directory.push(entry);
    id
}

fn attributes(args: &[String]) -> Record {
    let mut record = Record::new();
    for word in args {
        if let Some(body) = word.strip_prefix('=') {
            if let Some((key, value)) = body.split_once('=') {
                record.insert(key.to_string(), value.to_string());
            }
        }
    }
    record
}

fn done() -> Vec<String> {
    vec!["!done".to_string()]
}

fn done_ret(id: &str) -> Vec<String> {
    vec!["!done".to_string(), format!("=ret={id}")]
}

fn trap(message: &str) -> Vec<String> {
    vec!["!trap".to_string(), format!("=message={message}")]
}

async fn write_sentence(stream: &mut TcpStream, words: &[String]) -> std::io::Result<()> {
    let mut buf = Vec::new();
    for word in words {
        proto::encode_word(word, &mut buf);
    }
    buf.push(0);
    stream.write_all(&buf).await
}

async fn read_sentence(stream: &mut TcpStream) -> std::io::Result<Vec<String>> {
    loop {
        let mut words = Vec::new();
        loop {
            let len = read_word_length(stream).await?;
            if len == 0 {
                break;
            }
            let mut buf = vec![0u8; len as usize];
            stream.read_exact(&mut buf).await?;
            words.push(String::from_utf8_lossy(&buf).into_owned());
        }
        if !words.is_empty() {
            return Ok(words);
        }
    }
}

async fn read_word_length(stream: &mut TcpStream) -> std::io::Result<u32> {
    let mut first = [0u8; 1];
    stream.read_exact(&mut first).await?;
    let (mut acc, extra) = proto::continuation_bytes(first[0])
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    if extra > 0 {
        let mut rest = vec![0u8; extra];
        stream.read_exact(&mut rest).await?;
        for byte in rest {
            acc = (acc << 8) | u32::from(byte);
        }
    }
    Ok(acc)
}
