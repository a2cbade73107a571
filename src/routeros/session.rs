use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::TlsStream;

use crate::config;

use super::proto::{self, ProtoError, Record, Reply, MAX_WORD_BYTES};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("controller connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("controller i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("controller tls error: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("controller protocol error: {0}")]
    Proto(#[from] ProtoError),
    #[error("controller login rejected: {0}")]
    LoginRejected(String),
    #[error("controller rejected command: {0}")]
    Trap(String),
    #[error("controller closed the connection: {0}")]
    Fatal(String),
}

impl ControllerError {
    /// Whether the underlying transport is still usable after this error.
    /// A trap is a command-level rejection; everything else poisons the
    /// session.
    pub fn is_transport_dead(&self) -> bool {
        !matches!(self, ControllerError::Trap(_))
    }
}

/// Fixed connection parameters, loaded once at process start.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    pub tls_insecure: bool,
    pub timeout: Duration,
}

impl ConnectParams {
    pub fn from_env() -> Self {
        Self {
            host: config::ROUTEROS_HOST.clone(),
            port: *config::ROUTEROS_PORT,
            username: config::ROUTEROS_USERNAME.clone(),
            password: config::ROUTEROS_PASSWORD.clone(),
            use_tls: *config::ROUTEROS_USE_TLS,
            tls_insecure: *config::ROUTEROS_TLS_INSECURE,
            timeout: Duration::from_secs(*config::ROUTEROS_CONNECT_TIMEOUT_SECS),
        }
    }
}

enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.write_all(buf).await,
            Transport::Tls(stream) => stream.write_all(buf).await,
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.read_exact(buf).await.map(|_| ()),
            Transport::Tls(stream) => stream.read_exact(buf).await.map(|_| ()),
        }
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.shutdown().await,
            Transport::Tls(stream) => stream.shutdown().await,
        }
    }
}

/// One live, authenticated controller connection.
pub struct Session {
    transport: Transport,
}

impl Session {
    /// Connect and log in within the configured timeout. A timed-out or
    /// failed attempt holds no handle.
    pub async fn connect(params: &ConnectParams) -> Result<Self, ControllerError> {
        let address = (params.host.as_str(), params.port);
        let stream = timeout(params.timeout, TcpStream::connect(address))
            .await
            .map_err(|_| ControllerError::ConnectTimeout(params.timeout))??;

        let transport = if params.use_tls {
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(params.tls_insecure)
                .build()?;
            let connector = tokio_native_tls::TlsConnector::from(connector);
            let tls = timeout(params.timeout, connector.connect(&params.host, stream))
                .await
                .map_err(|_| ControllerError::ConnectTimeout(params.timeout))??;
            Transport::Tls(Box::new(tls))
        } else {
            Transport::Plain(stream)
        };

        let mut session = Session { transport };
        session.login(&params.username, &params.password).await?;
        Ok(session)
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<(), ControllerError> {
        let args = vec![
            format!("=name={username}"),
            format!("=password={password}"),
        ];
        let records = match self.run("/login", &args).await {
            Ok(records) => records,
            Err(ControllerError::Trap(message)) => {
                return Err(ControllerError::LoginRejected(message))
            }
            Err(err) => return Err(err),
        };
        // Pre-6.43 firmware answers with a challenge token instead of
        // accepting the credentials directly.
        if records.iter().any(|record| record.contains_key("ret")) {
            return Err(ControllerError::LoginRejected(
                "controller requested legacy challenge login".to_string(),
            ));
        }
        Ok(())
    }

    /// Issue one command and collect its replies into a uniform record list.
    /// A bare `!done` carrying `=ret=` is folded into a single `ret` record
    /// so every response shape comes back the same way.
    pub async fn run(
        &mut self,
        command: &str,
        args: &[String],
    ) -> Result<Vec<Record>, ControllerError> {
        self.write_sentence(command, args).await?;

        let mut records = Vec::new();
        let mut trap: Option<String> = None;
        loop {
            let words = self.read_sentence().await?;
            match proto::parse_reply(&words)? {
                Reply::Re(record) => records.push(record),
                Reply::Done { ret } => {
                    if let Some(message) = trap {
                        return Err(ControllerError::Trap(message));
                    }
                    if records.is_empty() {
                        if let Some(value) = ret {
                            let mut record = Record::new();
                            record.insert("ret".to_string(), value);
                            records.push(record);
                        }
                    }
                    return Ok(records);
                }
                Reply::Trap { message } => trap = Some(message),
                Reply::Fatal { message } => return Err(ControllerError::Fatal(message)),
            }
        }
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.transport.shutdown().await
    }

    async fn write_sentence(
        &mut self,
        command: &str,
        args: &[String],
    ) -> Result<(), ControllerError> {
        let buf = proto::encode_sentence(command, args);
        self.transport.write_all(&buf).await?;
        Ok(())
    }

    /// Read words until the empty terminator; empty keep-alive sentences are
    /// skipped.
    async fn read_sentence(&mut self) -> Result<Vec<String>, ControllerError> {
        loop {
            let mut words = Vec::new();
            loop {
                let len = self.read_word_length().await?;
                if len == 0 {
                    break;
                }
                if len > MAX_WORD_BYTES {
                    return Err(ControllerError::Proto(ProtoError::OversizedWord(len)));
                }
                let mut buf = vec![0u8; len as usize];
                self.transport.read_exact(&mut buf).await?;
                words.push(String::from_utf8_lossy(&buf).into_owned());
            }
            if !words.is_empty() {
                return Ok(words);
            }
        }
    }

    async fn read_word_length(&mut self) -> Result<u32, ControllerError> {
        let mut first = [0u8; 1];
        self.transport.read_exact(&mut first).await?;
        let (mut acc, extra) = proto::continuation_bytes(first[0])?;
        if extra > 0 {
            let mut rest = vec![0u8; extra];
            self.transport.read_exact(&mut rest).await?;
            for byte in rest {
                acc = (acc << 8) | u32::from(byte);
            }
        }
        Ok(acc)
    }
}
