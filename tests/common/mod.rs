#![allow(dead_code)]

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use inboxprobe::{
    Connector, ExchangeHost, MxResolver, ProbeAddressGenerator, ProbeStrategy, VerifierConfig,
};

/// Local part every probe address gets from [`FixedProbeAddress`].
pub const PROBE_LOCAL_PART: &str = "zz-nobody-0000";

/// Which recipients a mock server accepts.
#[derive(Clone, Debug)]
pub enum Recipients {
    All,
    Only(Vec<String>),
    /// Answer every `RCPT TO` with this reply.
    Reply(String),
}

/// Scripted replies of a mock SMTP server.
#[derive(Clone, Debug)]
pub struct Script {
    /// Raw banner bytes, sent as-is followed by CRLF. `None` keeps the server silent.
    pub banner: Option<Vec<u8>>,
    pub ehlo: String,
    pub helo: String,
    pub mail_from: String,
    pub recipients: Recipients,
    /// Delay before each reply.
    pub delay: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            banner: Some(b"220 mock.test ESMTP ready".to_vec()),
            ehlo: "250-mock.test greets you\r\n250-SIZE 10240000\r\n250 8BITMIME".to_string(),
            helo: "250 mock.test".to_string(),
            mail_from: "250 2.1.0 OK".to_string(),
            recipients: Recipients::All,
            delay: Duration::ZERO,
        }
    }
}

impl Script {
    pub fn accepting_only(addresses: &[&str]) -> Self {
        Self {
            recipients: Recipients::Only(addresses.iter().map(|a| a.to_string()).collect()),
            ..Self::default()
        }
    }

    fn recipient_reply(&self, address: &str) -> String {
        match &self.recipients {
            Recipients::All => "250 2.1.5 OK".to_string(),
            Recipients::Only(accepted) => {
                if accepted.iter().any(|a| a.eq_ignore_ascii_case(address)) {
                    "250 2.1.5 OK".to_string()
                } else {
                    "550 5.1.1 no such user".to_string()
                }
            }
            Recipients::Reply(reply) => reply.clone(),
        }
    }
}

/// In-process SMTP server on 127.0.0.1 that answers from a [`Script`]
/// and records every command it receives.
pub struct MockSmtp {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl MockSmtp {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(Mutex::new(Vec::new()));

        let accepted = Arc::clone(&connections);
        let log = Arc::clone(&commands);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                let script = script.clone();
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let _ = serve(socket, script, log).await;
                });
            }
        });

        Self {
            addr,
            connections,
            commands,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn count_commands(&self, prefix: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.to_ascii_uppercase().starts_with(prefix))
            .count()
    }
}

async fn serve(socket: TcpStream, script: Script, log: Arc<Mutex<Vec<String>>>) -> io::Result<()> {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);
    let mut line = String::new();

    let Some(banner) = &script.banner else {
        // Silent server: hold the socket until the client goes away
        while reader.read_line(&mut line).await? != 0 {
            line.clear();
        }
        return Ok(());
    };
    tokio::time::sleep(script.delay).await;
    write.write_all(banner).await?;
    write.write_all(b"\r\n").await?;

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let command = line.trim_end().to_string();
        log.lock().push(command.clone());

        let upper = command.to_ascii_uppercase();
        let reply = if upper.starts_with("EHLO") {
            script.ehlo.clone()
        } else if upper.starts_with("HELO") {
            script.helo.clone()
        } else if upper.starts_with("MAIL FROM:") {
            script.mail_from.clone()
        } else if upper.starts_with("RCPT TO:") {
            let address = command
                .split_once('<')
                .and_then(|(_, rest)| rest.split_once('>'))
                .map(|(address, _)| address)
                .unwrap_or_default();
            script.recipient_reply(address)
        } else if upper == "QUIT" {
            write.write_all(b"221 2.0.0 bye\r\n").await?;
            return Ok(());
        } else {
            "500 5.5.1 command unrecognized".to_string()
        };

        tokio::time::sleep(script.delay).await;
        write.write_all(format!("{reply}\r\n").as_bytes()).await?;
    }
}

/// Routes host names to local mock servers and counts every attempt.
/// Hosts without a route are refused.
#[derive(Default)]
pub struct RoutingConnector {
    routes: HashMap<String, SocketAddr>,
    single_use: HashSet<String>,
    attempts: AtomicUsize,
    tried: Mutex<Vec<String>>,
}

impl RoutingConnector {
    pub fn route(mut self, host: &str, addr: SocketAddr) -> Self {
        self.routes.insert(host.to_string(), addr);
        self
    }

    /// Routes only the first connection to `host`; later ones are refused.
    pub fn route_once(mut self, host: &str, addr: SocketAddr) -> Self {
        self.single_use.insert(host.to_string());
        self.route(host, addr)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn attempts_for(&self, host: &str) -> usize {
        self.tried.lock().iter().filter(|h| *h == host).count()
    }
}

impl Connector for RoutingConnector {
    fn connect<'a>(&'a self, host: &'a str, _port: u16) -> BoxFuture<'a, io::Result<TcpStream>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let previous = {
            let mut tried = self.tried.lock();
            let previous = tried.iter().filter(|h| *h == host).count();
            tried.push(host.to_string());
            previous
        };
        let route = self
            .routes
            .get(host)
            .copied()
            .filter(|_| previous == 0 || !self.single_use.contains(host));
        Box::pin(async move {
            match route {
                Some(addr) => TcpStream::connect(addr).await,
                None => Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )),
            }
        })
    }
}

/// Fixed MX answers per domain.
#[derive(Default)]
pub struct StaticResolver {
    records: HashMap<String, Vec<ExchangeHost>>,
    lookups: AtomicUsize,
}

impl StaticResolver {
    pub fn with(mut self, domain: &str, hosts: &[(&str, u16)]) -> Self {
        self.records.insert(
            domain.to_string(),
            hosts
                .iter()
                .map(|(name, priority)| ExchangeHost::new(*name, *priority))
                .collect(),
        );
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl MxResolver for StaticResolver {
    fn resolve<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Vec<ExchangeHost>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let hosts = self.records.get(domain).cloned().unwrap_or_default();
        Box::pin(async move { hosts })
    }
}

pub struct FixedProbeAddress;

impl ProbeAddressGenerator for FixedProbeAddress {
    fn probe_address(&self, domain: &str) -> String {
        format!("{PROBE_LOCAL_PART}@{domain}")
    }
}

pub fn test_config() -> VerifierConfig {
    VerifierConfig {
        identity: "verifier.test".to_string(),
        reply_timeout: Duration::from_secs(2),
        race_timeout: Duration::from_secs(5),
        fallback_delay: Duration::from_millis(20),
        strategy: ProbeStrategy::Race,
        ..VerifierConfig::default()
    }
}
