use futures::future::BoxFuture;
use std::io;
use tokio::net::TcpStream;

/// Opens the TCP socket a conversation runs on.
///
/// The verifier only ever reaches the network through this trait, so a
/// different implementation can redirect or count connection attempts.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<TcpStream>>;
}

// Plain TCP to the named host, resolved by the system resolver
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<TcpStream>> {
        Box::pin(async move {
            let stream = TcpStream::connect((host, port)).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }
}
