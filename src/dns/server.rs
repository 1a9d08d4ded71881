use crate::config::DnsConfig;
use crate::dns::handlers::Handler;
use crate::provider::local::SharedRecordTable;
use tokio::net::{TcpListener, UdpSocket};
use trust_dns_server::ServerFuture;

/// Bind the configured sockets and build a server answering from `table`.
///
/// # Errors
///
/// Returns an error if binding fails or the SOA admin address isn't a valid name.
pub async fn new(
    config: DnsConfig,
    table: SharedRecordTable,
) -> anyhow::Result<ServerFuture<Handler>> {
    let udp_addr = config.udp_bind_addr;
    let tcp_addr = config.tcp_bind_addr;
    let tcp_timeout = config.tcp_timeout;
    let dns_handler = Handler::new(config, table)?;
    let mut dns_server = ServerFuture::new(dns_handler);
    dns_server.register_socket(UdpSocket::bind(udp_addr).await?);
    dns_server.register_listener(TcpListener::bind(tcp_addr).await?, tcp_timeout);
    Ok(dns_server)
}
