// ── SNI tunnel ──
//
// rumqttc takes the TLS server name from the address it dials. When the
// broker is reached through an address its certificate does not name
// (an IP, an alias), the session instead runs over a loopback listener:
// rumqttc speaks plain MQTT to it and each accepted connection is
// bridged to the real address over TLS with the canonical name as SNI.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use rumqttc::tokio_rustls::TlsConnector;
use rumqttc::tokio_rustls::rustls::ClientConfig;
use rumqttc::tokio_rustls::rustls::pki_types::ServerName;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;

/// Where a tunnel dials and what it presents.
#[derive(Debug, Clone)]
pub(crate) struct TunnelTarget {
    pub host: String,
    pub port: u16,
    pub server_name: ServerName<'static>,
}

impl TunnelTarget {
    pub fn new(host: &str, port: u16, canonical_host: &str) -> Result<Self, Error> {
        let server_name = ServerName::try_from(canonical_host)
            .map_err(|e| Error::Tls(format!("invalid broker host name `{canonical_host}`: {e}")))?
            .to_owned();
        Ok(Self {
            host: host.to_owned(),
            port,
            server_name,
        })
    }
}

/// Start a loopback listener bridging to `target` until `cancel` fires.
/// Returns the local address to hand to the MQTT client.
pub(crate) async fn spawn(
    target: TunnelTarget,
    tls: Arc<ClientConfig>,
    cancel: CancellationToken,
) -> Result<SocketAddr, Error> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .map_err(|e| Error::MqttConnect(format!("cannot bind TLS tunnel: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| Error::MqttConnect(format!("cannot bind TLS tunnel: {e}")))?;
    debug!(
        %local,
        dial = %target.host,
        server_name = ?target.server_name,
        "TLS tunnel listening"
    );

    let connector = TlsConnector::from(tls);
    let target = Arc::new(target);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let connector = connector.clone();
                        let target = Arc::clone(&target);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                () = cancel.cancelled() => {}
                                () = bridge(stream, &connector, &target) => {}
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "TLS tunnel accept failed"),
                },
            }
        }
        debug!(%local, "TLS tunnel closed");
    });

    Ok(local)
}

async fn bridge(mut local: TcpStream, connector: &TlsConnector, target: &TunnelTarget) {
    let remote = match TcpStream::connect((target.host.as_str(), target.port)).await {
        Ok(remote) => remote,
        Err(e) => {
            debug!(dial = %target.host, port = target.port, error = %e, "tunnel dial failed");
            return;
        }
    };
    let mut tls = match connector.connect(target.server_name.clone(), remote).await {
        Ok(tls) => tls,
        Err(e) => {
            warn!(dial = %target.host, error = %e, "tunnel TLS handshake failed");
            return;
        }
    };
    match tokio::io::copy_bidirectional(&mut local, &mut tls).await {
        Ok((up, down)) => debug!(up, down, "tunnel connection closed"),
        Err(e) => debug!(error = %e, "tunnel connection dropped"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::mqtt::tls;

    #[test]
    fn target_rejects_invalid_name() {
        assert!(matches!(
            TunnelTarget::new("10.0.0.5", 8883, "not a host"),
            Err(Error::Tls(_))
        ));
    }

    #[tokio::test]
    async fn client_hello_names_canonical_host() {
        let broker = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = broker.local_addr().unwrap().port();
        let target = TunnelTarget::new("127.0.0.1", port, "broker.example.com").unwrap();
        let config = tls::pinned_client_config(tls::PINNED_ROOT_PEM, "broker.example.com").unwrap();
        let cancel = CancellationToken::new();

        let local = spawn(target, config, cancel.clone()).await.unwrap();
        assert!(local.ip().is_loopback());
        let _client = TcpStream::connect(local).await.unwrap();

        let (mut upstream, _) = broker.accept().await.unwrap();
        let mut hello = Vec::new();
        let mut buf = [0u8; 2048];
        let needle = b"broker.example.com";
        tokio::time::timeout(Duration::from_secs(5), async {
            while !hello.windows(needle.len()).any(|w| w == needle) {
                let n = upstream.read(&mut buf).await.unwrap();
                assert!(n > 0, "tunnel closed before sending ClientHello");
                hello.extend_from_slice(&buf[..n]);
            }
        })
        .await
        .unwrap();

        // TLS handshake record
        assert_eq!(hello[0], 0x16);
        cancel.cancel();
    }

    #[tokio::test]
    async fn cancelled_tunnel_stops_accepting() {
        let target = TunnelTarget::new("127.0.0.1", 1, "broker.example.com").unwrap();
        let config = tls::pinned_client_config(tls::PINNED_ROOT_PEM, "broker.example.com").unwrap();
        let cancel = CancellationToken::new();
        let local = spawn(target, config, cancel.clone()).await.unwrap();

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let refused = tokio::time::timeout(Duration::from_secs(2), TcpStream::connect(local))
            .await
            .unwrap();
        assert!(refused.is_err());
    }
}
