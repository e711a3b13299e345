//! Startup reachability probes.
//!
//! Purely informational: a relay that cannot resolve names or reach an NTP
//! server still starts, it just logs the fact. Clock-offset findings never
//! feed back into peer state.

use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

const NTP_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

// NTP epoch is Jan 1, 1900; unix epoch is Jan 1, 1970
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// Resolve each host once and report whether any lookup succeeded.
pub async fn check_dns(hosts: &[String]) -> bool {
    let mut reachable = false;
    for host in hosts {
        // lookup_host wants a port; any will do for a resolution check
        let target = if host.contains(':') {
            host.clone()
        } else {
            format!("{}:53", host)
        };

        match tokio::net::lookup_host(&target).await {
            Ok(mut addrs) => {
                if addrs.next().is_some() {
                    info!("✓ DNS probe resolved {}", host);
                    reachable = true;
                } else {
                    warn!("DNS probe for {} returned no addresses", host);
                }
            }
            Err(e) => warn!("DNS probe for {} failed: {}", host, e),
        };
    }
    reachable
}

/// Query the given NTP servers until one answers; log the clock offset.
pub async fn check_ntp(servers: &[String]) -> bool {
    for server in servers {
        match query_ntp_server(server).await {
            Ok((ntp_time, ping_ms)) => {
                let offset = ntp_time - Utc::now().timestamp();
                info!(
                    "✓ NTP probe via {} | offset: {}s | ping: {}ms",
                    server, offset, ping_ms
                );
                if offset.abs() >= 60 {
                    warn!(
                        "System clock is {}s off NTP time - please synchronize it",
                        offset
                    );
                }
                return true;
            }
            Err(e) => warn!("NTP probe via {} failed: {}", server, e),
        }
    }
    warn!("All NTP probes failed - continuing without a clock reference");
    false
}

async fn query_ntp_server(server: &str) -> Result<(i64, i64), String> {
    use std::time::Instant;
    use tokio::net::UdpSocket;

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| format!("failed to bind socket: {}", e))?;

    socket
        .connect(server)
        .await
        .map_err(|e| format!("failed to connect: {}", e))?;

    // 48-byte SNTP request: LI=0, VN=3, Mode=3 (client)
    let mut request = [0u8; 48];
    request[0] = 0x1B;

    let start = Instant::now();

    socket
        .send(&request)
        .await
        .map_err(|e| format!("failed to send request: {}", e))?;

    let mut response = [0u8; 48];
    let received = tokio::time::timeout(NTP_QUERY_TIMEOUT, socket.recv(&mut response)).await;

    let ping_ms = start.elapsed().as_millis() as i64;

    received
        .map_err(|_| "request timed out".to_string())?
        .map_err(|e| format!("failed to receive response: {}", e))?;

    // Transmit timestamp lives in bytes 40-47; seconds are the first word
    let seconds = u32::from_be_bytes([response[40], response[41], response[42], response[43]]);
    let ntp_time = seconds as i64 - NTP_UNIX_OFFSET;

    Ok((ntp_time, ping_ms))
}
