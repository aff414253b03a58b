//! HTTP server command: `sitesmith serve`.

use anyhow::Result;
use sitesmith::config::Config;

pub async fn cmd_serve(mut config: Config, port: Option<u16>, host: Option<String>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    sitesmith::server::start_server(config).await
}
