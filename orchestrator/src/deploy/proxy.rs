//! Proxy configurator
//!
//! Renders a per-deployment nginx server block, installs it through the
//! privileged channel, and reloads the proxy. Only engaged in production
//! mode; no validation is attempted beyond the reload exit status.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use url::Url;

use crate::deploy::logsink::LogSink;
use crate::deploy::privileged::PrivilegedOps;
use crate::errors::OrchestratorError;

/// Conventional reverse-proxy config directories
#[derive(Debug, Clone)]
pub struct ProxyPaths {
    pub sites_available: PathBuf,
    pub sites_enabled: PathBuf,
}

impl Default for ProxyPaths {
    fn default() -> Self {
        Self {
            sites_available: PathBuf::from("/etc/nginx/sites-available"),
            sites_enabled: PathBuf::from("/etc/nginx/sites-enabled"),
        }
    }
}

/// Installs per-deployment proxy server blocks.
pub struct ProxyConfigurator {
    paths: ProxyPaths,
    privileged: Arc<dyn PrivilegedOps>,
}

impl ProxyConfigurator {
    pub fn new(paths: ProxyPaths, privileged: Arc<dyn PrivilegedOps>) -> Self {
        Self { paths, privileged }
    }

    /// The config filename owned by a deployment
    pub fn config_name(deployment_id: &str) -> String {
        format!("deploy-{}.conf", deployment_id)
    }

    /// Render, install, and activate the server block for `url`.
    pub async fn configure(
        &self,
        url: &str,
        port: u16,
        deployment_id: &str,
        build_output_path: &str,
        use_https: bool,
        sink: &mut LogSink,
    ) -> Result<(), OrchestratorError> {
        let hostname = hostname_of(url)?;
        info!("Configuring proxy for {} -> 127.0.0.1:{}", hostname, port);

        let config = render_server_config(&hostname, port, build_output_path, use_https);
        let name = Self::config_name(deployment_id);
        let available = self.paths.sites_available.join(&name);
        let enabled = self.paths.sites_enabled.join(&name);

        let out = self.privileged.write_file(&available, &config).await?;
        sink.write_line(&out).await;

        let out = self.privileged.symlink(&available, &enabled).await?;
        sink.write_line(&out).await;

        let out = self.privileged.reload_proxy().await?;
        sink.write_line(&out).await;

        Ok(())
    }
}

fn hostname_of(url: &str) -> Result<String, OrchestratorError> {
    let parsed = Url::parse(url)
        .map_err(|e| OrchestratorError::ProxyError(format!("invalid deployment URL: {}", e)))?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| OrchestratorError::ProxyError(format!("URL {} has no hostname", url)))
}

fn render_locations(port: u16, build_output_path: &str) -> String {
    format!(
        r#"    location / {{
        proxy_pass http://127.0.0.1:{port};
        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection 'upgrade';
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_cache_bypass $http_upgrade;
    }}

    location /_next/static/ {{
        alias {out}/.next/static/;
        expires 365d;
        add_header Cache-Control "public, immutable";
    }}

    location /public/ {{
        alias {out}/public/;
        expires 365d;
        add_header Cache-Control "public";
    }}
"#,
        port = port,
        out = build_output_path
    )
}

/// Render the full server configuration for a deployment hostname.
pub fn render_server_config(
    hostname: &str,
    port: u16,
    build_output_path: &str,
    use_https: bool,
) -> String {
    let locations = render_locations(port, build_output_path);

    if !use_https {
        return format!(
            "server {{\n    listen 80;\n    server_name {hostname};\n\n{locations}}}\n",
            hostname = hostname,
            locations = locations
        );
    }

    format!(
        r#"server {{
    listen 80;
    server_name {hostname};
    return 301 https://$host$request_uri;
}}

server {{
    listen 443 ssl http2;
    server_name {hostname};

    ssl_certificate /etc/letsencrypt/live/{hostname}/fullchain.pem;
    ssl_certificate_key /etc/letsencrypt/live/{hostname}/privkey.pem;
    ssl_protocols TLSv1.2 TLSv1.3;
    ssl_ciphers ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305;
    ssl_prefer_server_ciphers off;
    ssl_session_cache shared:SSL:10m;
    ssl_session_timeout 1d;

{locations}}}
"#,
        hostname = hostname,
        locations = locations
    )
}
