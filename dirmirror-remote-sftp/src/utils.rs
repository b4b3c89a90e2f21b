use anyhow::{anyhow, Result};
use russh_sftp::client::error::Error;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::StatusCode;

const DEFAULT_PORT: u16 = 22;

/// Path as sent on the wire: directory paths lose their trailing `/`
/// except for the filesystem root.
pub(crate) fn wire_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// Split `host`, `host:port` or `[v6]:port`.
pub(crate) fn split_host_port(host_with_port: &str) -> Result<(String, u16)> {
    let parse_port = |p: &str| {
        p.parse::<u16>()
            .map_err(|_| anyhow!("invalid port in host: {host_with_port}"))
    };
    if let Some(rest) = host_with_port.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("unterminated IPv6 address: {host_with_port}"))?;
        let port = match tail.strip_prefix(':') {
            Some(p) => parse_port(p)?,
            None => DEFAULT_PORT,
        };
        return Ok((host.to_string(), port));
    }
    match host_with_port.rsplit_once(':') {
        Some((h, p)) => Ok((h.to_string(), parse_port(p)?)),
        None => Ok((host_with_port.to_string(), DEFAULT_PORT)),
    }
}

/// `stat` that maps "no such file" to `false` instead of an error.
pub(crate) async fn remote_exists(sftp: &SftpSession, path: &str) -> Result<bool, Error> {
    match sftp.metadata(wire_path(path)).await {
        Ok(_) => Ok(true),
        Err(Error::Status(status)) if status.status_code == StatusCode::NoSuchFile => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_path_trims_directories() {
        assert_eq!(wire_path("/srv/sub/"), "/srv/sub");
        assert_eq!(wire_path("/srv/a.txt"), "/srv/a.txt");
        assert_eq!(wire_path("/"), "/");
        assert_eq!(wire_path("rel/"), "rel");
    }

    #[test]
    fn host_port_forms() {
        assert_eq!(split_host_port("example.org").unwrap(), ("example.org".into(), 22));
        assert_eq!(split_host_port("example.org:2222").unwrap(), ("example.org".into(), 2222));
        assert_eq!(split_host_port("[::1]:2200").unwrap(), ("::1".into(), 2200));
        assert_eq!(split_host_port("[::1]").unwrap(), ("::1".into(), 22));
        assert!(split_host_port("example.org:ssh").is_err());
    }
}
