//! Tunnel configuration synthesis, persistence and parsing.
//!
//! [`ConfigSynthesizer`] turns a provisioning response plus locally generated
//! key material into a [`TunnelConfig`] and writes it to disk in the
//! `wg-quick` format. [`FallbackFields`] reads that file back when the manual
//! bring-up path has to drive `wg setconf` directly.

use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::Write as IoWrite;
use std::net::IpAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use ipnet::IpNet;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{Result, WireGuardError};
use crate::keys::{KeyPair, PresharedKey, PrivateKey, PublicKey};
use crate::options::TunnelOptions;

/// File mode for anything holding key material.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

/// Atomically replaces `path` with a `0600` file holding `contents`.
///
/// The data goes to a temporary file in the same directory, which is then
/// renamed over `path`. A symlink at `path` is replaced, never followed, and
/// readers see either the old file or the complete new one.
pub(crate) async fn write_private_file(
    path: &Path,
    contents: Zeroizing<Vec<u8>>,
) -> std::io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || replace_private_file(&path, &contents))
        .await
        .map_err(std::io::Error::other)?
}

fn replace_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new().prefix(".veil-").tempfile_in(dir)?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(PRIVATE_FILE_MODE))?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// What the control plane handed back for this client, plus our private key.
#[derive(Debug, Clone)]
pub struct ProvisioningResult {
    /// Tunnel address assigned to this client, with or without a prefix.
    pub client_address: String,
    /// Base64 public key of the server peer.
    pub server_public_key: String,
    /// Preshared key as echoed by the server; may be empty.
    pub server_preshared_key: String,
    /// Server endpoint, `host` or `host:port`.
    pub endpoint: String,
    /// Private key generated locally for this attempt.
    pub private_key: PrivateKey,
}

/// A fully resolved tunnel configuration.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Interface this configuration is for.
    pub interface_name: String,
    /// Our private key.
    pub private_key: PrivateKey,
    /// Tunnel address in CIDR form.
    pub address: IpNet,
    /// DNS servers, in order.
    pub dns_servers: Vec<IpAddr>,
    /// Server public key.
    pub peer_public_key: PublicKey,
    /// Preshared key for the peer.
    pub preshared_key: PresharedKey,
    /// Networks routed through the peer, in order.
    pub allowed_ips: Vec<IpNet>,
    /// Server endpoint as `host:port`.
    pub endpoint: String,
    /// Persistent keepalive interval in seconds.
    pub keepalive_secs: u16,
    /// Command `wg-quick` runs after the interface comes up.
    pub post_up: String,
    /// Command `wg-quick` runs after the interface goes down.
    pub post_down: String,
}

impl TunnelConfig {
    /// Renders the configuration in `wg-quick` format.
    #[must_use]
    pub fn render(&self) -> String {
        let mut output = String::new();

        output.push_str("[Interface]\n");
        let _ = writeln!(output, "PrivateKey = {}", self.private_key.to_base64());
        let _ = writeln!(output, "Address = {}", self.address);
        let _ = writeln!(output, "DNS = {}", join(&self.dns_servers, ", "));
        let _ = writeln!(output, "PostUp = {}", self.post_up);
        let _ = writeln!(output, "PostDown = {}", self.post_down);

        output.push('\n');
        output.push_str("[Peer]\n");
        let _ = writeln!(output, "PublicKey = {}", self.peer_public_key.to_base64());
        let _ = writeln!(output, "PresharedKey = {}", self.preshared_key.to_base64());
        let _ = writeln!(output, "AllowedIPs = {}", join(&self.allowed_ips, ", "));
        let _ = writeln!(output, "Endpoint = {}", self.endpoint);
        let _ = writeln!(output, "PersistentKeepalive = {}", self.keepalive_secs);

        output
    }
}

fn join<T: ToString>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

/// Builds and persists tunnel configurations for one set of options.
#[derive(Debug, Clone)]
pub struct ConfigSynthesizer {
    options: TunnelOptions,
}

impl ConfigSynthesizer {
    /// Creates a synthesizer using the given host options.
    #[must_use]
    pub fn new(options: TunnelOptions) -> Self {
        Self { options }
    }

    /// The options this synthesizer applies.
    #[must_use]
    pub fn options(&self) -> &TunnelOptions {
        &self.options
    }

    /// Combines provisioning data with local key material.
    ///
    /// # Errors
    ///
    /// Returns `ProvisioningIntegrity` if the attached private key is not the
    /// attempt's key or the echoed preshared key differs from the one sent,
    /// and `MalformedProvisioningData` for missing or unparseable fields.
    pub fn synthesize(
        &self,
        provisioning: &ProvisioningResult,
        keys: &KeyPair,
        preshared_key: &PresharedKey,
    ) -> Result<TunnelConfig> {
        if &provisioning.private_key != keys.private_key() {
            return Err(WireGuardError::ProvisioningIntegrity(
                "private key does not belong to this connection attempt".to_string(),
            ));
        }

        let echoed_psk = provisioning.server_preshared_key.trim();
        if !echoed_psk.is_empty() {
            let echoed = PresharedKey::from_base64(echoed_psk)
                .map_err(|e| WireGuardError::malformed("server_preshared_key", e.to_string()))?;
            if &echoed != preshared_key {
                return Err(WireGuardError::ProvisioningIntegrity(
                    "server echoed a different preshared key".to_string(),
                ));
            }
        }

        let address = parse_address(required("client_address", &provisioning.client_address)?)?;
        let peer_public_key =
            PublicKey::from_base64(required("server_public_key", &provisioning.server_public_key)?)
                .map_err(|e| WireGuardError::malformed("server_public_key", e.to_string()))?;
        let endpoint = normalize_endpoint(
            required("endpoint", &provisioning.endpoint)?,
            self.options.endpoint_port,
        )?;

        let dns = join(&self.options.dns_servers, " ");

        Ok(TunnelConfig {
            interface_name: self.options.interface_name.clone(),
            private_key: provisioning.private_key.clone(),
            address,
            dns_servers: self.options.dns_servers.clone(),
            peer_public_key,
            preshared_key: preshared_key.clone(),
            allowed_ips: self.options.allowed_ips.clone(),
            endpoint,
            keepalive_secs: self.options.keepalive_secs,
            post_up: format!("resolvectl dns %i {dns}; resolvectl domain %i ~."),
            post_down: "resolvectl revert %i".to_string(),
        })
    }

    /// Writes the configuration to `path` with mode `0600`.
    ///
    /// Parent directories are created as needed. An existing file or symlink
    /// at `path` is atomically replaced.
    ///
    /// # Errors
    ///
    /// Returns `ConfigWrite` if the directory or file cannot be written.
    pub async fn persist(&self, config: &TunnelConfig, path: &Path) -> Result<PathBuf> {
        let write_err = |e: std::io::Error| WireGuardError::ConfigWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let rendered = Zeroizing::new(config.render().into_bytes());
        write_private_file(path, rendered).await.map_err(write_err)?;

        debug!(interface = %config.interface_name, path = %path.display(), "persisted tunnel configuration");
        Ok(path.to_path_buf())
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        Err(WireGuardError::malformed(field, "missing or empty"))
    } else {
        Ok(value)
    }
}

/// Parses the client address, adding a host prefix when none is given.
fn parse_address(value: &str) -> Result<IpNet> {
    if value.contains('/') {
        return value
            .parse::<IpNet>()
            .map_err(|e| WireGuardError::malformed("client_address", format!("{value}: {e}")));
    }
    value
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|e| WireGuardError::malformed("client_address", format!("{value}: {e}")))
}

/// Ensures the endpoint carries a port, using `default_port` when absent.
fn normalize_endpoint(value: &str, default_port: u16) -> Result<String> {
    let invalid = |why: &str| WireGuardError::malformed("endpoint", format!("{value}: {why}"));

    if value.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }

    if let Some(rest) = value.strip_prefix('[') {
        let Some((host, tail)) = rest.split_once(']') else {
            return Err(invalid("unterminated IPv6 literal"));
        };
        host.parse::<std::net::Ipv6Addr>()
            .map_err(|_| invalid("invalid IPv6 literal"))?;
        return match tail {
            "" => Ok(format!("[{host}]:{default_port}")),
            _ => {
                let port = tail.strip_prefix(':').ok_or_else(|| invalid("invalid port"))?;
                parse_port(port).ok_or_else(|| invalid("invalid port"))?;
                Ok(value.to_string())
            }
        };
    }

    // A bare IPv6 literal contains colons but no port.
    if let Ok(IpAddr::V6(v6)) = value.parse::<IpAddr>() {
        return Ok(format!("[{v6}]:{default_port}"));
    }

    match value.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return Err(invalid("missing host"));
            }
            parse_port(port).ok_or_else(|| invalid("invalid port"))?;
            Ok(value.to_string())
        }
        None => Ok(format!("{value}:{default_port}")),
    }
}

fn parse_port(s: &str) -> Option<u16> {
    s.parse::<u16>().ok().filter(|p| *p != 0)
}

/// Fields of a persisted configuration needed by the manual bring-up path.
#[derive(Debug, Clone)]
pub struct FallbackFields {
    /// Our private key.
    pub private_key: PrivateKey,
    /// Interface addresses, in file order.
    pub addresses: Vec<IpNet>,
    /// Peer public key.
    pub peer_public_key: PublicKey,
    /// Peer preshared key.
    pub preshared_key: PresharedKey,
    /// Peer endpoint.
    pub endpoint: String,
    /// Routed networks; empty when the file has no `AllowedIPs`.
    pub allowed_ips: Vec<IpNet>,
    /// Keepalive interval, if set.
    pub keepalive_secs: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Interface,
    Peer,
}

impl Section {
    fn name(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Interface => "Interface",
            Self::Peer => "Peer",
        }
    }
}

#[derive(Default)]
struct Collected {
    private_key: Option<PrivateKey>,
    addresses: Vec<IpNet>,
    peer_public_key: Option<PublicKey>,
    preshared_key: Option<PresharedKey>,
    endpoint: Option<String>,
    allowed_ips: Vec<IpNet>,
    keepalive_secs: Option<u16>,
}

impl FallbackFields {
    /// Reads a configuration file and parses it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigRead` if the file cannot be read, otherwise whatever
    /// [`FallbackFields::parse`] returns.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = Zeroizing::new(tokio::fs::read_to_string(path).await.map_err(|e| {
            WireGuardError::ConfigRead {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?);
        Self::parse(&text)
    }

    /// Parses `wg-quick` configuration text.
    ///
    /// Keys only `wg-quick` understands (`DNS`, `PostUp`, `MTU`, ...) are
    /// accepted and ignored. Exactly one `[Peer]` section is allowed.
    ///
    /// # Errors
    ///
    /// Returns `ConfigParse` for malformed lines or values and
    /// `MissingConfigField` when a required key is absent.
    pub fn parse(text: &str) -> Result<Self> {
        let mut section = Section::None;
        let mut seen_peer = false;
        let mut c = Collected::default();

        for (index, raw) in text.lines().enumerate() {
            let line_number = index + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = match name.trim() {
                    "Interface" => Section::Interface,
                    "Peer" if seen_peer => {
                        return Err(WireGuardError::parse(line_number, "more than one [Peer] section"));
                    }
                    "Peer" => {
                        seen_peer = true;
                        Section::Peer
                    }
                    other => {
                        return Err(WireGuardError::parse(
                            line_number,
                            format!("unknown section: {other}"),
                        ));
                    }
                };
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(WireGuardError::parse(line_number, format!("expected key = value: {line}")));
            };
            let (key, value) = (key.trim(), value.trim());

            match section {
                Section::None => {
                    return Err(WireGuardError::parse(line_number, "key-value pair outside of section"));
                }
                Section::Interface => c.interface_key(key, value, line_number)?,
                Section::Peer => c.peer_key(key, value, line_number)?,
            }
        }

        let missing = |section: Section, key: &str| WireGuardError::missing_field(section.name(), key);

        let private_key = c
            .private_key
            .ok_or_else(|| missing(Section::Interface, "PrivateKey"))?;
        if c.addresses.is_empty() {
            return Err(missing(Section::Interface, "Address"));
        }
        let peer_public_key = c
            .peer_public_key
            .ok_or_else(|| missing(Section::Peer, "PublicKey"))?;
        let preshared_key = c
            .preshared_key
            .ok_or_else(|| missing(Section::Peer, "PresharedKey"))?;
        let endpoint = c.endpoint.ok_or_else(|| missing(Section::Peer, "Endpoint"))?;

        Ok(Self {
            private_key,
            addresses: c.addresses,
            peer_public_key,
            preshared_key,
            endpoint,
            allowed_ips: c.allowed_ips,
            keepalive_secs: c.keepalive_secs,
        })
    }

    /// Renders the protocol-only document accepted by `wg setconf`.
    #[must_use]
    pub fn render_low_level(&self) -> String {
        let mut output = String::new();

        output.push_str("[Interface]\n");
        let _ = writeln!(output, "PrivateKey = {}", self.private_key.to_base64());

        output.push('\n');
        output.push_str("[Peer]\n");
        let _ = writeln!(output, "PublicKey = {}", self.peer_public_key.to_base64());
        let _ = writeln!(output, "PresharedKey = {}", self.preshared_key.to_base64());
        if !self.allowed_ips.is_empty() {
            let _ = writeln!(output, "AllowedIPs = {}", join(&self.allowed_ips, ", "));
        }
        let _ = writeln!(output, "Endpoint = {}", self.endpoint);
        if let Some(keepalive) = self.keepalive_secs {
            let _ = writeln!(output, "PersistentKeepalive = {keepalive}");
        }

        output
    }
}

impl Collected {
    fn interface_key(&mut self, key: &str, value: &str, line: usize) -> Result<()> {
        match key {
            "PrivateKey" => {
                self.private_key = Some(
                    PrivateKey::from_base64(value)
                        .map_err(|_| WireGuardError::parse(line, "invalid PrivateKey"))?,
                );
            }
            "Address" => {
                for addr in value.split(',').map(str::trim).filter(|a| !a.is_empty()) {
                    let net = parse_address(addr)
                        .map_err(|_| WireGuardError::parse(line, format!("invalid Address: {addr}")))?;
                    self.addresses.push(net);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn peer_key(&mut self, key: &str, value: &str, line: usize) -> Result<()> {
        match key {
            "PublicKey" => {
                self.peer_public_key = Some(
                    PublicKey::from_base64(value)
                        .map_err(|_| WireGuardError::parse(line, "invalid PublicKey"))?,
                );
            }
            "PresharedKey" => {
                self.preshared_key = Some(
                    PresharedKey::from_base64(value)
                        .map_err(|_| WireGuardError::parse(line, "invalid PresharedKey"))?,
                );
            }
            "Endpoint" => {
                if value.is_empty() {
                    return Err(WireGuardError::parse(line, "empty Endpoint"));
                }
                self.endpoint = Some(value.to_string());
            }
            "AllowedIPs" => {
                for ip in value.split(',').map(str::trim).filter(|a| !a.is_empty()) {
                    let net = ip
                        .parse::<IpNet>()
                        .map_err(|_| WireGuardError::parse(line, format!("invalid AllowedIPs: {ip}")))?;
                    self.allowed_ips.push(net);
                }
            }
            "PersistentKeepalive" => {
                let secs = if value.eq_ignore_ascii_case("off") {
                    0
                } else {
                    value
                        .parse()
                        .map_err(|_| WireGuardError::parse(line, "invalid PersistentKeepalive"))?
                };
                self.keepalive_secs = Some(secs);
            }
            _ => {
                return Err(WireGuardError::parse(line, format!("unknown [Peer] key: {key}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_SIZE;
    use test_case::test_case;

    fn key_pair(seed: u8) -> KeyPair {
        KeyPair::from_private_key(PrivateKey::from_bytes_array([seed; KEY_SIZE]))
    }

    fn psk(seed: u8) -> PresharedKey {
        PresharedKey::from_bytes_array([seed; KEY_SIZE])
    }

    fn provisioning(keys: &KeyPair) -> ProvisioningResult {
        ProvisioningResult {
            client_address: "10.0.0.2".to_string(),
            server_public_key: key_pair(200).public_key().to_base64(),
            server_preshared_key: String::new(),
            endpoint: "vpn.example.com".to_string(),
            private_key: keys.private_key().clone(),
        }
    }

    fn synthesizer() -> ConfigSynthesizer {
        ConfigSynthesizer::new(TunnelOptions::new("veil0"))
    }

    #[test]
    fn synthesize_fills_defaults() {
        let keys = key_pair(1);
        let config = synthesizer()
            .synthesize(&provisioning(&keys), &keys, &psk(2))
            .expect("synthesize");

        assert_eq!(config.address.to_string(), "10.0.0.2/32");
        assert_eq!(config.endpoint, "vpn.example.com:51820");
        assert_eq!(config.keepalive_secs, 25);
        assert_eq!(
            config.post_up,
            "resolvectl dns %i 1.1.1.1 1.0.0.1; resolvectl domain %i ~."
        );
    }

    #[test]
    fn render_matches_wg_quick_layout() {
        let keys = key_pair(1);
        let config = synthesizer()
            .synthesize(&provisioning(&keys), &keys, &psk(2))
            .expect("synthesize");

        let expected = format!(
            "[Interface]\n\
             PrivateKey = {}\n\
             Address = 10.0.0.2/32\n\
             DNS = 1.1.1.1, 1.0.0.1\n\
             PostUp = resolvectl dns %i 1.1.1.1 1.0.0.1; resolvectl domain %i ~.\n\
             PostDown = resolvectl revert %i\n\
             \n\
             [Peer]\n\
             PublicKey = {}\n\
             PresharedKey = {}\n\
             AllowedIPs = 0.0.0.0/0, ::/0\n\
             Endpoint = vpn.example.com:51820\n\
             PersistentKeepalive = 25\n",
            keys.private_key().to_base64(),
            key_pair(200).public_key().to_base64(),
            psk(2).to_base64(),
        );
        assert_eq!(config.render(), expected);
    }

    #[test_case("10.0.0.2", "10.0.0.2/32" ; "bare v4")]
    #[test_case("10.0.0.2/24", "10.0.0.2/24" ; "v4 with prefix")]
    #[test_case("fd00::2", "fd00::2/128" ; "bare v6")]
    #[test_case(" 10.0.0.9 ", "10.0.0.9/32" ; "whitespace trimmed")]
    fn address_normalization(input: &str, expected: &str) {
        let keys = key_pair(1);
        let mut p = provisioning(&keys);
        p.client_address = input.to_string();
        let config = synthesizer().synthesize(&p, &keys, &psk(2)).expect("synthesize");
        assert_eq!(config.address.to_string(), expected);
    }

    #[test_case("vpn.example.com", "vpn.example.com:51820" ; "host only")]
    #[test_case("vpn.example.com:443", "vpn.example.com:443" ; "host and port")]
    #[test_case("203.0.113.7", "203.0.113.7:51820" ; "ipv4 only")]
    #[test_case("2001:db8::1", "[2001:db8::1]:51820" ; "bare ipv6")]
    #[test_case("[2001:db8::1]", "[2001:db8::1]:51820" ; "bracketed ipv6")]
    #[test_case("[2001:db8::1]:9000", "[2001:db8::1]:9000" ; "bracketed ipv6 with port")]
    fn endpoint_normalization(input: &str, expected: &str) {
        assert_eq!(normalize_endpoint(input, 51820).expect("valid"), expected);
    }

    #[test_case("host:notaport" ; "bad port")]
    #[test_case("host:0" ; "zero port")]
    #[test_case(":51820" ; "no host")]
    #[test_case("[2001:db8::1" ; "unterminated")]
    #[test_case("a b" ; "whitespace")]
    fn bad_endpoints_rejected(input: &str) {
        assert!(matches!(
            normalize_endpoint(input, 51820),
            Err(WireGuardError::MalformedProvisioningData { .. })
        ));
    }

    #[test_case("client_address" ; "address")]
    #[test_case("server_public_key" ; "server key")]
    #[test_case("endpoint" ; "endpoint")]
    fn blank_fields_are_malformed(field: &str) {
        let keys = key_pair(1);
        let mut p = provisioning(&keys);
        match field {
            "client_address" => p.client_address = "  ".to_string(),
            "server_public_key" => p.server_public_key = String::new(),
            _ => p.endpoint = String::new(),
        }
        let err = synthesizer().synthesize(&p, &keys, &psk(2)).expect_err("must fail");
        assert!(
            matches!(&err, WireGuardError::MalformedProvisioningData { field: f, .. } if f == field),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn invalid_cidr_is_malformed() {
        let keys = key_pair(1);
        let mut p = provisioning(&keys);
        p.client_address = "10.0.0.300/24".to_string();
        assert!(matches!(
            synthesizer().synthesize(&p, &keys, &psk(2)),
            Err(WireGuardError::MalformedProvisioningData { .. })
        ));
    }

    #[test]
    fn foreign_private_key_fails_integrity() {
        let keys = key_pair(1);
        let mut p = provisioning(&keys);
        p.private_key = key_pair(9).private_key().clone();
        assert!(matches!(
            synthesizer().synthesize(&p, &keys, &psk(2)),
            Err(WireGuardError::ProvisioningIntegrity(_))
        ));
    }

    #[test]
    fn echoed_psk_must_match() {
        let keys = key_pair(1);
        let mut p = provisioning(&keys);

        p.server_preshared_key = psk(2).to_base64();
        assert!(synthesizer().synthesize(&p, &keys, &psk(2)).is_ok());

        p.server_preshared_key = psk(3).to_base64();
        assert!(matches!(
            synthesizer().synthesize(&p, &keys, &psk(2)),
            Err(WireGuardError::ProvisioningIntegrity(_))
        ));
    }

    #[tokio::test]
    async fn persist_writes_owner_only_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("veil0.conf");
        let keys = key_pair(1);
        let synth = synthesizer();
        let config = synth.synthesize(&provisioning(&keys), &keys, &psk(2)).expect("synthesize");

        let written = synth.persist(&config, &path).await.expect("persist");

        assert_eq!(written, path);
        let mode = fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(fs::read_to_string(&path).expect("read"), config.render());
    }

    #[tokio::test]
    async fn persist_narrows_existing_wide_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("veil0.conf");
        fs::write(&path, "old contents that are longer than nothing").expect("write");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");

        let keys = key_pair(1);
        let synth = synthesizer();
        let config = synth.synthesize(&provisioning(&keys), &keys, &psk(2)).expect("synthesize");
        synth.persist(&config, &path).await.expect("persist");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(fs::read_to_string(&path).expect("read"), config.render());
    }

    #[tokio::test]
    async fn persist_replaces_symlink_instead_of_following_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let victim = dir.path().join("victim");
        fs::write(&victim, "important\n").expect("write");
        fs::set_permissions(&victim, fs::Permissions::from_mode(0o644)).expect("chmod");
        let path = dir.path().join("veil0.conf");
        std::os::unix::fs::symlink(&victim, &path).expect("symlink");

        let keys = key_pair(1);
        let synth = synthesizer();
        let config = synth.synthesize(&provisioning(&keys), &keys, &psk(2)).expect("synthesize");
        synth.persist(&config, &path).await.expect("persist");

        assert_eq!(fs::read_to_string(&victim).expect("read victim"), "important\n");
        let victim_mode = fs::metadata(&victim).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(victim_mode, 0o644);

        let meta = fs::symlink_metadata(&path).expect("metadata");
        assert!(meta.file_type().is_file());
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert_eq!(fs::read_to_string(&path).expect("read"), config.render());
    }

    #[tokio::test]
    async fn persist_leaves_no_staging_files_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("veil0.conf");
        let keys = key_pair(1);
        let synth = synthesizer();
        let config = synth.synthesize(&provisioning(&keys), &keys, &psk(2)).expect("synthesize");
        synth.persist(&config, &path).await.expect("first");
        synth.persist(&config, &path).await.expect("second");

        let names: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("veil0.conf")]);
    }

    #[tokio::test]
    async fn persist_into_unwritable_location_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").expect("write");
        let keys = key_pair(1);
        let synth = synthesizer();
        let config = synth.synthesize(&provisioning(&keys), &keys, &psk(2)).expect("synthesize");

        let result = synth.persist(&config, &blocker.join("veil0.conf")).await;
        assert!(matches!(result, Err(WireGuardError::ConfigWrite { .. })));
    }

    #[test]
    fn parse_ignores_wg_quick_only_keys() {
        let keys = key_pair(1);
        let config = synthesizer()
            .synthesize(&provisioning(&keys), &keys, &psk(2))
            .expect("synthesize");

        let fields = FallbackFields::parse(&config.render()).expect("parse");
        assert_eq!(fields.addresses, vec![config.address]);
        assert_eq!(fields.keepalive_secs, Some(25));
        assert_eq!(fields.allowed_ips, config.allowed_ips);
    }

    #[test]
    fn parse_reports_missing_endpoint() {
        let keys = key_pair(1);
        let text = format!(
            "[Interface]\nPrivateKey = {}\nAddress = 10.0.0.2/32\n\n[Peer]\nPublicKey = {}\nPresharedKey = {}\n",
            keys.private_key().to_base64(),
            key_pair(2).public_key().to_base64(),
            psk(3).to_base64(),
        );
        let err = FallbackFields::parse(&text).expect_err("must fail");
        assert!(matches!(
            err,
            WireGuardError::MissingConfigField { ref section, ref key } if section == "Peer" && key == "Endpoint"
        ));
    }

    #[test]
    fn parse_reports_missing_private_key() {
        let err = FallbackFields::parse("[Interface]\nAddress = 10.0.0.2/32\n").expect_err("must fail");
        assert!(matches!(
            err,
            WireGuardError::MissingConfigField { ref key, .. } if key == "PrivateKey"
        ));
    }

    #[test_case("PrivateKey = abc\n", 1 ; "outside section")]
    #[test_case("[Interface]\nnonsense\n", 2 ; "no equals")]
    #[test_case("[Wat]\n", 1 ; "unknown section")]
    #[test_case("[Interface]\nPrivateKey = !!\n", 2 ; "bad key")]
    #[test_case("[Peer]\n[Peer]\n", 2 ; "two peers")]
    fn parse_reports_line_numbers(text: &str, expected_line: usize) {
        let result = FallbackFields::parse(text);
        assert!(
            matches!(result, Err(WireGuardError::ConfigParse { line, .. }) if line == expected_line),
            "unexpected result: {result:?}"
        );
    }

    #[test]
    fn low_level_document_has_protocol_fields_only() {
        let keys = key_pair(1);
        let config = synthesizer()
            .synthesize(&provisioning(&keys), &keys, &psk(2))
            .expect("synthesize");
        let low = FallbackFields::parse(&config.render())
            .expect("parse")
            .render_low_level();

        assert!(low.contains("PrivateKey = "));
        assert!(low.contains("Endpoint = vpn.example.com:51820"));
        assert!(low.contains("PersistentKeepalive = 25"));
        for key in ["Address", "DNS", "PostUp", "PostDown"] {
            assert!(!low.contains(key), "{key} must not reach wg setconf");
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn rendered_config_parses_back(
                private_seed in any::<[u8; 32]>(),
                peer_seed in any::<[u8; 32]>(),
                psk_bytes in any::<[u8; 32]>(),
                octets in any::<[u8; 4]>(),
                prefix in 8u8..=32,
                host in "[a-z]{1,12}(\\.[a-z]{2,6}){0,2}",
                port in 1u16..=65535,
            ) {
                let keys = KeyPair::from_private_key(PrivateKey::from_bytes_array(private_seed));
                let peer = PrivateKey::from_bytes_array(peer_seed).public_key();
                let psk = PresharedKey::from_bytes_array(psk_bytes);
                let p = ProvisioningResult {
                    client_address: format!(
                        "{}.{}.{}.{}/{prefix}", octets[0], octets[1], octets[2], octets[3]
                    ),
                    server_public_key: peer.to_base64(),
                    server_preshared_key: String::new(),
                    endpoint: format!("{host}:{port}"),
                    private_key: keys.private_key().clone(),
                };

                let config = synthesizer().synthesize(&p, &keys, &psk).expect("synthesize");
                let fields = FallbackFields::parse(&config.render()).expect("parse");

                prop_assert_eq!(&fields.private_key, keys.private_key());
                prop_assert_eq!(fields.addresses, vec![config.address]);
                prop_assert_eq!(fields.peer_public_key, peer);
                prop_assert_eq!(&fields.preshared_key, &psk);
                prop_assert_eq!(fields.endpoint, format!("{host}:{port}"));
            }
        }
    }
}
