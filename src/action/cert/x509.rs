//! PEM files, chain verification and expiration checks

use crate::action::cert::altnames::AltNames;
use crate::action::cert::{pkcs8, CertPolicy};
use crate::action::ActionError;
use chrono::{DateTime, Utc};
use rcgen::{
    KeyPair, PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384, PKCS_RSA_SHA256, PKCS_RSA_SHA384,
    PKCS_RSA_SHA512,
};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::debug;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::pem::Pem;

/// Load a PEM private key, accepting only RSA or ECDSA keys
///
/// PKCS#8, PKCS#1 (`RSA PRIVATE KEY`) and SEC1 (`EC PRIVATE KEY`) blocks
/// are read; any other blocks in the file are ignored.
pub(crate) fn load_key(path: &Path) -> Result<KeyPair, String> {
    let data = fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let block = Pem::iter_from_buffer(&data)
        .filter_map(Result::ok)
        .find(|pem| pem.label.ends_with("PRIVATE KEY"))
        .ok_or_else(|| format!("{}: no private key found", path.display()))?;
    let der = pkcs8::normalize(&block.label, &block.contents)
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    let key = KeyPair::try_from(der.as_slice()).map_err(|e| format!("{}: {}", path.display(), e))?;

    let algorithm = key.algorithm();
    let supported = [
        &PKCS_RSA_SHA256,
        &PKCS_RSA_SHA384,
        &PKCS_RSA_SHA512,
        &PKCS_ECDSA_P256_SHA256,
        &PKCS_ECDSA_P384_SHA384,
    ];
    if !supported.iter().any(|alg| *alg == algorithm) {
        return Err(format!(
            "the private key file {} is neither in RSA nor ECDSA format",
            path.display()
        ));
    }
    Ok(key)
}

/// Every CERTIFICATE block of a PEM file, leaf first
pub(crate) fn read_chain(path: &Path) -> Result<Vec<Pem>, String> {
    let data = fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let blocks = Pem::iter_from_buffer(&data)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("{}: {}", path.display(), e))?;

    let certs: Vec<Pem> = blocks
        .into_iter()
        .filter(|pem| pem.label == "CERTIFICATE")
        .collect();
    if certs.is_empty() {
        return Err(format!("no certificates found in {}", path.display()));
    }
    Ok(certs)
}

pub(crate) fn parse(pem: &Pem) -> Result<X509Certificate<'_>, String> {
    pem.parse_x509().map_err(|e| e.to_string())
}

/// The certificate's validity window contains `now`
pub(crate) fn validate_period(cert: &X509Certificate<'_>, now: i64) -> Result<(), String> {
    let validity = cert.validity();
    if now < validity.not_before.timestamp() {
        return Err(format!(
            "the certificate is not valid yet: {}",
            validity.not_before
        ));
    }
    if now > validity.not_after.timestamp() {
        return Err(format!("the certificate has expired: {}", validity.not_after));
    }
    Ok(())
}

fn signed_by(child: &X509Certificate<'_>, parent: &X509Certificate<'_>) -> bool {
    child.issuer().to_string() == parent.subject().to_string()
        && child.verify_signature(Some(parent.public_key())).is_ok()
}

/// Walk from `leaf` through `intermediates` up to `root`
pub(crate) fn verify_chain<'a>(
    leaf: &'a X509Certificate<'a>,
    intermediates: &'a [X509Certificate<'a>],
    root: &X509Certificate<'_>,
) -> Result<(), String> {
    let mut current = leaf;
    for _ in 0..=intermediates.len() {
        if signed_by(current, root) {
            return Ok(());
        }
        match intermediates.iter().find(|c| signed_by(current, c)) {
            Some(next) => current = next,
            None => {
                return Err(format!(
                    "certificate issued by \"{}\" does not chain to root \"{}\"",
                    current.issuer(),
                    root.subject()
                ))
            }
        }
    }
    Err("certificate chain does not terminate at the root".to_string())
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        _ => None,
    }
}

fn same_ip(a: &IpAddr, b: &IpAddr) -> bool {
    let canonical = |ip: &IpAddr| match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(*ip),
        IpAddr::V4(_) => *ip,
    };
    canonical(a) == canonical(b)
}

fn dns_matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    if pattern == name {
        return true;
    }
    match (pattern.strip_prefix("*."), name.split_once('.')) {
        (Some(suffix), Some((label, rest))) => !label.is_empty() && suffix == rest,
        _ => false,
    }
}

/// Every requested DNS name and IP is covered by the certificate's SANs
pub(crate) fn verify_alt_names(cert: &X509Certificate<'_>, wanted: &AltNames) -> Result<(), String> {
    let mut dns = Vec::new();
    let mut ips = Vec::new();
    if let Some(san) = cert.subject_alternative_name().map_err(|e| e.to_string())? {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(d) => dns.push(d.to_string()),
                GeneralName::IPAddress(bytes) => ips.extend(ip_from_bytes(bytes)),
                _ => {}
            }
        }
    }

    for name in &wanted.dns_names {
        if !dns.iter().any(|pattern| dns_matches(pattern, name)) {
            return Err(format!("certificate is not valid for {}", name));
        }
    }
    for ip in &wanted.ips {
        if !ips.iter().any(|have| same_ip(have, ip)) {
            return Err(format!("certificate is not valid for {}", ip));
        }
    }
    Ok(())
}

/// Write `contents` unless the policy keeps an existing file
///
/// Returns whether the file was written.
pub(crate) fn write_pem(path: &Path, contents: &str, mode: u32, policy: CertPolicy) -> Result<bool, String> {
    if policy == CertPolicy::IfNotPresent && path.exists() {
        debug!("{} already exists, skip writing", path.display());
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| format!("{}: {}", parent.display(), e))?;
    }
    fs::write(path, contents).map_err(|e| format!("{}: {}", path.display(), e))?;
    set_mode(path, mode)?;
    Ok(true)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), String> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| format!("{}: {}", path.display(), e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), String> {
    Ok(())
}

/// Expiry information for one certificate file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertExpiration {
    pub path: PathBuf,
    pub common_name: String,
    pub not_after: DateTime<Utc>,
    /// Whole days left; negative once expired
    pub residual_days: i64,
}

/// Read the leaf of `path` and report when it expires
pub fn check_expiration(path: &Path) -> Result<CertExpiration, ActionError> {
    let context = format!("failed to read certificate {}", path.display());
    let chain = read_chain(path).map_err(|e| ActionError::certificate(&context, e))?;
    let cert = parse(&chain[0]).map_err(|e| ActionError::certificate(&context, e))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();
    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| ActionError::certificate(&context, "expiry out of range"))?;

    Ok(CertExpiration {
        path: path.to_path_buf(),
        common_name,
        not_after,
        residual_days: (not_after - Utc::now()).num_days(),
    })
}

/// Check every `*.crt` file directly inside `dir`, sorted by path
pub fn scan_expirations(dir: &Path) -> Result<Vec<CertExpiration>, ActionError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| ActionError::certificate(format!("failed to read {}", dir.display()), e))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "crt"))
        .collect();
    paths.sort();

    paths.iter().map(|path| check_expiration(path)).collect()
}
