//! Certificate issuance
//!
//! [`GenCert`] creates a self-signed CA when no root is given, or a
//! certificate signed by the root otherwise. Under `IfNotPresent` an
//! existing certificate is reused when its key loads, it is inside its
//! validity window, it chains to the root and it covers every requested
//! SAN. Independently, the writers never replace an existing file under
//! `IfNotPresent`, so a rejected certificate stays on disk untouched.

pub mod altnames;
mod pkcs8;
pub mod x509;

pub use altnames::AltNames;
pub use x509::{check_expiration, scan_expirations, CertExpiration};

use crate::action::{Action, ActionError};
use crate::core::runtime::HostRuntime;
use crate::core::variable::{optional_string_var, string_slice_var, string_var, VariableError};
use async_trait::async_trait;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, Ia5String, IsCa,
    KeyPair, KeyUsagePurpose, SanType, SerialNumber,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;
use x509_parser::pem::Pem;

/// Validity used when `date` is not given: ten years
pub const DEFAULT_SIGN_CERT_AFTER: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Organization written into every issued subject
pub const CERT_ORGANIZATION: &str = "kubekey";

const KEY_FILE_MODE: u32 = 0o600;
const CERT_FILE_MODE: u32 = 0o644;

/// Whether existing certificate files may be replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertPolicy {
    Always,
    IfNotPresent,
}

impl FromStr for CertPolicy {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Always" => Ok(CertPolicy::Always),
            "IfNotPresent" => Ok(CertPolicy::IfNotPresent),
            _ => Err(ActionError::InvalidArgument(
                "\"policy\" should be one of [Always, IfNotPresent]".to_string(),
            )),
        }
    }
}

/// What [`CertRequest::issue`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertOutcome {
    /// The existing certificate satisfied the request
    Reused,
    /// Fresh key and certificate were written
    Written,
    /// A certificate was generated but existing files were kept
    Retained,
}

impl CertOutcome {
    pub fn stdout(&self) -> &'static str {
        match self {
            CertOutcome::Reused => "skip",
            CertOutcome::Written | CertOutcome::Retained => "success",
        }
    }
}

/// Parse a Go-style duration such as `8760h`, `1h30m` or `1.5s`
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid duration \"{}\"", input);
    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(invalid());
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        total += value * seconds;
        rest = &rest[unit_len..];
    }

    Duration::try_from_secs_f64(total).map_err(|_| invalid())
}

/// Fully resolved certificate arguments
#[derive(Debug, Clone)]
pub struct CertRequest {
    pub root_key: Option<PathBuf>,
    pub root_cert: Option<PathBuf>,
    pub validity: Duration,
    pub policy: CertPolicy,
    pub common_name: String,
    pub alt_names: AltNames,
    pub is_ca: bool,
    pub out_key: PathBuf,
    pub out_cert: PathBuf,
}

fn non_empty_path(value: Option<String>) -> Option<PathBuf> {
    value.filter(|v| !v.is_empty()).map(PathBuf::from)
}

impl CertRequest {
    /// Resolve the `gen_cert` arguments against host variables
    pub fn from_args(vars: &Value, args: &Value) -> Result<Self, ActionError> {
        let root_key = non_empty_path(optional_string_var(vars, args, "root_key")?);
        let root_cert = non_empty_path(optional_string_var(vars, args, "root_cert")?);

        let validity = match optional_string_var(vars, args, "date")?.filter(|d| !d.is_empty()) {
            Some(date) => parse_duration(&date)
                .map_err(|e| ActionError::InvalidArgument(format!("\"date\" {}", e)))?,
            None => DEFAULT_SIGN_CERT_AFTER,
        };

        let policy = string_var(vars, args, "policy")
            .unwrap_or_default()
            .parse::<CertPolicy>()?;

        let sans = match string_slice_var(vars, args, "sans") {
            Ok(sans) => sans,
            Err(VariableError::Undefined(_)) => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let common_name = string_var(vars, args, "cn")
            .ok()
            .filter(|cn| !cn.is_empty())
            .ok_or_else(|| ActionError::InvalidArgument("\"cn\" in args should be string".to_string()))?;

        let out_key = string_var(vars, args, "out_key").ok().filter(|p| !p.is_empty());
        let out_cert = string_var(vars, args, "out_cert").ok().filter(|p| !p.is_empty());
        let (out_key, out_cert) = match (out_key, out_cert) {
            (Some(key), Some(cert)) => (PathBuf::from(key), PathBuf::from(cert)),
            _ => {
                return Err(ActionError::InvalidArgument(
                    "\"out_key\" or \"out_cert\" in args should be string".to_string(),
                ))
            }
        };

        let is_ca = match args.get("is_ca") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(_)) => match string_var(vars, args, "is_ca")?.trim() {
                "true" => true,
                "false" => false,
                other => {
                    return Err(ActionError::InvalidArgument(format!(
                        "\"is_ca\" should be bool, got \"{}\"",
                        other
                    )))
                }
            },
            Some(_) => {
                return Err(ActionError::InvalidArgument("\"is_ca\" should be bool".to_string()))
            }
        };

        let mut alt_names = AltNames::with_defaults();
        alt_names.append_sans(&sans, &common_name);

        Ok(Self {
            root_key,
            root_cert,
            validity,
            policy,
            is_ca,
            common_name,
            alt_names,
            out_key,
            out_cert,
        })
    }

    /// Reuse, or generate and write, the requested certificate
    pub fn issue(&self) -> Result<CertOutcome, ActionError> {
        let (key, cert) = match (&self.root_key, &self.root_cert) {
            (Some(root_key), Some(root_cert)) => {
                let parent = ParentCa::load(root_key, root_cert)?;
                if self.policy == CertPolicy::IfNotPresent {
                    match self.try_reuse(&parent) {
                        Reuse::Usable => {
                            info!("certificate {} is valid, skip", self.out_cert.display());
                            return Ok(CertOutcome::Reused);
                        }
                        Reuse::Absent(reason) => debug!("generating new certificate: {}", reason),
                        Reuse::Rejected(reason) => warn!(
                            "existing certificate {} cannot be reused: {}",
                            self.out_cert.display(),
                            reason
                        ),
                    }
                }
                let key = generate_key()?;
                let cert = self.signed_cert(&key, &parent)?;
                (key, cert)
            }
            _ => {
                let key = generate_key()?;
                let cert = self.self_signed_cert(&key)?;
                (key, cert)
            }
        };

        let wrote_key = x509::write_pem(&self.out_key, &key.serialize_pem(), KEY_FILE_MODE, self.policy)
            .map_err(|e| ActionError::certificate("failed to write key", e))?;
        let wrote_cert = x509::write_pem(&self.out_cert, &cert.pem(), CERT_FILE_MODE, self.policy)
            .map_err(|e| ActionError::certificate("failed to write certificate", e))?;

        if !wrote_key && !wrote_cert {
            warn!(
                "{} and {} already exist and policy IfNotPresent keeps them; use policy Always to replace them",
                self.out_key.display(),
                self.out_cert.display()
            );
            return Ok(CertOutcome::Retained);
        }
        Ok(CertOutcome::Written)
    }

    fn try_reuse(&self, parent: &ParentCa) -> Reuse {
        if let Err(e) = x509::load_key(&self.out_key) {
            return Reuse::Absent(format!("failed to load key: {}", e));
        }
        let chain = match x509::read_chain(&self.out_cert) {
            Ok(chain) => chain,
            Err(e) => return Reuse::Absent(format!("failed to load certificate: {}", e)),
        };

        match self.validate_existing(&chain, parent) {
            Ok(()) => Reuse::Usable,
            Err(reason) => Reuse::Rejected(reason),
        }
    }

    fn validate_existing(&self, chain: &[Pem], parent: &ParentCa) -> Result<(), String> {
        let certs = chain
            .iter()
            .map(x509::parse)
            .collect::<Result<Vec<_>, _>>()?;
        let root = x509::parse(&parent.chain[0])?;

        x509::validate_period(&certs[0], OffsetDateTime::now_utc().unix_timestamp())?;
        x509::verify_chain(&certs[0], &certs[1..], &root)?;
        x509::verify_alt_names(&certs[0], &self.alt_names)
    }

    fn base_params(&self, alt_names: &AltNames) -> Result<CertificateParams, ActionError> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, CERT_ORGANIZATION);
        dn.push(DnType::CommonName, self.common_name.clone());
        params.distinguished_name = dn;
        params.serial_number = Some(random_serial());

        for name in &alt_names.dns_names {
            let dns = Ia5String::try_from(name.clone())
                .map_err(|e| ActionError::certificate(format!("invalid DNS name {}", name), e))?;
            params.subject_alt_names.push(SanType::DnsName(dns));
        }
        for ip in &alt_names.ips {
            params.subject_alt_names.push(SanType::IpAddress(*ip));
        }

        if self.is_ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
                KeyUsagePurpose::KeyCertSign,
            ];
        } else {
            params.is_ca = IsCa::ExplicitNoCa;
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ];
        }
        Ok(params)
    }

    fn self_signed_cert(&self, key: &KeyPair) -> Result<Certificate, ActionError> {
        let alt_names = AltNames {
            dns_names: vec![self.common_name.clone()],
            ips: Vec::new(),
        };
        let mut params = self.base_params(&alt_names)?;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::KeyCertSign,
        ];

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + self.validity;

        params
            .self_signed(key)
            .map_err(|e| ActionError::certificate("failed to generate self-signed certificate", e))
    }

    fn signed_cert(&self, key: &KeyPair, parent: &ParentCa) -> Result<Certificate, ActionError> {
        let issuer = CertificateParams::from_ca_cert_pem(&parent.cert_pem)
            .and_then(|params| params.self_signed(&parent.key))
            .map_err(|e| ActionError::certificate("failed to load root certificate", e))?;

        let mut alt_names = self.alt_names.clone();
        alt_names.remove_duplicates();

        let mut params = self.base_params(&alt_names)?;
        params.not_before = parent.not_before;
        params.not_after = OffsetDateTime::now_utc() + self.validity;

        params
            .signed_by(key, &issuer, &parent.key)
            .map_err(|e| ActionError::certificate("failed to generate certificate", e))
    }
}

enum Reuse {
    Usable,
    /// Key or certificate missing or unreadable
    Absent(String),
    /// Present but expired, not chained to the root, or missing a SAN
    Rejected(String),
}

/// Loaded signing root
struct ParentCa {
    key: KeyPair,
    cert_pem: String,
    chain: Vec<Pem>,
    not_before: OffsetDateTime,
}

impl ParentCa {
    fn load(key_path: &Path, cert_path: &Path) -> Result<Self, ActionError> {
        let key = x509::load_key(key_path)
            .map_err(|e| ActionError::certificate("failed to load root key", e))?;
        let cert_pem = std::fs::read_to_string(cert_path)
            .map_err(|e| ActionError::certificate("failed to load root certificate", e))?;
        let chain = x509::read_chain(cert_path)
            .map_err(|e| ActionError::certificate("failed to load root certificate", e))?;
        let not_before = x509::parse(&chain[0])
            .map(|root| root.validity().not_before.to_datetime())
            .map_err(|e| ActionError::certificate("failed to load root certificate", e))?;

        Ok(Self {
            key,
            cert_pem,
            chain,
            not_before,
        })
    }
}

fn generate_key() -> Result<KeyPair, ActionError> {
    KeyPair::generate().map_err(|e| ActionError::certificate("failed to generate private key", e))
}

/// Positive serial in `[1, i64::MAX)`
fn random_serial() -> SerialNumber {
    let entropy = Uuid::new_v4().as_u128() ^ Uuid::new_v4().as_u128().rotate_left(64);
    let serial = (entropy as u64) % (i64::MAX as u64 - 1) + 1;
    SerialNumber::from_slice(&serial.to_be_bytes())
}

/// Issue a certificate on the orchestrating machine
#[derive(Debug, Clone)]
pub struct GenCert {
    args: Value,
}

impl GenCert {
    pub fn new(args: Value) -> Self {
        Self { args }
    }
}

#[async_trait]
impl Action for GenCert {
    fn name(&self) -> &str {
        "gen-cert"
    }

    async fn execute(&self, runtime: &HostRuntime) -> Result<String, ActionError> {
        let vars = runtime.host_vars()?;
        let request = CertRequest::from_args(&vars, &self.args)?;

        let outcome = tokio::task::spawn_blocking(move || request.issue())
            .await
            .map_err(|e| ActionError::certificate("certificate task failed", e))??;
        Ok(outcome.stdout().to_string())
    }
}
