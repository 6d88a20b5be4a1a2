//! Self-signed CA and webhook server certificate generation

use std::net::{IpAddr, Ipv4Addr};

use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use tracing::{debug, info};

use super::CertificateBundle;
use crate::{Error, Result};

/// Validity period for the CA certificate
pub const CA_VALIDITY_DAYS: i64 = 3650;

/// Validity period for the server certificate
pub const SERVER_VALIDITY_DAYS: i64 = 365;

/// Loopback address the webhook server also answers on
pub const LOOPBACK_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

const COMMON_NAME: &str = "127.0.0.1";
const ORGANIZATION: &str = "Canonical";

/// Name of the Service fronting the webhook server for an application
pub fn webhook_service_name(app_name: &str) -> String {
    format!("{}-webhook-server-service", app_name)
}

/// Short, namespace, `.svc`, `.svc.cluster` and fully-qualified names of a service
pub fn service_dns_names(service: &str, namespace: &str) -> Vec<String> {
    vec![
        service.to_string(),
        format!("{}.{}", service, namespace),
        format!("{}.{}.svc", service, namespace),
        format!("{}.{}.svc.cluster", service, namespace),
        format!("{}.{}.svc.cluster.local", service, namespace),
    ]
}

/// DNS SANs for the application service and its webhook service
pub fn subject_alt_names(app_name: &str, namespace: &str) -> Vec<String> {
    let mut names = service_dns_names(app_name, namespace);
    names.extend(service_dns_names(&webhook_service_name(app_name), namespace));
    names
}

/// Generate a fresh CA and a server certificate signed by it
///
/// Every call generates new key material.
pub fn generate(app_name: &str, namespace: &str) -> Result<CertificateBundle> {
    info!(app = app_name, namespace, "Generating webhook certificate authority");

    let ca_key = KeyPair::generate()
        .map_err(|e| Error::CertificateError(format!("failed to generate CA key: {}", e)))?;
    let ca_cert = ca_params()
        .self_signed(&ca_key)
        .map_err(|e| Error::CertificateError(format!("failed to create CA cert: {}", e)))?;
    let ca_cert_pem = ca_cert.pem();

    let sans = subject_alt_names(app_name, namespace);
    debug!(?sans, "Server certificate subject alternative names");

    let server_key = KeyPair::generate()
        .map_err(|e| Error::CertificateError(format!("failed to generate server key: {}", e)))?;

    let issuer = Issuer::from_ca_cert_pem(&ca_cert_pem, &ca_key)
        .map_err(|e| Error::CertificateError(format!("failed to create issuer: {}", e)))?;

    let server_cert = server_params(&sans)?
        .signed_by(&server_key, &issuer)
        .map_err(|e| Error::CertificateError(format!("failed to sign server cert: {}", e)))?;

    Ok(CertificateBundle {
        ca_cert: ca_cert_pem,
        server_cert: server_cert.pem(),
        server_key: server_key.serialize_pem(),
    })
}

/// (not_before, not_after) starting now
fn compute_validity(days: i64) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    (now, now + ::time::Duration::days(days))
}

fn ca_params() -> CertificateParams {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(COMMON_NAME.to_string()),
    );
    params.distinguished_name = dn;

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let (not_before, not_after) = compute_validity(CA_VALIDITY_DAYS);
    params.not_before = not_before;
    params.not_after = not_after;

    params
}

fn server_params(sans: &[String]) -> Result<CertificateParams> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, DnValue::Utf8String("GB".to_string()));
    for ty in [
        DnType::StateOrProvinceName,
        DnType::LocalityName,
        DnType::OrganizationName,
        DnType::OrganizationalUnitName,
    ] {
        dn.push(ty, DnValue::Utf8String(ORGANIZATION.to_string()));
    }
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(COMMON_NAME.to_string()),
    );
    params.distinguished_name = dn;

    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DataEncipherment,
        KeyUsagePurpose::DigitalSignature,
    ];
    // The webhook also presents this certificate as a client to the API server
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    params.use_authority_key_identifier_extension = true;

    let (not_before, not_after) = compute_validity(SERVER_VALIDITY_DAYS);
    params.not_before = not_before;
    params.not_after = not_after;

    let mut subject_alt_names = sans
        .iter()
        .map(|san| {
            Ia5String::try_from(san.clone())
                .map(SanType::DnsName)
                .map_err(|e| {
                    Error::CertificateError(format!("invalid DNS name '{}': {}", san, e))
                })
        })
        .collect::<Result<Vec<_>>>()?;
    subject_alt_names.push(SanType::IpAddress(LOOPBACK_IP));
    params.subject_alt_names = subject_alt_names;

    Ok(params)
}
