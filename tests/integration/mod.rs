//! Integration test utilities and helpers
//!
//! Certificates are issued by a throwaway CA so that issuer and subject
//! names differ, the way real device certificates look.

use std::path::{Path, PathBuf};

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
};

use device_trust::Certificate;

mod config_test;
mod endpoint_test;
mod enrollment_test;
mod helper_test;
mod policy_test;

/// Issuer CN of the built-in endpoint verification selector.
pub const ENDPOINT_VERIFICATION: &str = "Google Endpoint Verification";

/// A test certificate authority.
pub struct TestCa {
    cert: rcgen::Certificate,
    key_pair: KeyPair,
}

impl TestCa {
    /// Create a self-signed CA named `cn`.
    pub fn new(cn: &str) -> Self {
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, cn);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let key_pair = KeyPair::generate().expect("CA key generation failed");
        let cert = params.self_signed(&key_pair).expect("CA self-signing failed");
        Self { cert, key_pair }
    }

    /// Issue a certificate for `subject` with the given extended key usages.
    pub fn issue(
        &self,
        subject: &[(DnType, &str)],
        usages: Vec<ExtendedKeyUsagePurpose>,
    ) -> Certificate {
        let mut params = CertificateParams::default();
        for (kind, value) in subject {
            params.distinguished_name.push(kind.clone(), *value);
        }
        params.extended_key_usages = usages;

        let key_pair = KeyPair::generate().expect("key generation failed");
        let cert = params
            .signed_by(&key_pair, &self.cert, &self.key_pair)
            .expect("signing failed");
        Certificate::from_der(cert.der()).expect("issued certificate must parse")
    }

    /// Issue a client authentication certificate with subject CN `cn`.
    pub fn client_cert(&self, cn: &str) -> Certificate {
        self.issue(
            &[(DnType::CommonName, cn)],
            vec![ExtendedKeyUsagePurpose::ClientAuth],
        )
    }
}

/// The certificate the endpoint verification extension installs.
pub fn endpoint_verification_cert() -> Certificate {
    TestCa::new(ENDPOINT_VERIFICATION).client_cert(ENDPOINT_VERIFICATION)
}

/// Write `certificate` as PEM into `dir`.
pub fn write_pem(dir: &Path, name: &str, certificate: &Certificate) -> PathBuf {
    use base64::prelude::*;

    let body = BASE64_STANDARD.encode(certificate.as_der());
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for line in body.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(line).expect("base64 is ASCII"));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");

    let path = dir.join(name);
    std::fs::write(&path, pem).expect("failed to write PEM");
    path
}
