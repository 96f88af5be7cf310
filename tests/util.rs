#![allow(dead_code)]

use localca::cert::extensions::{ExtendedKeyUsageOption, SanType};
use localca::cert::params::DistinguishedName;
use localca::issuer::{CertificateIssuer, CertifiedKey};
use localca::key::KeyAlgorithm;
use localca::profile::CertificateProfile;
use localca::signing::DigestAlgorithm;

pub fn generate_ca_cert() -> CertifiedKey {
    CertificateProfile::builder()
        .subject(DistinguishedName::parse("O=My CA,CN=myca.local").unwrap())
        .key_algorithm(KeyAlgorithm::EcdsaP256)
        .digest(DigestAlgorithm::Sha256)
        .is_ca(true)
        .validity_days(3650)
        .build()
        .self_signed(&CertificateIssuer::default())
        .unwrap()
}

pub fn generate_server_cert(ca: &CertifiedKey) -> CertifiedKey {
    CertificateProfile::builder()
        .subject(DistinguishedName::from_common_name("server.myca.local"))
        .subject_alt_names(vec![SanType::DnsName("server.myca.local".to_string())])
        .key_algorithm(KeyAlgorithm::EcdsaP256)
        .usages(vec![ExtendedKeyUsageOption::ServerAuth])
        .build()
        .signed_by(ca, &CertificateIssuer::default())
        .unwrap()
}
