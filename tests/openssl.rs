mod util;

use localca::encoding::{self, Format};
use localca::issuer::CertificateIssuer;
use localca::profile::CertificateProfile;
use openssl::nid::Nid;
use openssl::x509::X509;

fn common_name(name: &openssl::x509::X509NameRef) -> String {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .unwrap()
        .data()
        .as_utf8()
        .unwrap()
        .to_string()
}

#[test]
fn test_openssl_crate_validate_cert() {
    let ca = util::generate_ca_cert();
    let server = util::generate_server_cert(&ca);

    let ca_x509 = X509::from_pem(ca.certificate().to_pem().unwrap().as_bytes())
        .expect("Failed to parse CA PEM");
    let x509 = X509::from_pem(server.certificate().to_pem().unwrap().as_bytes())
        .expect("Failed to parse PEM");

    assert_eq!(common_name(x509.subject_name()), "server.myca.local");
    assert_eq!(common_name(x509.issuer_name()), "myca.local");
    assert_eq!(x509.version(), 2, "X509 version should be 3 (0-based index)");

    let serial = x509.serial_number().to_bn().unwrap();
    assert!(!serial.is_negative());
    assert_eq!(serial.num_bytes(), 20);

    assert_eq!(
        x509.signature_algorithm().object().nid(),
        Nid::ECDSA_WITH_SHA256
    );

    let san = x509.subject_alt_names().expect("SAN present");
    let dns: Vec<&str> = san.iter().filter_map(|name| name.dnsname()).collect();
    assert_eq!(dns, vec!["server.myca.local"]);

    // OpenSSL verifies the signature with the issuer key.
    let ca_public = ca_x509.public_key().unwrap();
    assert!(x509.verify(&ca_public).unwrap());
    assert!(ca_x509.verify(&ca_public).unwrap());
}

#[test]
fn test_openssl_reads_localhost_files() {
    let certified = CertificateProfile::localhost()
        .self_signed(&CertificateIssuer::default())
        .unwrap();

    let cert_pem = encoding::encode_certificate(certified.certificate(), Format::Pem).unwrap();
    let x509 = X509::from_pem(&cert_pem).unwrap();
    assert_eq!(
        x509.signature_algorithm().object().nid(),
        Nid::SHA256WITHRSAENCRYPTION
    );
    assert!(x509.verify(&x509.public_key().unwrap()).unwrap());

    let subject: Vec<(Nid, String)> = x509
        .subject_name()
        .entries()
        .map(|entry| {
            (
                entry.object().nid(),
                entry.data().as_utf8().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        subject,
        vec![
            (Nid::COUNTRYNAME, "US".to_string()),
            (Nid::STATEORPROVINCENAME, "CA".to_string()),
            (Nid::LOCALITYNAME, "San Francisco".to_string()),
            (Nid::ORGANIZATIONNAME, "My Company".to_string()),
            (Nid::COMMONNAME, "localhost".to_string()),
        ]
    );

    let key_pem = encoding::encode_rsa_private_key_pkcs1(certified.key(), Format::Pem).unwrap();
    let rsa = openssl::rsa::Rsa::private_key_from_pem(&key_pem).unwrap();
    assert_eq!(rsa.size() * 8, 2048);
    assert_eq!(rsa.e().to_dec_str().unwrap().to_string(), "65537");
    let pkey = openssl::pkey::PKey::from_rsa(rsa).unwrap();
    assert!(x509.public_key().unwrap().public_eq(&pkey));
}
