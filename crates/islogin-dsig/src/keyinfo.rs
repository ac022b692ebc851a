#![forbid(unsafe_code)]

//! Signer certificate from `<KeyInfo>`.

use base64::Engine;
use islogin_core::{ns, Error};
use islogin_x509::SignerCertificate;

/// Read the single `KeyInfo/X509Data/X509Certificate` of `signature`.
pub fn signer_certificate(signature: roxmltree::Node<'_, '_>) -> Result<SignerCertificate, Error> {
    let key_info = islogin_xml::find_child_element(signature, ns::DSIG, ns::node::KEY_INFO)
        .ok_or_else(|| Error::CertificateMalformed("signature has no KeyInfo".into()))?;

    let certs: Vec<_> = islogin_xml::find_child_elements(key_info, ns::DSIG, ns::node::X509_DATA)
        .into_iter()
        .flat_map(|data| islogin_xml::find_child_elements(data, ns::DSIG, ns::node::X509_CERTIFICATE))
        .collect();
    let cert_node = match certs.as_slice() {
        [one] => *one,
        [] => return Err(Error::CertificateMalformed("KeyInfo has no X509Certificate".into())),
        many => {
            return Err(Error::CertificateMalformed(format!(
                "KeyInfo has {} certificates, expected one",
                many.len()
            )))
        }
    };

    let der = base64::engine::general_purpose::STANDARD
        .decode(islogin_xml::compact_text(cert_node))
        .map_err(|e| Error::CertificateMalformed(format!("X509Certificate is not base64: {e}")))?;
    let cert = SignerCertificate::from_der(&der)?;
    tracing::trace!(subject = %cert.subject(), "embedded signer certificate");
    Ok(cert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use islogin_core::ErrorKind;

    fn key_info(inner: &str) -> String {
        format!(r#"<Signature xmlns="http://www.w3.org/2000/09/xmldsig#"><KeyInfo>{inner}</KeyInfo></Signature>"#)
    }

    fn read(xml: &str) -> Result<SignerCertificate, Error> {
        let doc = roxmltree::Document::parse(xml).unwrap();
        signer_certificate(doc.root_element())
    }

    #[test]
    fn reads_wrapped_certificate() {
        let pem = include_str!("../../../testdata/signer.pem");
        let body: String = pem.lines().filter(|l| !l.starts_with("-----")).collect::<Vec<_>>().join("\n");
        let xml = key_info(&format!("<X509Data><X509Certificate>\n{body}\n</X509Certificate></X509Data>"));
        let cert = read(&xml).unwrap();
        assert_eq!(cert.subject_serial_number().as_deref(), Some("6503760649"));
    }

    #[test]
    fn missing_certificate() {
        let err = read(&key_info("<KeyName>idp</KeyName>")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CertificateMalformed);
    }

    #[test]
    fn bad_base64_and_bad_der() {
        let err = read(&key_info("<X509Data><X509Certificate>***</X509Certificate></X509Data>")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CertificateMalformed);
        let err = read(&key_info("<X509Data><X509Certificate>QUJDRA==</X509Certificate></X509Data>")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CertificateMalformed);
    }
}
