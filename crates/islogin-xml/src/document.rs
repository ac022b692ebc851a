#![forbid(unsafe_code)]

//! Token decoding: base64 transport text to a validated assertion document.

use base64::Engine;
use islogin_core::{ns, Error};

/// A decoded login token.
///
/// Stores the decoded XML text verbatim. Signature verification runs over
/// these exact bytes, so the tree is never re-serialized; call
/// [`AssertionDocument::parse_doc`] for a `roxmltree::Document` borrowing
/// from the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionDocument {
    text: String,
}

impl AssertionDocument {
    /// Decode a base64 transport token and validate the root shape.
    ///
    /// ASCII whitespace anywhere in the token is ignored.
    pub fn decode(token: impl AsRef<[u8]>) -> Result<Self, Error> {
        let compact: Vec<u8> = token
            .as_ref()
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        if compact.is_empty() {
            return Err(Error::MalformedToken("token is empty".into()));
        }

        let bytes = decode_base64(&compact)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::MalformedToken(format!("token is not UTF-8: {e}")))?;
        Self::from_xml(text)
    }

    /// Parse already-decoded XML text and validate the root shape.
    pub fn from_xml(text: String) -> Result<Self, Error> {
        {
            let doc = roxmltree::Document::parse(&text)
                .map_err(|e| Error::MalformedToken(format!("cannot parse XML: {e}")))?;
            check_shape(&doc)?;
        }
        tracing::trace!(len = text.len(), "decoded assertion document");
        Ok(Self { text })
    }

    /// The decoded XML text, byte for byte.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parse the stored text into a temporary tree.
    ///
    /// The text was validated at construction, so this only fails if the
    /// document was tampered with in memory.
    pub fn parse_doc(&self) -> Result<roxmltree::Document<'_>, Error> {
        roxmltree::Document::parse(&self.text)
            .map_err(|e| Error::MalformedToken(format!("cannot parse XML: {e}")))
    }
}

fn decode_base64(data: &[u8]) -> Result<Vec<u8>, Error> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};

    STANDARD
        .decode(data)
        .or_else(|_| STANDARD_NO_PAD.decode(data))
        .or_else(|_| URL_SAFE.decode(data))
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .map_err(|e| Error::MalformedToken(format!("token is not base64: {e}")))
}

/// `Response` root with a `Signature` child and an `Assertion` child.
fn check_shape(doc: &roxmltree::Document<'_>) -> Result<(), Error> {
    let root = doc.root_element();
    if root.tag_name().name() != ns::node::RESPONSE {
        return Err(Error::MalformedToken(format!(
            "root element is <{}>, expected <{}>",
            root.tag_name().name(),
            ns::node::RESPONSE
        )));
    }
    if crate::find_child_element(root, ns::DSIG, ns::node::SIGNATURE).is_none() {
        return Err(Error::MalformedToken(
            "response has no XML-DSig <Signature> child".into(),
        ));
    }
    if crate::find_child_by_local_name(root, ns::node::ASSERTION).is_none() {
        return Err(Error::MalformedToken("response has no <Assertion> child".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use islogin_core::ErrorKind;

    const MINIMAL: &str = concat!(
        r#"<Response xmlns="urn:oasis:names:tc:SAML:2.0:protocol">"#,
        r#"<Signature xmlns="http://www.w3.org/2000/09/xmldsig#"/>"#,
        r#"<Assertion xmlns="urn:oasis:names:tc:SAML:2.0:assertion"/>"#,
        r#"</Response>"#
    );

    #[test]
    fn decodes_and_keeps_text_verbatim() {
        let token = STANDARD.encode(MINIMAL);
        let doc = AssertionDocument::decode(&token).unwrap();
        assert_eq!(doc.text(), MINIMAL);
        assert_eq!(doc.parse_doc().unwrap().root_element().tag_name().name(), "Response");
    }

    #[test]
    fn ignores_whitespace_and_line_wrapping() {
        let token = STANDARD.encode(MINIMAL);
        let wrapped: String = token
            .as_bytes()
            .chunks(20)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        let doc = AssertionDocument::decode(format!("  {wrapped}\n")).unwrap();
        assert_eq!(doc.text(), MINIMAL);
    }

    #[test]
    fn accepts_url_safe_alphabet() {
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(MINIMAL);
        assert!(AssertionDocument::decode(token).is_ok());
    }

    #[test]
    fn rejects_non_base64() {
        let err = AssertionDocument::decode("not base64 at all!").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedToken);
    }

    #[test]
    fn rejects_empty_token() {
        let err = AssertionDocument::decode(" \n ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedToken);
    }

    #[test]
    fn rejects_non_xml() {
        let err = AssertionDocument::decode(STANDARD.encode("{\"json\": true}")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedToken);
        assert!(err.reason().contains("XML"));
    }

    #[test]
    fn rejects_dtd() {
        let xml = format!("<!DOCTYPE Response [<!ENTITY x \"y\">]>{MINIMAL}");
        let err = AssertionDocument::decode(STANDARD.encode(xml)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedToken);
    }

    #[test]
    fn rejects_wrong_root() {
        let xml = MINIMAL.replace("Response", "LogoutResponse");
        let err = AssertionDocument::from_xml(xml).unwrap_err();
        assert!(err.reason().contains("LogoutResponse"));
    }

    #[test]
    fn rejects_signature_outside_dsig_namespace() {
        let xml = MINIMAL.replace("http://www.w3.org/2000/09/xmldsig#", "urn:not-dsig");
        let err = AssertionDocument::from_xml(xml).unwrap_err();
        assert!(err.reason().contains("Signature"));
    }

    #[test]
    fn rejects_missing_assertion() {
        let xml = MINIMAL.replace(
            r#"<Assertion xmlns="urn:oasis:names:tc:SAML:2.0:assertion"/>"#,
            "",
        );
        let err = AssertionDocument::from_xml(xml).unwrap_err();
        assert!(err.reason().contains("Assertion"));
    }
}
