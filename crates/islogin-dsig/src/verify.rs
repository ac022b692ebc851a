#![forbid(unsafe_code)]

//! XML-DSig verification of a login token.
//!
//! Processing order:
//! 1. Locate the one `<Signature>` child of the root
//! 2. Read the signer certificate from `<KeyInfo>`
//! 3. Read `<SignedInfo>`: CanonicalizationMethod, SignatureMethod
//! 4. Check the single `<Reference>`: it must cover the whole root element
//! 5. Run its transforms, digest, compare
//! 6. Canonicalize `<SignedInfo>` and verify `<SignatureValue>`
//!
//! The certificate is only used as key material here. Whether it may
//! speak for the identity provider is decided afterwards by the trust
//! validator.

use base64::Engine;
use islogin_c14n::C14nMode;
use islogin_core::{ns, Error};
use islogin_crypto::{digest, SignatureMethod};
use islogin_x509::SignerCertificate;
use islogin_xml::{find_child_element, find_child_elements, AssertionDocument, NodeSet};

use crate::keyinfo;
use crate::transform::{Transform, TransformData};

/// Verify the enveloped signature of `document`.
///
/// Returns the embedded signer certificate on success. Trust in that
/// certificate is not established here.
pub fn verify_signature(document: &AssertionDocument) -> Result<SignerCertificate, Error> {
    let doc = document.parse_doc()?;
    let root = doc.root_element();

    let signatures = find_child_elements(root, ns::DSIG, ns::node::SIGNATURE);
    let signature = match signatures.as_slice() {
        [one] => *one,
        other => {
            return Err(Error::SignatureInvalid(format!(
                "expected one Signature under the root element, found {}",
                other.len()
            )))
        }
    };

    let cert = keyinfo::signer_certificate(signature)?;
    let key = cert.public_key()?;

    let signed_info = required(signature, ns::node::SIGNED_INFO)?;
    let c14n_method = required(signed_info, ns::node::CANONICALIZATION_METHOD)?;
    let c14n_uri = algorithm_of(c14n_method)?;
    let c14n_mode = C14nMode::from_uri(c14n_uri).ok_or_else(|| {
        Error::SignatureInvalid(format!("unsupported canonicalization: {c14n_uri}"))
    })?;
    let method = SignatureMethod::from_uri(algorithm_of(required(
        signed_info,
        ns::node::SIGNATURE_METHOD,
    )?)?)?;
    tracing::debug!(c14n = c14n_uri, ?method, "reading SignedInfo");

    let references = find_child_elements(signed_info, ns::DSIG, ns::node::REFERENCE);
    let reference = match references.as_slice() {
        [one] => *one,
        other => {
            return Err(Error::SignatureInvalid(format!(
                "expected one Reference, found {}",
                other.len()
            )))
        }
    };
    verify_reference(&doc, signature, reference)?;

    let signed_info_set = if c14n_mode.with_comments() {
        NodeSet::tree_with_comments(signed_info)
    } else {
        NodeSet::tree_without_comments(signed_info)
    };
    let canonical_signed_info = islogin_c14n::canonicalize(
        &doc,
        c14n_mode,
        Some(&signed_info_set),
        &crate::transform::inclusive_prefixes(c14n_method),
    )?;

    let signature_value = decode_base64(required(signature, ns::node::SIGNATURE_VALUE)?, "SignatureValue")?;
    method.verify(&key, &canonical_signed_info, &signature_value)?;

    tracing::debug!(signer = %cert.subject(), "signature value verified");
    Ok(cert)
}

/// Check the reference digest.
///
/// The reference must select the root element, either as the whole
/// document (`URI=""`) or by its ID, so the signed content is exactly the
/// content the extractor reads afterwards.
fn verify_reference(
    doc: &roxmltree::Document<'_>,
    signature: roxmltree::Node<'_, '_>,
    reference: roxmltree::Node<'_, '_>,
) -> Result<(), Error> {
    let uri = reference.attribute(ns::attr::URI).unwrap_or("");
    let root = doc.root_element();
    let initial = if uri.is_empty() {
        NodeSet::document_without_comments(doc)
    } else {
        let id = uri.strip_prefix('#').ok_or_else(|| {
            Error::SignatureInvalid(format!("reference URI {uri:?} is not a same-document reference"))
        })?;
        resolve_root_id(doc, id)?;
        NodeSet::tree_without_comments(root)
    };

    let mut data = TransformData::Nodes(initial);
    if let Some(transforms) = find_child_element(reference, ns::DSIG, ns::node::TRANSFORMS) {
        for node in find_child_elements(transforms, ns::DSIG, ns::node::TRANSFORM) {
            let transform = Transform::from_node(node)?;
            tracing::trace!(transform = transform.uri(), "applying transform");
            data = transform.apply(doc, signature, data)?;
        }
    }
    let octets = data.into_octets(doc)?;

    let digest_uri = algorithm_of(required(reference, ns::node::DIGEST_METHOD)?)?;
    let expected = decode_base64(required(reference, ns::node::DIGEST_VALUE)?, "DigestValue")?;
    let computed = digest::digest(digest_uri, &octets)?;
    if !digest::digests_equal(&computed, &expected) {
        return Err(Error::SignatureInvalid(format!(
            "digest of reference {uri:?} does not match"
        )));
    }
    Ok(())
}

/// `id` must belong to the root element and to no other element.
fn resolve_root_id(doc: &roxmltree::Document<'_>, id: &str) -> Result<(), Error> {
    let has_id = |node: &roxmltree::Node<'_, '_>| {
        ns::attr::ID_ATTRS
            .iter()
            .any(|name| node.attribute(*name) == Some(id))
    };
    let holders: Vec<_> = doc.descendants().filter(|n| n.is_element() && has_id(n)).collect();
    match holders.as_slice() {
        [one] if *one == doc.root_element() => Ok(()),
        [] => Err(Error::SignatureInvalid(format!("reference target {id:?} not found"))),
        [_] => Err(Error::SignatureInvalid(format!(
            "reference target {id:?} is not the root element"
        ))),
        _ => Err(Error::SignatureInvalid(format!("ID {id:?} is not unique"))),
    }
}

fn required<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Result<roxmltree::Node<'a, 'input>, Error> {
    find_child_element(parent, ns::DSIG, name)
        .ok_or_else(|| Error::SignatureInvalid(format!("missing {name} element")))
}

fn algorithm_of<'a>(node: roxmltree::Node<'a, '_>) -> Result<&'a str, Error> {
    node.attribute(ns::attr::ALGORITHM).ok_or_else(|| {
        Error::SignatureInvalid(format!(
            "{} without Algorithm attribute",
            node.tag_name().name()
        ))
    })
}

fn decode_base64(node: roxmltree::Node<'_, '_>, what: &str) -> Result<Vec<u8>, Error> {
    base64::engine::general_purpose::STANDARD
        .decode(islogin_xml::compact_text(node))
        .map_err(|e| Error::SignatureInvalid(format!("{what} is not base64: {e}")))
}
