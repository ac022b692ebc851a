//! End-to-end verification of signed login-token fixtures.
//!
//! The fixtures in `testdata/` are produced by `testdata/generate.py` and
//! chain to the test anchor in `testdata/anchor.pem`, not to the embedded
//! production anchor. The `prefixed_*` fixtures were canonicalized and
//! signed over libxml2's output.

use base64::Engine;
use chrono::{TimeZone, Utc};
use islogin::{ErrorKind, TrustAnchorSource, Verifier, VerifierConfig};

const ANCHOR: &str = include_str!("../../../testdata/anchor.pem");
const VALID: &str = include_str!("../../../testdata/valid.b64");
const EXPIRED: &str = include_str!("../../../testdata/expired.b64");
const NO_CONDITIONS: &str = include_str!("../../../testdata/no_conditions.b64");
const ROGUE_CHAIN: &str = include_str!("../../../testdata/rogue_chain.b64");
const WRONG_ISSUER: &str = include_str!("../../../testdata/wrong_issuer.b64");
const EXPIRED_CERT: &str = include_str!("../../../testdata/expired_cert.b64");
const NO_SKI: &str = include_str!("../../../testdata/no_ski.b64");
const PREFIXED_EXC: &str = include_str!("../../../testdata/prefixed_exc.b64");
const PREFIXED_INC: &str = include_str!("../../../testdata/prefixed_inc.b64");

const AUDIENCE: &str = "https://example.test";

fn config() -> VerifierConfig {
    VerifierConfig::new(AUDIENCE).with_trust_anchor(TrustAnchorSource::Pem(ANCHOR.into()))
}

fn verifier() -> Verifier {
    Verifier::new(config()).unwrap()
}

fn kind_of(verifier: &Verifier, token: &str) -> ErrorKind {
    verifier.verify(token).unwrap_err().kind()
}

/// Decode a fixture, edit its XML, and encode it again.
fn edit(token: &str, f: impl FnOnce(String) -> String) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    let xml = String::from_utf8(engine.decode(token.trim()).unwrap()).unwrap();
    engine.encode(f(xml))
}

#[test]
fn valid_token_yields_identity() {
    let identity = verifier().verify(VALID).unwrap();
    let claims = identity.claims();
    assert_eq!(identity.kennitala(), "0101302989");
    assert_eq!(identity.fullname(), "Gervimaður Ameríka");
    assert_eq!(claims.mobile, "7654321");
    assert_eq!(claims.ip, "127.0.0.1");
    assert_eq!(claims.user_agent, "Mozilla/5.0 (X11; Linux x86_64)");
    assert_eq!(claims.authentication_method, "Rafræn skilríki");
    assert_eq!(claims.auth_id, "9c1d5a40-7be2-4f5c-bb0e-0d1a2f3e4b5c");
    assert_eq!(claims.destination_ssn, "5206871229");
    assert_eq!(identity.destination(), "https://example.test/innskraning");
    assert_eq!(identity.audience(), AUDIENCE);
    assert_eq!(
        identity.conditions().not_before,
        Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
    );
}

#[test]
fn prefixed_pretty_printed_tokens_verify() {
    let verifier = verifier();
    for token in [PREFIXED_EXC, PREFIXED_INC] {
        let identity = verifier.verify(token).unwrap();
        let claims = identity.claims();
        assert_eq!(identity.kennitala(), "0101302989");
        assert_eq!(identity.fullname(), "Gervimaður Ameríka");
        assert_eq!(claims.mobile, "7654321");
        assert_eq!(claims.ip, "127.0.0.1");
        assert_eq!(claims.authentication_method, "Rafræn skilríki");
        assert_eq!(claims.auth_id, "9c1d5a40-7be2-4f5c-bb0e-0d1a2f3e4b5c");
        assert_eq!(claims.destination_ssn, "5206871229");
        assert_eq!(identity.destination(), "https://example.test/innskraning");
        assert_eq!(identity.audience(), AUDIENCE);
        assert_eq!(
            identity.conditions().not_on_or_after,
            Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap())
        );
    }
}

#[test]
fn prefixed_tokens_survive_non_canonical_edits() {
    let verifier = verifier();
    for token in [PREFIXED_EXC, PREFIXED_INC] {
        let token = edit(token, |xml| {
            xml.replace(
                r#"NotOnOrAfter="2099-01-01T00:00:00Z" NotBefore="2020-01-01T00:00:00Z""#,
                r#"NotBefore="2020-01-01T00:00:00Z"   NotOnOrAfter='2099-01-01T00:00:00Z'"#,
            )
            .replace("FriendlyName='Kennitala'", r#"FriendlyName="Kennitala""#)
            .replace("a &amp; b &gt; c &#65;", "a &#38; b > c A")
        });
        assert!(verifier.verify(token).is_ok());
    }
}

#[test]
fn prefixed_tokens_detect_tampering() {
    let verifier = verifier();
    for token in [PREFIXED_EXC, PREFIXED_INC] {
        let token = edit(token, |xml| xml.replace("a &amp; b &gt; c", "a &amp; b &lt; c"));
        assert_eq!(kind_of(&verifier, &token), ErrorKind::SignatureInvalid);
    }
    // Declarations the exclusive form leaves out are still covered by the
    // inclusive one.
    let unused = r#" xmlns:xs="http://www.w3.org/2001/XMLSchema""#;
    let exc = edit(PREFIXED_EXC, |xml| xml.replacen(unused, "", 1));
    let inc = edit(PREFIXED_INC, |xml| xml.replacen(unused, "", 1));
    assert!(verifier.verify(exc).is_ok());
    assert_eq!(kind_of(&verifier, &inc), ErrorKind::SignatureInvalid);
}

#[test]
fn verification_is_deterministic() {
    let verifier = verifier();
    assert_eq!(verifier.verify(VALID).unwrap(), verifier.verify(VALID).unwrap());
    assert_eq!(kind_of(&verifier, EXPIRED), kind_of(&verifier, EXPIRED));
}

#[test]
fn line_wrapped_token_is_accepted() {
    let wrapped: String = VALID
        .trim()
        .as_bytes()
        .chunks(64)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(verifier().verify(wrapped).is_ok());
}

#[test]
fn garbage_is_malformed() {
    let verifier = verifier();
    assert_eq!(kind_of(&verifier, "!!! not a token !!!"), ErrorKind::MalformedToken);
    assert_eq!(kind_of(&verifier, ""), ErrorKind::MalformedToken);
    let not_saml = base64::engine::general_purpose::STANDARD.encode("<html><body/></html>");
    assert_eq!(kind_of(&verifier, &not_saml), ErrorKind::MalformedToken);
}

#[test]
fn tampered_claim_breaks_signature() {
    let token = edit(VALID, |xml| xml.replace("0101302989</AttributeValue>", "1203894569</AttributeValue>"));
    assert_eq!(kind_of(&verifier(), &token), ErrorKind::SignatureInvalid);
}

#[test]
fn tampered_audience_breaks_signature() {
    let token = edit(VALID, |xml| xml.replace("https://example.test<", "https://attacker.test<"));
    let verifier = Verifier::new(VerifierConfig::new("https://attacker.test").with_trust_anchor(
        TrustAnchorSource::Pem(ANCHOR.into()),
    ))
    .unwrap();
    assert_eq!(kind_of(&verifier, &token), ErrorKind::SignatureInvalid);
}

#[test]
fn swapped_certificate_is_rejected() {
    // Embed the rogue signer certificate in an otherwise valid token: the
    // signature no longer verifies under the embedded key.
    let rogue_pem = include_str!("../../../testdata/rogue_signer.pem");
    let rogue_body: String = rogue_pem
        .lines()
        .filter(|l| !l.starts_with("-----"))
        .collect();
    let token = edit(VALID, |xml| {
        let start = xml.find("<X509Certificate>").unwrap() + "<X509Certificate>".len();
        let end = xml.find("</X509Certificate>").unwrap();
        format!("{}{}{}", &xml[..start], rogue_body, &xml[end..])
    });
    assert_eq!(kind_of(&verifier(), &token), ErrorKind::SignatureInvalid);
}

#[test]
fn untrusted_signers_are_rejected() {
    let verifier = verifier();
    for token in [ROGUE_CHAIN, WRONG_ISSUER, EXPIRED_CERT, NO_SKI] {
        assert_eq!(kind_of(&verifier, token), ErrorKind::UntrustedSigner);
    }
}

#[test]
fn rogue_chain_reason_names_the_anchor() {
    let err = verifier().verify(ROGUE_CHAIN).unwrap_err();
    assert!(err.reason().contains("trust anchor"), "{}", err.reason());
}

#[test]
fn embedded_anchor_does_not_trust_test_signer() {
    let verifier = Verifier::new(VerifierConfig::new(AUDIENCE)).unwrap();
    assert_eq!(verifier.trust_store().len(), 1);
    assert_eq!(kind_of(&verifier, VALID), ErrorKind::UntrustedSigner);
}

#[test]
fn signer_validity_is_checked_at_verification_time() {
    let before_signer = Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap();
    let err = verifier().verify_at(VALID, before_signer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UntrustedSigner);
}

#[test]
fn missing_conditions_is_structural() {
    assert_eq!(kind_of(&verifier(), NO_CONDITIONS), ErrorKind::AssertionStructure);
}

#[test]
fn expired_assertion_is_rejected() {
    assert_eq!(kind_of(&verifier(), EXPIRED), ErrorKind::TemporalValidity);
}

#[test]
fn expired_assertion_inside_its_window() {
    let inside = Utc.with_ymd_and_hms(2021, 3, 4, 10, 2, 0).unwrap();
    let identity = verifier().verify_at(EXPIRED, inside).unwrap();
    assert_eq!(identity.kennitala(), "0101302989");

    let at_end = Utc.with_ymd_and_hms(2021, 3, 4, 10, 5, 0).unwrap();
    let err = verifier().verify_at(EXPIRED, at_end).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemporalValidity);
}

#[test]
fn disabled_window_accepts_expired_assertion() {
    let verifier = Verifier::new(config().with_temporal_window(false)).unwrap();
    assert!(verifier.verify(EXPIRED).is_ok());
}

#[test]
fn audience_must_match() {
    let verifier = Verifier::new(
        VerifierConfig::new("https://example.test/")
            .with_trust_anchor(TrustAnchorSource::Pem(ANCHOR.into())),
    )
    .unwrap();
    assert_eq!(kind_of(&verifier, VALID), ErrorKind::AudienceMismatch);
}

#[test]
fn audience_must_be_configured() {
    let mut config = config();
    config.expected_audience = None;
    let verifier = Verifier::new(config).unwrap();
    assert_eq!(kind_of(&verifier, VALID), ErrorKind::AudienceMisconfigured);
}

#[test]
fn destination_policy() {
    let mut config = config();
    config.expected_destination = Some("https://example.test/innskraning".into());
    config.expected_destination_ssn = Some("5206871229".into());
    assert!(Verifier::new(config.clone()).unwrap().verify(VALID).is_ok());

    config.expected_destination = Some("https://example.test/other".into());
    let verifier = Verifier::new(config).unwrap();
    assert_eq!(kind_of(&verifier, VALID), ErrorKind::DestinationMismatch);
}

#[test]
fn config_from_json_file() {
    let dir = std::env::temp_dir().join(format!("islogin-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let anchor = dir.join("anchor.pem");
    std::fs::write(&anchor, ANCHOR).unwrap();
    let config_path = dir.join("islogin.json");
    let json = serde_json::json!({
        "expected_audience": AUDIENCE,
        "trust_anchor": { "pem_file": anchor },
    });
    std::fs::write(&config_path, json.to_string()).unwrap();

    let verifier = Verifier::new(VerifierConfig::from_json_file(&config_path).unwrap()).unwrap();
    assert!(verifier.verify(VALID).is_ok());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn unreadable_anchor_fails_at_startup() {
    let config = VerifierConfig::new(AUDIENCE)
        .with_trust_anchor(TrustAnchorSource::PemFile("/nonexistent/anchor.pem".into()));
    let err = Verifier::new(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn verifier_is_shared_across_threads() {
    let verifier = verifier();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let verifier = verifier.clone();
            std::thread::spawn(move || verifier.verify(VALID).map(|id| id.kennitala().to_owned()))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), "0101302989");
    }
}

#[tokio::test]
async fn verify_async_matches_blocking() {
    let verifier = verifier();
    let identity = verifier.verify_async(VALID).await.unwrap();
    assert_eq!(identity, verifier.verify(VALID).unwrap());

    let err = verifier.verify_async(EXPIRED.as_bytes()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemporalValidity);
}
