//! Integration tests for URL patterns, selectors and the selection policy

use std::sync::OnceLock;

use proptest::prelude::*;
use url::Url;

use device_trust::policy::{InMemoryPolicySource, PolicyScope, PolicySource};
use device_trust::{Certificate, CertificateSelectionPolicy, CertificateSelector, UrlMatchPattern};

use super::TestCa;

const EXAMPLE_ORG_SELECTOR: &str =
    r#"{"pattern":"https://[*.]example.org","filter":{"SUBJECT":{"CN":"example.org"}}}"#;

#[test]
fn test_example_org_policy() {
    let machine = InMemoryPolicySource::new(PolicyScope::Machine).with_value("1", EXAMPLE_ORG_SELECTOR);
    let policy = CertificateSelectionPolicy::from_sources([&machine as &dyn PolicySource]);
    let cert = TestCa::new("Example CA").client_cert("example.org");

    assert!(policy.is_applicable(&Url::parse("https://www.example.org").unwrap(), &cert));
    assert!(!policy.is_applicable(&Url::parse("https://www.example.com").unwrap(), &cert));
}

#[test]
fn test_policy_skips_non_numeric_names() {
    let source = InMemoryPolicySource::new(PolicyScope::Machine)
        .with_value("1", EXAMPLE_ORG_SELECTOR)
        .with_value("2", r#"{"pattern":"https://example.com"}"#)
        .with_value("junk", r#"{"pattern":"*"}"#)
        .with_value("-3", r#"{"pattern":"*"}"#);

    let policy = CertificateSelectionPolicy::from_sources([&source as &dyn PolicySource]);
    assert_eq!(policy.len(), 2);
    let indexes: Vec<u64> = policy.entries().iter().map(|e| e.index).collect();
    assert_eq!(indexes, vec![1, 2]);
}

#[test]
fn test_policy_keeps_machine_and_user_entries() {
    let machine = InMemoryPolicySource::new(PolicyScope::Machine).with_value("1", EXAMPLE_ORG_SELECTOR);
    let user = InMemoryPolicySource::new(PolicyScope::User)
        .with_value("1", r#"{"pattern":"https://[*.]example.com"}"#)
        .with_value("2", "not json");

    let policy = CertificateSelectionPolicy::from_sources([
        &machine as &dyn PolicySource,
        &user as &dyn PolicySource,
    ]);
    let scopes: Vec<PolicyScope> = policy.entries().iter().map(|e| e.scope).collect();
    assert_eq!(scopes, vec![PolicyScope::Machine, PolicyScope::User]);

    let cert = TestCa::new("Example CA").client_cert("anything");
    assert!(policy.is_applicable(&Url::parse("https://a.example.com/").unwrap(), &cert));
}

#[test]
fn test_pattern_examples() {
    let pattern = UrlMatchPattern::parse("https://[*.]example.com").unwrap();
    assert!(pattern.is_match("https://sub.sub.EXAMPLE.com"));
    assert!(pattern.is_match("https://example.com/path"));
    assert!(!pattern.is_match("https://eeeexample.com"));
    assert!(!pattern.is_match("http://example.com"));

    let any = UrlMatchPattern::parse("*").unwrap();
    assert!(any.is_match("http://localhost:8080/"));
    assert!(!any.is_match("file:///etc/hosts"));
}

fn device_cert() -> &'static Certificate {
    static CERT: OnceLock<Certificate> = OnceLock::new();
    CERT.get_or_init(|| TestCa::new("Example CA").client_cert("device"))
}

fn host_label() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,10}"
}

proptest! {
    #[test]
    fn prop_wildcard_matches_any_http_url(
        scheme in prop_oneof![Just("http"), Just("https")],
        labels in proptest::collection::vec(host_label(), 1..4),
        port in proptest::option::of(1u16..65535),
        path in "(/[a-z0-9]{0,8}){0,3}",
    ) {
        let authority = match port {
            Some(port) => format!("{}:{}", labels.join("."), port),
            None => labels.join("."),
        };
        let url = format!("{}://{}{}", scheme, authority, path);
        prop_assert!(UrlMatchPattern::any().is_match(&url), "{}", url);
    }

    #[test]
    fn prop_selector_never_matches_outside_pattern(
        pattern_domain in host_label(),
        url_labels in proptest::collection::vec(host_label(), 1..3),
        tld in prop_oneof![Just("org"), Just("com")],
    ) {
        let pattern = format!("https://[*.]{}.org", pattern_domain);
        let selector = CertificateSelector::try_parse(&format!(r#"{{"pattern":"{}"}}"#, pattern)).unwrap();
        let url = Url::parse(&format!("https://{}.{}/", url_labels.join("."), tld)).unwrap();

        let pattern_matches = UrlMatchPattern::parse(&pattern).unwrap().is_match_url(&url);
        prop_assert_eq!(selector.is_match_certificate(&url, device_cert()), pattern_matches);
    }
}
