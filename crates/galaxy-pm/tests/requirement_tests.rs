//! Integration tests for repository specs and requirements

use galaxy_pm::{
    Requirement, RequirementError, RequirementOp, RequirementScope, RequirementsFile,
    RepositorySpec, SpecError, SpecMatcher,
};
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

fn spec(s: &str) -> RepositorySpec {
    s.parse().unwrap()
}

#[test]
fn test_spec_string_round_trip() {
    let triples = [
        ("alikins", "collection_inspect", "1.0.0"),
        ("greetings_namespace", "hello", "11.11.11"),
        ("some_namespace", "some_name", "1.2.3-rc.1+build.5"),
        ("ns", "n", "0.0.1-alpha"),
    ];

    for (namespace, name, version) in triples {
        let original = RepositorySpec::new(namespace, name, Some(version)).unwrap();
        let parsed: RepositorySpec = original.to_string().parse().unwrap();

        assert_eq!(parsed, original);
        assert_eq!(parsed.namespace(), namespace);
        assert_eq!(parsed.name(), name);
        assert_eq!(parsed.version(), Some(version));
    }
}

#[test]
fn test_unversioned_spec_round_trip() {
    let original = RepositorySpec::new("ns", "name", None).unwrap();
    assert_eq!(original.to_string(), "ns.name");
    assert_eq!(original.to_string().parse::<RepositorySpec>().unwrap(), original);
}

#[test]
fn test_specs_as_set_members() {
    let mut set = HashSet::new();
    set.insert(spec("ns.a,1.0.0"));
    set.insert(spec("ns.a,v1.0.0"));
    set.insert(spec("ns.a,1.0.1"));
    set.insert(spec("ns.a"));

    assert_eq!(set.len(), 3);
}

#[test]
fn test_requirement_string_form() {
    let requester = spec("alikins.a,1.0.0");
    let required = spec("testing.pkgb,2.0.0");
    let req = Requirement::new(required)
        .with_requester(requester.clone())
        .with_op(RequirementOp::Exact);

    assert_eq!(req.to_string(), format!("{}->testing.pkgb=2.0.0", requester));
    assert_eq!(req.repository_spec(), Some(&requester));
    assert!(!req.is_top_level());
}

#[test]
fn test_runtime_scope_is_carried() {
    let req = Requirement::new(spec("testing.role_dep,1.0.0"))
        .with_requester(spec("alikins.a,1.0.0"))
        .with_scope(RequirementScope::Runtime);

    assert_eq!(req.scope(), RequirementScope::Runtime);
    assert_eq!(req.scope().to_string(), "RUNTIME");
}

#[test]
fn test_requirements_are_values() {
    let a = Requirement::new(spec("testing.pkgb,2.0.0"));
    let b = Requirement::new(spec("testing.pkgb,2.0.0"));
    let c = Requirement::new(spec("testing.pkgb,2.0.0")).with_scope(RequirementScope::Runtime);

    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_exact_matcher_through_trait_object() {
    let matchers: Vec<Box<dyn SpecMatcher>> = vec![
        Box::new(Requirement::new(spec("testing.pkgb,2.0.0"))),
        Box::new(Requirement::new(spec("testing.pkgb"))),
    ];

    let candidate = spec("testing.pkgb,2.0.0");
    assert!(matchers.iter().all(|m| m.matches(&candidate).unwrap()));

    let other = spec("testing.pkgb,2.1.0");
    let results: Vec<bool> = matchers.iter().map(|m| m.matches(&other).unwrap()).collect();
    assert_eq!(results, vec![false, true]);
}

#[test]
fn test_matcher_reports_bad_versions() {
    let req = Requirement::new(spec("testing.pkgb,2.0"));
    assert!(matches!(
        req.matches(&spec("testing.pkgb,2.0.0")),
        Err(SpecError::VersionParse { .. })
    ));
}

#[test]
fn test_requirements_file_from_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("requirements.toml");
    fs::write(
        &path,
        r#"
# from galaxy
[[requirements]]
src = "yatesr.timezone"

# overriding the name and pinning a tag
[[requirements]]
src = "https://github.com/bennojoy/nginx"
version = "master"
name = "nginx_role"

[[requirements]]
src = "git@gitlab.company.com:mygroup/ansible-base.git"
scm = "git"
version = "0.1.0"
"#,
    )
    .unwrap();

    let file = RequirementsFile::from_file(&path).unwrap();
    let reqs = file.to_requirements().unwrap();

    let labels: Vec<String> = reqs.iter().map(|r| r.requirement_spec().label()).collect();
    assert_eq!(
        labels,
        vec!["yatesr.timezone", "bennojoy.nginx_role", "mygroup.ansible_base"]
    );
    assert_eq!(reqs[2].requirement_spec().version(), Some("0.1.0"));
}

#[test]
fn test_requirements_file_errors() {
    assert!(matches!(
        RequirementsFile::from_str("[[requirements]]\nversion = \"1.0.0\"\n"),
        Err(RequirementError::ParseError(_))
    ));

    let file = RequirementsFile::from_str("[[requirements]]\nsrc = \"no_dot\"\n").unwrap();
    assert!(matches!(
        file.to_requirements(),
        Err(RequirementError::Spec(SpecError::InvalidLabel(_)))
    ));
}
