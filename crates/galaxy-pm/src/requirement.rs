//! Requirements: dependency edges between repository specs
//!
//! A [`Requirement`] states that a requester (or the user, for top-level requirements) needs a
//! repository matching a spec. Matching goes through [`RequirementOp`], which only knows exact
//! matches today; range operators slot in as new variants without changing `Requirement`.

use crate::repository_spec::{RepositorySpec, ScmKind, SpecError, SpecSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while building requirements
#[derive(Debug, Error)]
pub enum RequirementError {
    /// Spec could not be built
    #[error("Invalid repository spec: {0}")]
    Spec(#[from] SpecError),

    /// Requirement `src` could not be interpreted
    #[error("Invalid requirement source '{src}': {reason}")]
    InvalidSource { src: String, reason: String },

    /// Unknown operator symbol
    #[error("Unknown requirement operator: {0}")]
    UnknownOp(String),

    /// Unknown scope name
    #[error("Unknown requirement scope: {0}")]
    UnknownScope(String),

    /// Failed to read requirements file
    #[error("Failed to read requirements file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse requirements file: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Requirement match operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RequirementOp {
    /// Same namespace and name; same version unless either side leaves it unset
    #[default]
    Exact,
}

impl RequirementOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            RequirementOp::Exact => "=",
        }
    }

    /// Check `candidate` against `required` under this operator
    pub fn matches(
        &self,
        required: &RepositorySpec,
        candidate: &RepositorySpec,
    ) -> Result<bool, SpecError> {
        match self {
            RequirementOp::Exact => required.matches(candidate),
        }
    }
}

impl fmt::Display for RequirementOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for RequirementOp {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(RequirementOp::Exact),
            other => Err(RequirementError::UnknownOp(other.to_string())),
        }
    }
}

/// When a requirement has to be satisfied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RequirementScope {
    /// Before the requester can be used
    #[default]
    Install,

    /// Lazily, when the requester actually runs (role dependencies)
    Runtime,
}

impl RequirementScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementScope::Install => "INSTALL",
            RequirementScope::Runtime => "RUNTIME",
        }
    }
}

impl fmt::Display for RequirementScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequirementScope {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSTALL" => Ok(RequirementScope::Install),
            "RUNTIME" => Ok(RequirementScope::Runtime),
            _ => Err(RequirementError::UnknownScope(s.to_string())),
        }
    }
}

/// Something that can decide whether a candidate spec is acceptable
pub trait SpecMatcher {
    fn matches(&self, candidate: &RepositorySpec) -> Result<bool, SpecError>;
}

/// A dependency edge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    requirement_spec: RepositorySpec,
    repository_spec: Option<RepositorySpec>,
    op: RequirementOp,
    scope: RequirementScope,
}

impl Requirement {
    /// Top-level requirement with the default operator and install scope
    pub fn new(requirement_spec: RepositorySpec) -> Self {
        Self {
            requirement_spec,
            repository_spec: None,
            op: RequirementOp::default(),
            scope: RequirementScope::default(),
        }
    }

    /// Set the requesting repository
    pub fn with_requester(mut self, repository_spec: RepositorySpec) -> Self {
        self.repository_spec = Some(repository_spec);
        self
    }

    pub fn with_op(mut self, op: RequirementOp) -> Self {
        self.op = op;
        self
    }

    pub fn with_scope(mut self, scope: RequirementScope) -> Self {
        self.scope = scope;
        self
    }

    /// What is needed
    pub fn requirement_spec(&self) -> &RepositorySpec {
        &self.requirement_spec
    }

    /// Who needs it; `None` for user-declared requirements
    pub fn repository_spec(&self) -> Option<&RepositorySpec> {
        self.repository_spec.as_ref()
    }

    pub fn op(&self) -> RequirementOp {
        self.op
    }

    pub fn scope(&self) -> RequirementScope {
        self.scope
    }

    pub fn is_top_level(&self) -> bool {
        self.repository_spec.is_none()
    }
}

impl SpecMatcher for Requirement {
    fn matches(&self, candidate: &RepositorySpec) -> Result<bool, SpecError> {
        self.op.matches(&self.requirement_spec, candidate)
    }
}

impl fmt::Display for Requirement {
    /// `{requester}->{label}{op}{version}`; a missing requester prints as `user`, a missing
    /// version as `*`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repository_spec {
            Some(ref requester) => write!(f, "{}", requester)?,
            None => f.write_str("user")?,
        }

        write!(
            f,
            "->{}{}{}",
            self.requirement_spec.label(),
            self.op,
            self.requirement_spec.version().unwrap_or("*")
        )
    }
}

/// One entry of a requirements file
///
/// ```toml
/// [[requirements]]
/// src = "alikins.collection_inspect"
/// version = "1.0.0"
///
/// [[requirements]]
/// src = "https://github.com/bennojoy/nginx"
/// version = "master"
/// name = "bennojoy.nginx_role"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementLine {
    /// Galaxy label (`ns.name` or `ns.name,version`), URL, or scp-style git locator
    pub src: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Name override: `ns.name`, or a bare name replacing the derived one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scm: Option<String>,
}

impl RequirementLine {
    /// Map this line to the spec it asks for
    pub fn to_repository_spec(&self) -> Result<RepositorySpec, RequirementError> {
        let src = self.src.trim();
        if src.is_empty() {
            return Err(self.invalid("empty source"));
        }

        let spec = if is_locator(src) {
            self.locator_spec(src)?
        } else {
            let spec: RepositorySpec = src.parse()?;
            match self.name.as_deref() {
                Some(name) => spec.with_name(name)?,
                None => spec,
            }
        };

        Ok(match self.version.as_deref() {
            Some(version) => spec.with_version(Some(version)),
            None => spec,
        })
    }

    /// Map this line to a requirement, optionally on behalf of `requester`
    pub fn to_requirement(
        &self,
        requester: Option<&RepositorySpec>,
    ) -> Result<Requirement, RequirementError> {
        let requirement = Requirement::new(self.to_repository_spec()?);
        Ok(match requester {
            Some(requester) => requirement.with_requester(requester.clone()),
            None => requirement,
        })
    }

    fn locator_spec(&self, src: &str) -> Result<RepositorySpec, RequirementError> {
        let scm = match self.scm.as_deref() {
            Some(hint) => Some(ScmKind::parse(hint).ok_or_else(|| {
                self.invalid(&format!("unsupported scm '{}'", hint))
            })?),
            None => guess_scm(src),
        };

        let url = src
            .strip_prefix("git+")
            .or_else(|| src.strip_prefix("hg+"))
            .unwrap_or(src);

        let source = match scm {
            Some(kind) => SpecSource::Scm {
                kind,
                url: url.to_string(),
            },
            None => SpecSource::Url {
                url: url.to_string(),
            },
        };

        let segments = self.path_segments(url)?;
        let derived = match segments.as_slice() {
            [.., namespace, repo] => Some((namespace.clone(), repo.clone())),
            _ => None,
        };

        let spec = match (self.name.as_deref(), derived) {
            (Some(name), _) if name.contains('.') => RepositorySpec::from_label(name, None)?,
            (Some(name), Some((namespace, _))) => RepositorySpec::new(&namespace, name, None)?,
            (None, Some((namespace, repo))) => RepositorySpec::new(&namespace, &repo, None)?,
            _ => return Err(self.invalid("cannot derive namespace and name from locator")),
        };

        Ok(spec.with_source(source))
    }

    /// Path segments of a locator, normalized into valid spec names
    fn path_segments(&self, url: &str) -> Result<Vec<String>, RequirementError> {
        let path = if let Some((_, path)) = url.strip_prefix("git@").and_then(|s| s.split_once(':'))
        {
            path.to_string()
        } else {
            let parsed = url::Url::parse(url).map_err(|e| self.invalid(&e.to_string()))?;
            parsed.path().to_string()
        };

        Ok(path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                let s = s.strip_suffix(".git").unwrap_or(s);
                let s = s.strip_suffix(".tar.gz").unwrap_or(s);
                s.replace(['-', '.'], "_")
            })
            .collect())
    }

    fn invalid(&self, reason: &str) -> RequirementError {
        RequirementError::InvalidSource {
            src: self.src.clone(),
            reason: reason.to_string(),
        }
    }
}

fn is_locator(src: &str) -> bool {
    src.contains("://") || src.starts_with("git@")
}

fn guess_scm(src: &str) -> Option<ScmKind> {
    if src.starts_with("git+") || src.starts_with("git@") || src.ends_with(".git") {
        Some(ScmKind::Git)
    } else if src.starts_with("hg+") {
        Some(ScmKind::Hg)
    } else {
        None
    }
}

/// A list of user requirements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementsFile {
    #[serde(default)]
    pub requirements: Vec<RequirementLine>,
}

impl RequirementsFile {
    /// Load a requirements file from disk
    pub fn from_file(path: &Path) -> Result<Self, RequirementError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a requirements file from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, RequirementError> {
        Ok(toml::from_str(content)?)
    }

    /// Top-level requirements for every line
    pub fn to_requirements(&self) -> Result<Vec<Requirement>, RequirementError> {
        self.requirements
            .iter()
            .map(|line| line.to_requirement(None))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> RepositorySpec {
        s.parse().unwrap()
    }

    fn line(src: &str) -> RequirementLine {
        RequirementLine {
            src: src.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let req = Requirement::new(spec("testing.pkgb,2.0.0"));
        assert_eq!(req.op(), RequirementOp::Exact);
        assert_eq!(req.scope(), RequirementScope::Install);
        assert!(req.is_top_level());
    }

    #[test]
    fn test_display() {
        let req = Requirement::new(spec("testing.pkgb,2.0.0")).with_requester(spec("alikins.a,1.0.0"));
        assert_eq!(req.to_string(), "alikins.a,1.0.0->testing.pkgb=2.0.0");

        let top = Requirement::new(spec("testing.pkgb"));
        assert_eq!(top.to_string(), "user->testing.pkgb=*");
    }

    #[test]
    fn test_op_and_scope_parsing() {
        assert_eq!("=".parse::<RequirementOp>().unwrap(), RequirementOp::Exact);
        assert_eq!("==".parse::<RequirementOp>().unwrap(), RequirementOp::Exact);
        assert!(matches!(
            ">=".parse::<RequirementOp>(),
            Err(RequirementError::UnknownOp(_))
        ));

        assert_eq!("runtime".parse::<RequirementScope>().unwrap(), RequirementScope::Runtime);
        assert_eq!(RequirementScope::Install.to_string(), "INSTALL");
        assert!("LATER".parse::<RequirementScope>().is_err());
    }

    #[test]
    fn test_matcher() {
        let req = Requirement::new(spec("testing.pkgb,2.0.0"));
        assert!(req.matches(&spec("testing.pkgb,2.0.0")).unwrap());
        assert!(!req.matches(&spec("testing.pkgb,2.0.1")).unwrap());
        assert!(!req.matches(&spec("testing.pkgc,2.0.0")).unwrap());

        let any = Requirement::new(spec("testing.pkgb"));
        assert!(any.matches(&spec("testing.pkgb,9.9.9")).unwrap());
    }

    #[test]
    fn test_label_line() {
        let mut l = line("yatesr.timezone");
        l.version = Some("1.0.0".to_string());
        let s = l.to_repository_spec().unwrap();
        assert_eq!(s, spec("yatesr.timezone,1.0.0"));
        assert_eq!(s.source(), &SpecSource::Galaxy);
    }

    #[test]
    fn test_github_line() {
        let s = line("https://github.com/bennojoy/nginx").to_repository_spec().unwrap();
        assert_eq!(s.label(), "bennojoy.nginx");
        assert!(matches!(s.source(), SpecSource::Url { .. }));
    }

    #[test]
    fn test_github_line_with_name_override() {
        let mut l = line("https://github.com/bennojoy/nginx");
        l.version = Some("master".to_string());
        l.name = Some("nginx_role".to_string());
        let s = l.to_repository_spec().unwrap();
        assert_eq!(s.label(), "bennojoy.nginx_role");
        assert_eq!(s.version(), Some("master"));
    }

    #[test]
    fn test_scm_lines() {
        let s = line("git+https://bitbucket.org/willthames/git-ansible-galaxy")
            .to_repository_spec()
            .unwrap();
        assert_eq!(s.label(), "willthames.git_ansible_galaxy");
        assert_eq!(
            s.source(),
            &SpecSource::Scm {
                kind: ScmKind::Git,
                url: "https://bitbucket.org/willthames/git-ansible-galaxy".to_string(),
            }
        );

        let mut l = line("git@gitlab.company.com:mygroup/ansible-base.git");
        l.scm = Some("git".to_string());
        let s = l.to_repository_spec().unwrap();
        assert_eq!(s.label(), "mygroup.ansible_base");

        let mut hg = line("https://bitbucket.org/willthames/hg-ansible-galaxy");
        hg.scm = Some("hg".to_string());
        let s = hg.to_repository_spec().unwrap();
        assert!(matches!(s.source(), SpecSource::Scm { kind: ScmKind::Hg, .. }));
    }

    #[test]
    fn test_bad_lines() {
        assert!(matches!(
            line("").to_repository_spec(),
            Err(RequirementError::InvalidSource { .. })
        ));
        assert!(matches!(
            line("https://example.com/").to_repository_spec(),
            Err(RequirementError::InvalidSource { .. })
        ));

        let mut l = line("https://example.com/a/b");
        l.scm = Some("svn".to_string());
        assert!(matches!(
            l.to_repository_spec(),
            Err(RequirementError::InvalidSource { .. })
        ));
    }

    #[test]
    fn test_requirements_file() {
        let content = r#"
[[requirements]]
src = "alikins.collection_inspect"
version = "1.0.0"

[[requirements]]
src = "https://github.com/bennojoy/nginx"
"#;

        let file = RequirementsFile::from_str(content).unwrap();
        let reqs = file.to_requirements().unwrap();
        assert_eq!(reqs.len(), 2);
        assert!(reqs.iter().all(Requirement::is_top_level));
        assert_eq!(reqs[0].to_string(), "user->alikins.collection_inspect=1.0.0");
    }
}
