//! Repository identity and version specs
//!
//! A [`RepositorySpec`] names a piece of content by namespace and name, optionally narrowed to a
//! single version. The same type describes both "what is required" and "what is installed".

use semver::Version;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while building or comparing specs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecError {
    /// Version string is not a valid semantic version
    #[error("Invalid version '{version}': {reason}")]
    VersionParse { version: String, reason: String },

    /// Label is not of the form namespace.name
    #[error("Invalid label '{0}': expected namespace.name")]
    InvalidLabel(String),

    /// Required field is empty
    #[error("Repository spec field '{0}' cannot be empty")]
    EmptyField(&'static str),

    /// Namespace or name contains characters outside [A-Za-z0-9_]
    #[error("Invalid {field} '{value}': only letters, digits and underscores are allowed")]
    InvalidName { field: &'static str, value: String },
}

/// Source control system named by a requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScmKind {
    Git,
    Hg,
}

impl ScmKind {
    /// Parse an scm hint ("git" or "hg")
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "git" => Some(ScmKind::Git),
            "hg" => Some(ScmKind::Hg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScmKind::Git => "git",
            ScmKind::Hg => "hg",
        }
    }
}

impl fmt::Display for ScmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a spec was located
///
/// Purely informational: sources never take part in equality or hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SpecSource {
    /// Galaxy server (default)
    #[default]
    Galaxy,

    /// Source control repository
    Scm { kind: ScmKind, url: String },

    /// Archive downloaded from a plain URL
    Url { url: String },

    /// Archive on the local filesystem
    LocalArchive { path: PathBuf },
}

/// Identity (namespace, name) plus optional version of a repository
///
/// Immutable once constructed. `with_*` methods return new values.
#[derive(Debug, Clone)]
pub struct RepositorySpec {
    namespace: String,
    name: String,
    version: Option<String>,
    source: SpecSource,
}

impl RepositorySpec {
    /// Create a new spec
    ///
    /// `version` of `None`, `""`, `"*"` or `"any"` leaves the spec unconstrained. The version
    /// string is kept as given and only parsed when a comparison needs it.
    ///
    /// # Example
    /// ```
    /// # use galaxy_pm::RepositorySpec;
    /// let spec = RepositorySpec::new("alikins", "collection_inspect", Some("1.0.0")).unwrap();
    /// assert_eq!(spec.label(), "alikins.collection_inspect");
    /// assert_eq!(spec.to_string(), "alikins.collection_inspect,1.0.0");
    /// ```
    pub fn new(namespace: &str, name: &str, version: Option<&str>) -> Result<Self, SpecError> {
        let namespace = validate_name("namespace", namespace)?;
        let name = validate_name("name", name)?;

        Ok(Self {
            namespace,
            name,
            version: normalize_version(version),
            source: SpecSource::Galaxy,
        })
    }

    /// Create a spec from a `namespace.name` label
    pub fn from_label(label: &str, version: Option<&str>) -> Result<Self, SpecError> {
        let (namespace, name) = label
            .trim()
            .split_once('.')
            .ok_or_else(|| SpecError::InvalidLabel(label.to_string()))?;

        if name.contains('.') {
            return Err(SpecError::InvalidLabel(label.to_string()));
        }

        Self::new(namespace, name, version)
    }

    /// Copy of this spec with a different version
    pub fn with_version(&self, version: Option<&str>) -> Self {
        Self {
            version: normalize_version(version),
            ..self.clone()
        }
    }

    /// Copy of this spec with a different name
    pub fn with_name(&self, name: &str) -> Result<Self, SpecError> {
        Ok(Self {
            name: validate_name("name", name)?,
            ..self.clone()
        })
    }

    /// Attach a source hint
    pub fn with_source(mut self, source: SpecSource) -> Self {
        self.source = source;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw version string, `None` when unconstrained
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn source(&self) -> &SpecSource {
        &self.source
    }

    /// Dotted `namespace.name` label
    pub fn label(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Parse the version, if one is set
    pub fn parsed_version(&self) -> Result<Option<Version>, SpecError> {
        self.version.as_deref().map(parse_version).transpose()
    }

    /// True if both specs name the same package (namespace and name)
    pub fn same_identity(&self, other: &RepositorySpec) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }

    /// Compare versions by semver precedence
    ///
    /// Returns `Ok(None)` when either side is unconstrained.
    pub fn compare_version(&self, other: &RepositorySpec) -> Result<Option<Ordering>, SpecError> {
        match (self.parsed_version()?, other.parsed_version()?) {
            (Some(a), Some(b)) => Ok(Some(cmp_precedence(&a, &b))),
            _ => Ok(None),
        }
    }

    /// Check whether `candidate` satisfies this spec
    ///
    /// Identity must match exactly. An unset version on either side matches any version.
    pub fn matches(&self, candidate: &RepositorySpec) -> Result<bool, SpecError> {
        if !self.same_identity(candidate) {
            return Ok(false);
        }

        Ok(match self.compare_version(candidate)? {
            Some(ord) => ord == Ordering::Equal,
            None => true,
        })
    }
}

impl PartialEq for RepositorySpec {
    fn eq(&self, other: &Self) -> bool {
        if !self.same_identity(other) {
            return false;
        }

        match (&self.version, &other.version) {
            (None, None) => true,
            (Some(a), Some(b)) => match (parse_version(a), parse_version(b)) {
                (Ok(va), Ok(vb)) => cmp_precedence(&va, &vb) == Ordering::Equal,
                _ => a == b,
            },
            _ => false,
        }
    }
}

impl Eq for RepositorySpec {}

impl Hash for RepositorySpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.name.hash(state);

        match self.version.as_deref() {
            None => 0u8.hash(state),
            Some(raw) => match parse_version(raw) {
                // build metadata is ignored by equality, so it must not reach the hasher
                Ok(v) => {
                    1u8.hash(state);
                    (v.major, v.minor, v.patch).hash(state);
                    v.pre.as_str().hash(state);
                }
                Err(_) => {
                    2u8.hash(state);
                    raw.hash(state);
                }
            },
        }
    }
}

impl fmt::Display for RepositorySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)?;
        if let Some(ref version) = self.version {
            write!(f, ",{}", version)?;
        }
        Ok(())
    }
}

impl FromStr for RepositorySpec {
    type Err = SpecError;

    /// Parse `namespace.name` or `namespace.name,version`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(',') {
            Some((label, version)) => Self::from_label(label, Some(version)),
            None => Self::from_label(s, None),
        }
    }
}

/// Parse a semantic version string
///
/// A leading `v` is accepted and dropped.
pub fn parse_version(s: &str) -> Result<Version, SpecError> {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    Version::parse(trimmed).map_err(|e| SpecError::VersionParse {
        version: s.to_string(),
        reason: e.to_string(),
    })
}

/// Order two versions by semver precedence, ignoring build metadata
pub fn cmp_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

fn normalize_version(version: Option<&str>) -> Option<String> {
    let version = version?.trim();
    match version {
        "" | "*" | "any" => None,
        v => Some(v.to_string()),
    }
}

fn validate_name(field: &'static str, value: &str) -> Result<String, SpecError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SpecError::EmptyField(field));
    }

    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SpecError::InvalidName {
            field,
            value: value.to_string(),
        });
    }

    Ok(value.to_string())
}
