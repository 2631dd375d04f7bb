//! Discovery and parsing of `SKILL.md` files.
//!
//! The layout is `<skills_dir>/<skill-name>/SKILL.md`, where `SKILL.md`
//! starts with a YAML frontmatter block delimited by `---` lines. Only the
//! frontmatter is read while building the catalog; the markdown body is
//! loaded on demand by [`load_skill_content`].
//!
//! Everything here is blocking file I/O. The middleware runs it on the
//! blocking pool.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SKILL_FILE_NAME: &str = "SKILL.md";
pub const MAX_SKILL_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const MAX_SKILL_NAME_LENGTH: usize = 64;
pub const MAX_SKILL_DESCRIPTION_LENGTH: usize = 1024;

lazy_static! {
    static ref FRONTMATTER: Regex = Regex::new(r"(?s)^---\s*\n(.*?)\n---\s*\n").unwrap();
}

/// Where a skill was found. Project skills take precedence over user skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillSource {
    User,
    Project,
}

impl SkillSource {
    pub fn label(self) -> &'static str {
        match self {
            SkillSource::User => "User",
            SkillSource::Project => "Project",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMetadata {
    pub name: String,
    pub description: String,
    /// Path of the skill's `SKILL.md`.
    pub path: PathBuf,
    pub source: SkillSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl SkillMetadata {
    /// Directory holding `SKILL.md` and any supporting files.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkillContent {
    pub metadata: SkillMetadata,
    /// Markdown instructions following the frontmatter.
    pub body: String,
}

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("{path} is {size} bytes, over the {max} byte limit")]
    TooLarge { path: PathBuf, size: u64, max: u64 },
    #[error("{0} does not start with a YAML frontmatter block")]
    MissingFrontmatter(PathBuf),
    #[error("invalid frontmatter in {path}: {message}")]
    InvalidFrontmatter { path: PathBuf, message: String },
    #[error("{path}: frontmatter field '{field}' is required")]
    MissingField { path: PathBuf, field: &'static str },
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("skill '{0}' not found")]
    NotFound(String),
}

impl SkillError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn invalid(path: &Path, message: impl Into<String>) -> Self {
        Self::InvalidFrontmatter {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AllowedTools {
    Line(String),
    List(Vec<String>),
}

impl AllowedTools {
    fn into_vec(self) -> Vec<String> {
        match self {
            AllowedTools::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            AllowedTools::List(list) => list,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    compatibility: Option<String>,
    #[serde(default, rename = "allowed-tools")]
    allowed_tools: Option<AllowedTools>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_yaml::Value>,
}

fn yaml_scalar(value: serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s,
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Checks the naming rules: 1-64 chars of lowercase ASCII alphanumerics and
/// single hyphens, no leading or trailing hyphen, equal to the directory name.
pub fn validate_skill_name(name: &str, dir_name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is empty".into());
    }
    if name.chars().count() > MAX_SKILL_NAME_LENGTH {
        return Err(format!("name exceeds {MAX_SKILL_NAME_LENGTH} characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("name may only contain lowercase letters, digits and hyphens".into());
    }
    if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
        return Err("name must not start or end with a hyphen or contain consecutive hyphens".into());
    }
    if name != dir_name {
        return Err(format!("name must match directory name '{dir_name}'"));
    }
    Ok(())
}

fn read_skill_file(path: &Path) -> Result<String, SkillError> {
    let size = fs::metadata(path).map_err(|e| SkillError::io(path, e))?.len();
    if size > MAX_SKILL_FILE_SIZE {
        return Err(SkillError::TooLarge {
            path: path.to_path_buf(),
            size,
            max: MAX_SKILL_FILE_SIZE,
        });
    }
    fs::read_to_string(path).map_err(|e| SkillError::io(path, e))
}

fn required(value: Option<String>, path: &Path, field: &'static str) -> Result<String, SkillError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SkillError::MissingField {
            path: path.to_path_buf(),
            field,
        })
}

/// Parses the frontmatter of `skill_md`.
///
/// Naming-rule violations and over-long descriptions are logged, not
/// rejected, so a slightly off skill still shows up in the catalog.
pub fn parse_skill_metadata(skill_md: &Path, source: SkillSource) -> Result<SkillMetadata, SkillError> {
    let content = read_skill_file(skill_md)?;
    let captures = FRONTMATTER
        .captures(&content)
        .ok_or_else(|| SkillError::MissingFrontmatter(skill_md.to_path_buf()))?;
    let yaml = captures.get(1).map(|m| m.as_str()).unwrap_or_default();

    let value: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| SkillError::invalid(skill_md, e.to_string()))?;
    if !value.is_mapping() {
        return Err(SkillError::invalid(skill_md, "frontmatter must be a mapping"));
    }
    let frontmatter: Frontmatter =
        serde_yaml::from_value(value).map_err(|e| SkillError::invalid(skill_md, e.to_string()))?;

    let name = required(frontmatter.name, skill_md, "name")?;
    let mut description = required(frontmatter.description, skill_md, "description")?;

    let dir_name = skill_md
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Err(reason) = validate_skill_name(&name, &dir_name) {
        tracing::warn!(skill = %name, path = %skill_md.display(), %reason, "skill name does not follow naming rules");
    }

    if description.chars().count() > MAX_SKILL_DESCRIPTION_LENGTH {
        tracing::warn!(
            skill = %name,
            max = MAX_SKILL_DESCRIPTION_LENGTH,
            "skill description truncated"
        );
        description = description.chars().take(MAX_SKILL_DESCRIPTION_LENGTH).collect();
    }

    Ok(SkillMetadata {
        name,
        description,
        path: skill_md.to_path_buf(),
        source,
        license: frontmatter.license,
        compatibility: frontmatter.compatibility,
        allowed_tools: frontmatter
            .allowed_tools
            .map(AllowedTools::into_vec)
            .unwrap_or_default(),
        metadata: frontmatter
            .metadata
            .into_iter()
            .map(|(k, v)| (k, yaml_scalar(v)))
            .collect(),
    })
}

/// Scans the immediate subdirectories of `dir` for skills, sorted by
/// directory name. Missing directories and malformed skills yield no entries.
pub fn list_skills_in(dir: &Path, source: SkillSource) -> Vec<SkillMetadata> {
    let root = match dir.canonicalize() {
        Ok(root) => root,
        Err(_) => {
            tracing::debug!(dir = %dir.display(), "skills directory not found");
            return Vec::new();
        }
    };
    let entries = match fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %root.display(), error = %e, "cannot read skills directory");
            return Vec::new();
        }
    };

    let mut dirs: Vec<_> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .collect();
    dirs.sort_by_key(|entry| entry.file_name());

    let mut skills = Vec::new();
    for entry in dirs {
        let skill_dir = root.join(entry.file_name());
        match skill_dir.canonicalize() {
            Ok(real) if real.starts_with(&root) => {}
            Ok(real) => {
                tracing::warn!(dir = %skill_dir.display(), target = %real.display(), "skipping skill outside the skills directory");
                continue;
            }
            Err(e) => {
                tracing::warn!(dir = %skill_dir.display(), error = %e, "cannot resolve skill directory");
                continue;
            }
        }

        let skill_md = skill_dir.join(SKILL_FILE_NAME);
        if !skill_md.is_file() {
            continue;
        }
        match parse_skill_metadata(&skill_md, source) {
            Ok(meta) => skills.push(meta),
            Err(e) => tracing::warn!(path = %skill_md.display(), error = %e, "skipping malformed skill"),
        }
    }
    skills
}

/// Read-only set of skills keyed and ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillCatalog {
    skills: BTreeMap<String, SkillMetadata>,
}

impl SkillCatalog {
    /// Later entries replace earlier ones with the same name.
    pub fn from_skills<I>(skills: I) -> Self
    where
        I: IntoIterator<Item = SkillMetadata>,
    {
        let mut map = BTreeMap::new();
        for skill in skills {
            if let Some(previous) = map.insert(skill.name.clone(), skill) {
                tracing::debug!(skill = %previous.name, source = previous.source.label(), "skill overridden");
            }
        }
        Self { skills: map }
    }

    pub fn get(&self, name: &str) -> Option<&SkillMetadata> {
        self.skills.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SkillMetadata> {
        self.skills.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.skills.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn by_source(&self, source: SkillSource) -> Vec<&SkillMetadata> {
        self.iter().filter(|s| s.source == source).collect()
    }
}

/// User skills first, then project skills, so a project skill overrides a
/// user skill of the same name.
pub fn list_skills(user_dir: Option<&Path>, project_dir: Option<&Path>) -> SkillCatalog {
    let user = user_dir
        .map(|dir| list_skills_in(dir, SkillSource::User))
        .unwrap_or_default();
    let project = project_dir
        .map(|dir| list_skills_in(dir, SkillSource::Project))
        .unwrap_or_default();
    SkillCatalog::from_skills(user.into_iter().chain(project))
}

/// Reads the markdown body of a catalogued skill.
pub fn load_skill_content(metadata: &SkillMetadata) -> Result<SkillContent, SkillError> {
    let content = read_skill_file(&metadata.path)?;
    let frontmatter = FRONTMATTER
        .find(&content)
        .ok_or_else(|| SkillError::MissingFrontmatter(metadata.path.clone()))?;
    Ok(SkillContent {
        metadata: metadata.clone(),
        body: content[frontmatter.end()..].trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_skill(root: &Path, dir: &str, content: &str) -> PathBuf {
        let skill_dir = root.join(dir);
        fs::create_dir_all(&skill_dir).unwrap();
        let path = skill_dir.join(SKILL_FILE_NAME);
        fs::write(&path, content).unwrap();
        path
    }

    fn skill_doc(name: &str, description: &str) -> String {
        format!("---\nname: {name}\ndescription: {description}\n---\n\n# {name}\n\nSteps.\n")
    }

    #[test]
    fn parses_full_frontmatter() {
        let tmp = TempDir::new().unwrap();
        let path = write_skill(
            tmp.path(),
            "docx",
            "---\nname: docx\ndescription: Edit Word documents\nlicense: MIT\n\
             allowed-tools: shell read_file\nmetadata:\n  author: ops\n  version: 2\n---\nBody\n",
        );
        let meta = parse_skill_metadata(&path, SkillSource::User).unwrap();
        assert_eq!(meta.name, "docx");
        assert_eq!(meta.description, "Edit Word documents");
        assert_eq!(meta.license.as_deref(), Some("MIT"));
        assert_eq!(meta.allowed_tools, vec!["shell", "read_file"]);
        assert_eq!(meta.metadata["author"], "ops");
        assert_eq!(meta.metadata["version"], "2");
        assert_eq!(meta.dir(), path.parent().unwrap());
    }

    #[test]
    fn allowed_tools_accepts_a_yaml_list() {
        let tmp = TempDir::new().unwrap();
        let path = write_skill(
            tmp.path(),
            "pdf",
            "---\nname: pdf\ndescription: Fill PDF forms\nallowed-tools:\n  - shell\n  - read_file\n---\nBody\n",
        );
        let meta = parse_skill_metadata(&path, SkillSource::Project).unwrap();
        assert_eq!(meta.allowed_tools, vec!["shell", "read_file"]);
    }

    #[test]
    fn oversized_skill_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut content = skill_doc("huge", "Too big to load");
        content.push_str(&"x".repeat(MAX_SKILL_FILE_SIZE as usize));
        let path = write_skill(tmp.path(), "huge", &content);

        match parse_skill_metadata(&path, SkillSource::User) {
            Err(SkillError::TooLarge { size, max, .. }) => {
                assert_eq!(max, MAX_SKILL_FILE_SIZE);
                assert!(size > max);
            }
            other => panic!("expected TooLarge, got {other:?}"),
        }
        assert!(list_skills_in(tmp.path(), SkillSource::User).is_empty());
    }

    #[test]
    fn rejects_missing_frontmatter_and_fields() {
        let tmp = TempDir::new().unwrap();
        let plain = write_skill(tmp.path(), "plain", "# no frontmatter\n");
        assert!(matches!(
            parse_skill_metadata(&plain, SkillSource::User),
            Err(SkillError::MissingFrontmatter(_))
        ));

        let nameless = write_skill(tmp.path(), "nameless", "---\ndescription: x\n---\nbody\n");
        assert!(matches!(
            parse_skill_metadata(&nameless, SkillSource::User),
            Err(SkillError::MissingField { field: "name", .. })
        ));

        let list = write_skill(tmp.path(), "list", "---\n- a\n- b\n---\nbody\n");
        assert!(matches!(
            parse_skill_metadata(&list, SkillSource::User),
            Err(SkillError::InvalidFrontmatter { .. })
        ));
    }

    #[test]
    fn long_description_is_truncated_and_bad_name_still_loads() {
        let tmp = TempDir::new().unwrap();
        let long = "d".repeat(MAX_SKILL_DESCRIPTION_LENGTH + 50);
        let path = write_skill(tmp.path(), "other-dir", &skill_doc("Bad_Name", &long));
        let meta = parse_skill_metadata(&path, SkillSource::Project).unwrap();
        assert_eq!(meta.name, "Bad_Name");
        assert_eq!(meta.description.chars().count(), MAX_SKILL_DESCRIPTION_LENGTH);
    }

    #[test]
    fn name_rules() {
        assert!(validate_skill_name("pdf-tools", "pdf-tools").is_ok());
        assert!(validate_skill_name("pdf--tools", "pdf--tools").is_err());
        assert!(validate_skill_name("-pdf", "-pdf").is_err());
        assert!(validate_skill_name("PDF", "PDF").is_err());
        assert!(validate_skill_name("pdf", "docx").is_err());
        assert!(validate_skill_name(&"a".repeat(65), &"a".repeat(65)).is_err());
    }

    #[test]
    fn listing_skips_malformed_entries_and_sorts() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "xlsx", &skill_doc("xlsx", "Spreadsheets"));
        write_skill(tmp.path(), "broken", "no frontmatter");
        write_skill(tmp.path(), "docx", &skill_doc("docx", "Word documents"));
        fs::create_dir_all(tmp.path().join("empty")).unwrap();
        fs::write(tmp.path().join("README.md"), "not a skill").unwrap();

        let skills = list_skills_in(tmp.path(), SkillSource::User);
        let names: Vec<_> = skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["docx", "xlsx"]);
        assert!(list_skills_in(&tmp.path().join("missing"), SkillSource::User).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn listing_skips_symlinks_escaping_the_root() {
        let outside = TempDir::new().unwrap();
        write_skill(outside.path(), "evil", &skill_doc("evil", "Escapes"));
        let root = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path().join("evil"), root.path().join("evil")).unwrap();

        assert!(list_skills_in(root.path(), SkillSource::User).is_empty());
    }

    #[test]
    fn project_skills_override_user_skills() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write_skill(user.path(), "docx", &skill_doc("docx", "user version"));
        write_skill(user.path(), "pdf", &skill_doc("pdf", "user pdf"));
        write_skill(project.path(), "docx", &skill_doc("docx", "project version"));

        let catalog = list_skills(Some(user.path()), Some(project.path()));
        assert_eq!(catalog.len(), 2);
        let docx = catalog.get("docx").unwrap();
        assert_eq!(docx.description, "project version");
        assert_eq!(docx.source, SkillSource::Project);
        assert_eq!(catalog.by_source(SkillSource::User).len(), 1);
        assert!(list_skills(None, None).is_empty());
    }

    #[test]
    fn content_is_loaded_without_frontmatter() {
        let tmp = TempDir::new().unwrap();
        let path = write_skill(tmp.path(), "docx", &skill_doc("docx", "Word"));
        let meta = parse_skill_metadata(&path, SkillSource::User).unwrap();
        let content = load_skill_content(&meta).unwrap();
        assert_eq!(content.body, "# docx\n\nSteps.");
    }
}
