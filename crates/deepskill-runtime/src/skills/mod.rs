//! Skills: directory-resident instruction bundles the agent discovers at the
//! start of each run and loads on demand.

pub mod loader;
pub mod middleware;

pub use loader::{
    list_skills, list_skills_in, load_skill_content, parse_skill_metadata, validate_skill_name,
    SkillCatalog, SkillContent, SkillError, SkillMetadata, SkillSource, MAX_SKILL_FILE_SIZE,
};
pub use middleware::{LoadSkillTool, SkillsConfig, SkillsMiddleware};
