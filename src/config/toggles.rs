//! Feature switches read from the environment.
//!
//! The preference core does not branch on these itself; they are resolved
//! once at startup and handed to whatever surface needs them.

use super::{parse_bool, parse_bool_env};
use std::collections::HashMap;
use std::env;

/// A process-wide on/off switch with a fixed default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingToggle {
    pub name: &'static str,
    pub enabled: bool,
}

impl SettingToggle {
    pub fn from_env(name: &'static str, env_var: &str, default: bool) -> Self {
        Self {
            name,
            enabled: parse_bool_env(env_var, default),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// A flag with a global value and per-course overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseFlag {
    pub name: &'static str,
    pub global: bool,
    pub overrides: HashMap<String, bool>,
}

impl CourseFlag {
    pub fn is_enabled(&self, course_id: &str) -> bool {
        self.overrides
            .get(course_id)
            .copied()
            .unwrap_or(self.global)
    }
}

#[derive(Debug, Clone)]
pub struct FeatureToggles {
    pub entrance_exams: SettingToggle,
    pub authz_course_authoring: CourseFlag,
}

impl FeatureToggles {
    pub fn from_env() -> Self {
        let overrides = match env::var("AUTHZ_COURSE_AUTHORING_COURSES") {
            Ok(raw) => parse_course_overrides(&raw).unwrap_or_else(|err| {
                tracing::warn!("Invalid AUTHZ_COURSE_AUTHORING_COURSES '{}': {}", raw, err);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Self {
            entrance_exams: SettingToggle::from_env("ENTRANCE_EXAMS", "ENTRANCE_EXAMS", false),
            authz_course_authoring: CourseFlag {
                name: "authz.enable_course_authoring",
                global: parse_bool_env("AUTHZ_COURSE_AUTHORING", false),
                overrides,
            },
        }
    }

    pub fn entrance_exams_enabled(&self) -> bool {
        self.entrance_exams.is_enabled()
    }

    pub fn enable_authz_course_authoring(&self, course_id: &str) -> bool {
        self.authz_course_authoring.is_enabled(course_id)
    }
}

/// Format: `course-v1:Org+Num+Run=on,course-v1:Other+X+Y=off`.
fn parse_course_overrides(raw: &str) -> Result<HashMap<String, bool>, String> {
    let mut overrides = HashMap::new();
    for item in raw.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (course_id, value) = item
            .rsplit_once('=')
            .ok_or_else(|| format!("invalid item '{}', expected course_id=on|off", item))?;
        let enabled = parse_bool(value)
            .ok_or_else(|| format!("invalid value '{}' for {}", value.trim(), course_id.trim()))?;
        overrides.insert(course_id.trim().to_string(), enabled);
    }
    Ok(overrides)
}
