use std::fmt;

use crate::models::{Library, Rule, RuleAction};

/// Operating system names as the version documents spell them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsName {
    Windows,
    Osx,
    Linux,
}

impl OsName {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            OsName::Windows
        } else if cfg!(target_os = "macos") {
            OsName::Osx
        } else {
            OsName::Linux
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OsName::Windows => "windows",
            OsName::Osx => "osx",
            OsName::Linux => "linux",
        }
    }
}

impl fmt::Display for OsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The machine libraries are resolved for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: OsName,
    /// `x86`, `x86_64`, `aarch64`, ...
    pub arch: String,
}

impl Platform {
    pub fn current() -> Self {
        Self {
            os: OsName::current(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    pub fn new(os: OsName, arch: impl Into<String>) -> Self {
        Self {
            os,
            arch: arch.into(),
        }
    }

    /// Value substituted for `${arch}` in native classifier keys
    pub fn arch_bits(&self) -> &'static str {
        if self.arch.contains("64") { "64" } else { "32" }
    }

    fn matches(&self, rule: &Rule) -> bool {
        if let Some(features) = &rule.features {
            if features.values().any(|&required| required) {
                return false;
            }
        }
        let Some(os) = &rule.os else {
            return true;
        };
        let name_ok = os.name.as_deref().is_none_or(|name| name == self.os.as_str());
        let arch_ok = os.arch.as_deref().is_none_or(|arch| arch == self.arch);
        name_ok && arch_ok
    }

    /// Whether `rules` allow something on this platform. No rules means
    /// allowed; otherwise the last matching rule decides and nothing
    /// matching means disallowed.
    pub fn allows(&self, rules: Option<&[Rule]>) -> bool {
        let Some(rules) = rules else {
            return true;
        };
        rules
            .iter()
            .rev()
            .find(|rule| self.matches(rule))
            .is_some_and(|rule| rule.action == RuleAction::Allow)
    }

    /// Classifier key of the native jar `library` needs here, if any
    pub fn native_classifier(&self, library: &Library) -> Option<String> {
        let key = library.natives.as_ref()?.get(self.os.as_str())?;
        Some(key.replace("${arch}", self.arch_bits()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OsRule;
    use std::collections::HashMap;

    fn rule(action: RuleAction, os: Option<&str>) -> Rule {
        Rule {
            action,
            os: os.map(|name| OsRule {
                name: Some(name.to_string()),
                arch: None,
            }),
            features: None,
        }
    }

    #[test]
    fn test_no_rules_allows() {
        assert!(Platform::new(OsName::Linux, "x86_64").allows(None));
    }

    #[test]
    fn test_last_matching_rule_wins() {
        let rules = vec![
            rule(RuleAction::Allow, None),
            rule(RuleAction::Disallow, Some("osx")),
        ];
        assert!(Platform::new(OsName::Linux, "x86_64").allows(Some(&rules)));
        assert!(!Platform::new(OsName::Osx, "aarch64").allows(Some(&rules)));
    }

    #[test]
    fn test_only_other_os_allowed_means_disallowed() {
        let rules = vec![rule(RuleAction::Allow, Some("windows"))];
        assert!(!Platform::new(OsName::Linux, "x86_64").allows(Some(&rules)));
        assert!(Platform::new(OsName::Windows, "x86_64").allows(Some(&rules)));
    }

    #[test]
    fn test_arch_and_feature_rules() {
        let x86_only = vec![Rule {
            action: RuleAction::Allow,
            os: Some(OsRule {
                name: None,
                arch: Some("x86".to_string()),
            }),
            features: None,
        }];
        assert!(Platform::new(OsName::Windows, "x86").allows(Some(&x86_only)));
        assert!(!Platform::new(OsName::Windows, "x86_64").allows(Some(&x86_only)));

        let demo_only = vec![Rule {
            action: RuleAction::Allow,
            os: None,
            features: Some(HashMap::from([("is_demo_user".to_string(), true)])),
        }];
        assert!(!Platform::new(OsName::Linux, "x86_64").allows(Some(&demo_only)));
    }

    #[test]
    fn test_native_classifier_substitutes_arch() {
        let library = Library {
            name: "org.lwjgl.lwjgl:lwjgl-platform:2.9.4".to_string(),
            downloads: None,
            natives: Some(HashMap::from([(
                "windows".to_string(),
                "natives-windows-${arch}".to_string(),
            )])),
            rules: None,
            url: None,
        };
        assert_eq!(
            Platform::new(OsName::Windows, "x86_64").native_classifier(&library),
            Some("natives-windows-64".to_string())
        );
        assert_eq!(Platform::new(OsName::Linux, "x86_64").native_classifier(&library), None);
    }
}
