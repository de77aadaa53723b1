/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// Paths that are always ignored regardless of `.pogoignore` content,
/// matching spec.md §4.4.3.
const HARDCODED_IGNORES: &[&str] = &[".git", ".DS_Store", "Thumbs.db", ".pogo.yaml"];

/// Evaluates `.pogoignore` (gitignore syntax) plus the hard-coded ignore
/// list. Built server-side from the target change's own files so the same
/// patterns apply no matter which client is pushing.
pub struct IgnoreRules {
    matcher: Gitignore,
}

impl IgnoreRules {
    /// `pogoignore_contents` is the list of `(directory, file contents)`
    /// pairs for every `.pogoignore` found in the pushed file set, directory
    /// paths relative to the repository root.
    pub fn build(pogoignore_contents: &[(String, String)]) -> Self {
        let mut builder = GitignoreBuilder::new("/");
        for pattern in HARDCODED_IGNORES {
            // Hard-coded ignores apply at every directory depth.
            let _ = builder.add_line(None, &format!("**/{pattern}"));
        }
        for (dir, contents) in pogoignore_contents {
            for line in contents.lines() {
                if line.trim().is_empty() || line.trim_start().starts_with('#') {
                    continue;
                }
                let prefixed = if dir.is_empty() || dir == "." {
                    line.to_string()
                } else {
                    format!("/{dir}/{line}")
                };
                let _ = builder.add_line(None, &prefixed);
            }
        }
        let matcher = builder.build().unwrap_or_else(|_| {
            GitignoreBuilder::new("/")
                .build()
                .expect("empty gitignore builder always builds")
        });
        IgnoreRules { matcher }
    }

    /// `path` is repository-root-relative, e.g. `"src/main.rs"`.
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        matches!(
            self.matcher.matched(format!("/{path}"), is_dir),
            ignore::Match::Ignore(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardcoded_ignores_apply_everywhere() {
        let rules = IgnoreRules::build(&[]);
        assert!(rules.is_ignored(".git/config", false));
        assert!(rules.is_ignored("nested/.DS_Store", false));
        assert!(rules.is_ignored(".pogo.yaml", false));
        assert!(!rules.is_ignored("src/main.rs", false));
    }

    #[test]
    fn pogoignore_patterns_apply_relative_to_their_directory() {
        let rules = IgnoreRules::build(&[("".to_string(), "*.log\nbuild/\n".to_string())]);
        assert!(rules.is_ignored("debug.log", false));
        assert!(rules.is_ignored("build", true));
        assert!(!rules.is_ignored("src/main.rs", false));
    }

    #[test]
    fn nested_pogoignore_scopes_to_its_own_subtree() {
        let rules = IgnoreRules::build(&[("sub".to_string(), "*.tmp\n".to_string())]);
        assert!(rules.is_ignored("sub/scratch.tmp", false));
        assert!(!rules.is_ignored("scratch.tmp", false));
    }
}
