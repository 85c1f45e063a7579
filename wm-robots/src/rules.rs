//! RFC 9309 robots.txt parsing: `User-agent` groups, `Allow`/`Disallow`
//! directives, `*` wildcards and `$` end-anchors in paths.

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    allow: bool,
}

#[derive(Debug, Clone)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

/// A parsed ruleset for one origin. An empty ruleset (no groups) allows
/// everything, matching the pool's "empty ruleset ⇒ allow-all" fallback
/// (spec.md §3 "Robots Pool").
#[derive(Debug, Clone, Default)]
pub struct Robots {
    groups: Vec<Group>,
}

impl Robots {
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parses a robots.txt document. Unrecognized directives (`Sitemap`,
    /// `Crawl-delay`, comments) are skipped rather than erroring; a
    /// document this parser cannot make sense of at all degrades to
    /// "no groups", which [`Robots::is_allowed`] treats as allow-all.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current: Option<Group> = None;
        let mut in_agent_block = false;

        for raw_line in text.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else { continue };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if in_agent_block {
                        if let Some(group) = current.as_mut() {
                            group.agents.push(value.to_ascii_lowercase());
                        }
                    } else {
                        if let Some(group) = current.take() {
                            groups.push(group);
                        }
                        current = Some(Group { agents: vec![value.to_ascii_lowercase()], rules: Vec::new() });
                        in_agent_block = true;
                    }
                }
                "disallow" => {
                    in_agent_block = false;
                    if !value.is_empty() {
                        if let Some(group) = current.as_mut() {
                            group.rules.push(Rule { pattern: value.to_string(), allow: false });
                        }
                    }
                }
                "allow" => {
                    in_agent_block = false;
                    if let Some(group) = current.as_mut() {
                        group.rules.push(Rule { pattern: value.to_string(), allow: true });
                    }
                }
                _ => {
                    in_agent_block = false;
                }
            }
        }
        if let Some(group) = current.take() {
            groups.push(group);
        }
        Self { groups }
    }

    /// Whether `path` may be fetched by `user_agent`. Groups whose
    /// user-agent token matches `user_agent` (case-insensitive substring)
    /// take priority over the wildcard `*` group; within the selected
    /// groups, the longest matching pattern wins, and an exact tie
    /// between an `Allow` and a `Disallow` favors `Allow`.
    #[must_use]
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        let user_agent = user_agent.to_ascii_lowercase();

        let specific: Vec<&Group> = self
            .groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| a != "*" && user_agent.contains(a.as_str())))
            .collect();
        let selected: Vec<&Group> = if specific.is_empty() {
            self.groups.iter().filter(|g| g.agents.iter().any(|a| a == "*")).collect()
        } else {
            specific
        };
        if selected.is_empty() {
            return true;
        }

        let mut best: Option<(usize, bool)> = None;
        for group in selected {
            for rule in &group.rules {
                if !pattern_matches(&rule.pattern, path) {
                    continue;
                }
                let specificity = rule.pattern.len();
                match best {
                    Some((len, allow)) if len > specificity => {
                        let _ = allow;
                    }
                    Some((len, _)) if len == specificity => {
                        best = Some((specificity, true)); // tie favors Allow
                    }
                    _ => best = Some((specificity, rule.allow)),
                }
            }
        }
        best.map_or(true, |(_, allow)| allow)
    }
}

fn strip_comment(line: &str) -> &str {
    line.find('#').map_or(line, |i| &line[..i])
}

/// `*` matches any run of characters; a trailing `$` anchors the match to
/// the end of `path`.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = path;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !rest.starts_with(part) {
                return false;
            }
            rest = &rest[part.len()..];
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }
    !anchored || rest.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallow_all_blocks_everything() {
        let robots = Robots::parse("User-agent: *\nDisallow: /\n");
        assert!(!robots.is_allowed("/secret", "wmirror/1.0"));
        assert!(!robots.is_allowed("/", "wmirror/1.0"));
    }

    #[test]
    fn empty_document_allows_everything() {
        let robots = Robots::parse("");
        assert!(robots.is_allowed("/anything", "wmirror/1.0"));
    }

    #[test]
    fn more_specific_allow_overrides_broader_disallow() {
        let robots = Robots::parse("User-agent: *\nDisallow: /private/\nAllow: /private/public.html\n");
        assert!(!robots.is_allowed("/private/secret.html", "wmirror/1.0"));
        assert!(robots.is_allowed("/private/public.html", "wmirror/1.0"));
    }

    #[test]
    fn specific_agent_group_overrides_wildcard_group() {
        let robots = Robots::parse(
            "User-agent: *\nDisallow: /\nUser-agent: wmirror\nDisallow:\n",
        );
        assert!(robots.is_allowed("/anywhere", "wmirror/1.0"));
        assert!(!robots.is_allowed("/anywhere", "othercrawler/1.0"));
    }

    #[test]
    fn wildcard_and_end_anchor_patterns() {
        let robots = Robots::parse("User-agent: *\nDisallow: /*.pdf$\n");
        assert!(!robots.is_allowed("/file.pdf", "wmirror"));
        assert!(robots.is_allowed("/file.pdf.html", "wmirror"));
    }
}
