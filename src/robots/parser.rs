//! Robots.txt parser implementation
//!
//! Parses robots.txt content into ordered user-agent rule groups. The parser
//! is deliberately tolerant: blank lines, comments, and unknown directives
//! never fail a parse. Only `User-agent:` and `Disallow:` affect the result.

/// One `User-agent:` group with its accumulated disallow prefixes
///
/// Consecutive `User-agent:` lines share a group, per the de-facto grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleGroup {
    /// Lowercased agent tokens this group applies to (`*` for wildcard)
    pub user_agents: Vec<String>,

    /// Path prefixes this group forbids, in file order
    pub disallow: Vec<String>,
}

impl RuleGroup {
    fn applies_to_wildcard(&self) -> bool {
        self.user_agents.iter().any(|ua| ua == "*")
    }

    fn applies_to_agent(&self, normalized_agent: &str) -> bool {
        self.user_agents
            .iter()
            .any(|ua| ua != "*" && normalized_agent.contains(ua.as_str()))
    }
}

/// Parsed robots.txt rules for one host
///
/// Replaced wholesale when the cache refreshes; never partially mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotsRecord {
    groups: Vec<RuleGroup>,
    permit_all: bool,
}

impl RobotsRecord {
    /// Parses raw robots.txt content into a record
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file body
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<RuleGroup> = Vec::new();
        // Whether the previous meaningful line was a User-agent line; a run of
        // consecutive agent lines opens a single shared group.
        let mut in_agent_run = false;

        for line in content.lines() {
            // Strip trailing comments, then surrounding whitespace
            let meaningful = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            };
            let trimmed = meaningful.trim();

            if trimmed.is_empty() {
                continue;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                // Not a directive line; tolerate and move on
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    let agent = value.to_lowercase();
                    if in_agent_run {
                        if let Some(group) = groups.last_mut() {
                            group.user_agents.push(agent);
                        }
                    } else {
                        groups.push(RuleGroup {
                            user_agents: vec![agent],
                            disallow: Vec::new(),
                        });
                        in_agent_run = true;
                    }
                }
                "disallow" => {
                    in_agent_run = false;
                    // An empty Disallow means "allow everything" for the group;
                    // a Disallow before any User-agent line has no group to bind to
                    if !value.is_empty() {
                        if let Some(group) = groups.last_mut() {
                            group.disallow.push(value.to_string());
                        }
                    }
                }
                _ => {
                    // Allow, Crawl-delay, Sitemap, and anything else: ignored
                    in_agent_run = false;
                }
            }
        }

        Self {
            groups,
            permit_all: false,
        }
    }

    /// Creates a permissive record that allows every path
    ///
    /// Synthesized when a host has no robots.txt (404 or other non-2xx).
    pub fn permit_all() -> Self {
        Self {
            groups: Vec::new(),
            permit_all: true,
        }
    }

    /// Whether this record was synthesized as permit-all
    pub fn is_permit_all(&self) -> bool {
        self.permit_all
    }

    /// Returns the rule groups in file order
    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    /// Finds the disallow prefix matching `path` for `user_agent`, if any
    ///
    /// Honors the group named for the caller's user agent when one exists,
    /// falling back to the `*` group otherwise. A path is disallowed iff it
    /// starts with one of the group's recorded prefixes.
    ///
    /// # Returns
    ///
    /// * `Some(prefix)` - The first matching disallow prefix
    /// * `None` - The path is permitted
    pub fn disallowed_prefix(&self, path: &str, user_agent: &str) -> Option<&str> {
        if self.permit_all {
            return None;
        }

        let group = self.applicable_group(user_agent)?;
        group
            .disallow
            .iter()
            .find(|prefix| path.starts_with(prefix.as_str()))
            .map(|prefix| prefix.as_str())
    }

    /// Picks the group to honor: a specific agent match wins over the wildcard
    fn applicable_group(&self, user_agent: &str) -> Option<&RuleGroup> {
        let normalized = user_agent.to_lowercase();

        self.groups
            .iter()
            .find(|g| g.applies_to_agent(&normalized))
            .or_else(|| self.groups.iter().find(|g| g.applies_to_wildcard()))
    }
}
