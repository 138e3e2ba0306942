use saisonxform_core::TransactionRow;
use serde::{Deserialize, Serialize};

/// Subjects that mark a meeting or entertainment expense.
pub const DEFAULT_KEYWORDS: &[&str] = &["会議費", "接待費"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelevanceRule {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
}

impl RelevanceRule {
    pub fn contains(keyword: &str) -> Self {
        Self {
            name: keyword.to_string(),
            pattern: keyword.to_string(),
            match_type: MatchType::Contains,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MatchType {
    #[default]
    Contains,
    Exact,
    Regex,
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(MatchType::Contains),
            "exact" => Ok(MatchType::Exact),
            "regex" => Ok(MatchType::Regex),
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

/// Internal pairing of a rule with its precompiled regex (if applicable).
struct CompiledRule {
    rule: RelevanceRule,
    compiled_regex: Option<regex::Regex>,
}

/// Decides which statement rows get attendees assigned.
///
/// A row qualifies when it has a parseable date and its subject matches any
/// rule, checked in the order given.
pub struct RelevanceFilter {
    rules: Vec<CompiledRule>,
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self::from_keywords(DEFAULT_KEYWORDS)
    }
}

impl RelevanceFilter {
    /// Rules whose regex fails to compile never match.
    pub fn new(rules: Vec<RelevanceRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let compiled_regex = if let MatchType::Regex = rule.match_type {
                    match regex::Regex::new(&rule.pattern) {
                        Ok(re) => Some(re),
                        Err(e) => {
                            tracing::warn!(rule = %rule.name, "invalid relevance regex: {e}");
                            None
                        }
                    }
                } else {
                    None
                };
                CompiledRule { rule, compiled_regex }
            })
            .collect();
        Self { rules }
    }

    pub fn from_keywords<S: AsRef<str>>(keywords: &[S]) -> Self {
        Self::new(
            keywords
                .iter()
                .map(|k| RelevanceRule::contains(k.as_ref()))
                .collect(),
        )
    }

    pub fn rules(&self) -> impl Iterator<Item = &RelevanceRule> {
        self.rules.iter().map(|cr| &cr.rule)
    }

    pub fn matching_rule(&self, row: &TransactionRow) -> Option<&RelevanceRule> {
        if row.date.is_none() {
            return None;
        }
        self.rules
            .iter()
            .find(|cr| rule_matches(cr, &row.subject))
            .map(|cr| &cr.rule)
    }

    pub fn is_relevant(&self, row: &TransactionRow) -> bool {
        self.matching_rule(row).is_some()
    }
}

fn rule_matches(cr: &CompiledRule, subject: &str) -> bool {
    let rule = &cr.rule;
    let text = subject.trim().to_lowercase();
    let pattern = rule.pattern.to_lowercase();

    match rule.match_type {
        MatchType::Contains => !pattern.is_empty() && text.contains(&pattern),
        MatchType::Exact => text == pattern,
        MatchType::Regex => cr
            .compiled_regex
            .as_ref()
            .is_some_and(|re| re.is_match(subject)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_row(subject: &str, dated: bool) -> TransactionRow {
        TransactionRow {
            date: dated.then(|| NaiveDate::from_ymd_opt(2025, 10, 15).unwrap()),
            subject: subject.to_string(),
            ..TransactionRow::default()
        }
    }

    fn make_rule(pattern: &str, match_type: MatchType) -> RelevanceRule {
        RelevanceRule {
            name: "test".to_string(),
            pattern: pattern.to_string(),
            match_type,
        }
    }

    #[test]
    fn default_keywords_match_meeting_and_entertainment() {
        let filter = RelevanceFilter::default();
        assert!(filter.is_relevant(&make_row("会議費", true)));
        assert!(filter.is_relevant(&make_row("接待費 No.12", true)));
        assert!(!filter.is_relevant(&make_row("交通費", true)));
        assert!(!filter.is_relevant(&make_row("", true)));
    }

    #[test]
    fn undated_rows_are_never_relevant() {
        let filter = RelevanceFilter::default();
        assert!(!filter.is_relevant(&make_row("会議費", false)));
    }

    #[test]
    fn matching_rule_reports_first_match() {
        let filter = RelevanceFilter::default();
        let rule = filter.matching_rule(&make_row("接待費/会議費", true)).unwrap();
        assert_eq!(rule.pattern, "会議費");
    }

    #[test]
    fn exact_match() {
        let filter = RelevanceFilter::new(vec![make_rule("会議費", MatchType::Exact)]);
        assert!(filter.is_relevant(&make_row(" 会議費 ", true)));
        assert!(!filter.is_relevant(&make_row("会議費 No.3", true)));
    }

    #[test]
    fn regex_match() {
        let filter = RelevanceFilter::new(vec![make_rule(r"^(会議|接待)費", MatchType::Regex)]);
        assert!(filter.is_relevant(&make_row("接待費(社外)", true)));
        assert!(!filter.is_relevant(&make_row("社内会議費", true)));
    }

    #[test]
    fn invalid_regex_never_matches() {
        let filter = RelevanceFilter::new(vec![make_rule("(", MatchType::Regex)]);
        assert!(!filter.is_relevant(&make_row("(", true)));
    }

    #[test]
    fn empty_keyword_matches_nothing() {
        let filter = RelevanceFilter::from_keywords(&[""]);
        assert!(!filter.is_relevant(&make_row("会議費", true)));
    }

    #[test]
    fn rules_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct File {
            rule: Vec<RelevanceRule>,
        }
        let file: File = toml::from_str(
            r#"
            [[rule]]
            name = "meetings"
            pattern = "会議"

            [[rule]]
            name = "hospitality"
            pattern = "^接待"
            match_type = "Regex"
            "#,
        )
        .unwrap();
        let filter = RelevanceFilter::new(file.rule);
        assert_eq!(filter.rules().count(), 2);
        assert!(filter.is_relevant(&make_row("接待費", true)));
        assert!(filter.is_relevant(&make_row("社内会議", true)));
    }

    #[test]
    fn match_type_from_str() {
        assert_eq!("REGEX".parse::<MatchType>().unwrap(), MatchType::Regex);
        assert!("fuzzy".parse::<MatchType>().is_err());
    }
}
