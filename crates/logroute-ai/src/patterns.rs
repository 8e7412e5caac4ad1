//! Ordered regex rules: the cheap, deterministic first stage.
//!
//! Rules are tried in order and the first pattern that matches anywhere in
//! the message wins. No match is reported as `None`, which is a different
//! signal from a confirmed [`Label::Unclassified`].

use logroute_core::Label;
use regex::Regex;

use crate::ClassifyError;

/// Built-in rules, in precedence order.
pub const BUILTIN_RULES: &[(&str, Label)] = &[
    (r"User User\d+ logged (in|out)\.", Label::UserAction),
    (
        r"Backup (started|ended|completed successfully)",
        Label::SystemNotification,
    ),
    (r"System updated to version", Label::SystemNotification),
    (r"File .* uploaded successfully", Label::SystemNotification),
    (r"Disk cleanup completed", Label::SystemNotification),
    (r"System reboot initiated", Label::SystemNotification),
    (r"Account with ID .* created", Label::UserAction),
];

/// Immutable, ordered `(pattern, label)` table.
#[derive(Debug, Clone)]
pub struct PatternTable {
    rules: Vec<(Regex, Label)>,
}

impl PatternTable {
    /// Compile a table from `(pattern, label)` pairs, preserving order.
    pub fn new<'a>(
        rules: impl IntoIterator<Item = (&'a str, Label)>,
    ) -> Result<Self, ClassifyError> {
        let rules = rules
            .into_iter()
            .map(|(pattern, label)| {
                Regex::new(pattern)
                    .map(|re| (re, label))
                    .map_err(|source| ClassifyError::Pattern {
                        pattern: pattern.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// The built-in rule set.
    pub fn builtin() -> Result<Self, ClassifyError> {
        Self::new(BUILTIN_RULES.iter().copied())
    }

    /// Label of the first rule whose pattern occurs in `message`.
    pub fn match_message(&self, message: &str) -> Option<Label> {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(message))
            .map(|(_, label)| *label)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> PatternTable {
        PatternTable::builtin().unwrap()
    }

    #[test]
    fn builtin_compiles() {
        assert_eq!(builtin().len(), BUILTIN_RULES.len());
    }

    #[test]
    fn user_login_and_logout() {
        let table = builtin();
        assert_eq!(
            table.match_message("User User123 logged in."),
            Some(Label::UserAction)
        );
        assert_eq!(
            table.match_message("User User7 logged out."),
            Some(Label::UserAction)
        );
    }

    #[test]
    fn system_notifications() {
        let table = builtin();
        for msg in [
            "Backup completed successfully.",
            "Backup started at 02:00",
            "System updated to version 4.2.1",
            "File report.pdf uploaded successfully by user Admin",
            "Disk cleanup completed in 3s",
            "System reboot initiated by user Admin",
        ] {
            assert_eq!(
                table.match_message(msg),
                Some(Label::SystemNotification),
                "{msg}"
            );
        }
    }

    #[test]
    fn search_not_full_match() {
        let table = builtin();
        assert_eq!(
            table.match_message("[node-3] Account with ID 8842 created by admin"),
            Some(Label::UserAction)
        );
    }

    #[test]
    fn no_match_is_none_not_unclassified() {
        let table = builtin();
        assert_eq!(table.match_message("GET /v2/items HTTP/1.1 200"), None);
        assert_eq!(table.match_message(""), None);
    }

    #[test]
    fn case_sensitivity_comes_from_pattern() {
        let table = builtin();
        assert_eq!(table.match_message("user user123 logged in."), None);
    }

    #[test]
    fn first_rule_wins() {
        let table = PatternTable::new([
            ("timeout", Label::WorkflowError),
            ("timeout after", Label::CriticalError),
        ])
        .unwrap();
        assert_eq!(
            table.match_message("request timeout after 30s"),
            Some(Label::WorkflowError)
        );
    }

    #[test]
    fn malformed_pattern_fails_at_construction() {
        let err = PatternTable::new([("unclosed (group", Label::Error)]).unwrap_err();
        assert!(matches!(err, ClassifyError::Pattern { ref pattern, .. } if pattern == "unclosed (group"));
    }

    #[test]
    fn empty_table_never_matches() {
        let table = PatternTable::new(std::iter::empty::<(&str, Label)>()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.match_message("anything"), None);
    }
}
