//! Property results and the checker trait shared by every invariant module.

use std::fmt;

use crate::counterexample::Counterexample;

/// Outcome of checking a single named property.
#[derive(Debug, Clone)]
pub struct PropertyResult {
    /// Property name, e.g. `MutualExclusion`
    pub name: String,
    /// Whether the property holds
    pub holds: bool,
    /// Human-readable violation message (only when `holds == false`)
    pub violation: Option<String>,
    /// Failure path, when the checker could build one
    pub counterexample: Option<Counterexample>,
}

impl PropertyResult {
    /// A property that holds.
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            holds: true,
            violation: None,
            counterexample: None,
        }
    }

    /// A violated property.
    #[must_use]
    pub fn fail(
        name: impl Into<String>,
        violation: impl Into<String>,
        counterexample: Option<Counterexample>,
    ) -> Self {
        Self {
            name: name.into(),
            holds: false,
            violation: Some(violation.into()),
            counterexample,
        }
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.violation, self.holds) {
            (_, true) => write!(f, "[PASS] {}", self.name),
            (Some(violation), false) => write!(f, "[FAIL] {}: {}", self.name, violation),
            (None, false) => write!(f, "[FAIL] {}", self.name),
        }
    }
}

/// Something that can evaluate a set of properties against observed state.
pub trait PropertyChecker {
    /// Evaluate every property this checker knows about.
    fn check_all(&self) -> Vec<PropertyResult>;

    /// True when every property holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// Only the violated properties.
    fn violations(&self) -> Vec<PropertyResult> {
        self.check_all().into_iter().filter(|r| !r.holds).collect()
    }

    /// One line per property, suitable for test failure messages.
    fn report(&self) -> String {
        self.check_all()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<PropertyResult>);

    impl PropertyChecker for Fixed {
        fn check_all(&self) -> Vec<PropertyResult> {
            self.0.clone()
        }
    }

    #[test]
    fn test_all_hold_and_violations() {
        let ok = Fixed(vec![PropertyResult::pass("A"), PropertyResult::pass("B")]);
        assert!(ok.all_hold());
        assert!(ok.violations().is_empty());

        let bad = Fixed(vec![
            PropertyResult::pass("A"),
            PropertyResult::fail("B", "two holders at step 7", None),
        ]);
        assert!(!bad.all_hold());
        let violations = bad.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].name, "B");
    }

    #[test]
    fn test_report_format() {
        let checker = Fixed(vec![
            PropertyResult::pass("MutualExclusion"),
            PropertyResult::fail("NoLostUpdates", "expected 10, observed 7", None),
        ]);
        let report = checker.report();
        assert!(report.contains("[PASS] MutualExclusion"));
        assert!(report.contains("[FAIL] NoLostUpdates: expected 10, observed 7"));
    }
}
