use crate::version::vercmp;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Equal => "=",
            Operator::GreaterEqual => ">=",
            Operator::Greater => ">",
        }
    }

    pub fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Less => ordering == Ordering::Less,
            Operator::LessEqual => ordering != Ordering::Greater,
            Operator::Equal => ordering == Ordering::Equal,
            Operator::GreaterEqual => ordering != Ordering::Less,
            Operator::Greater => ordering == Ordering::Greater,
        }
    }
}

/// A version bound such as `>=1.2-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    pub op: Operator,
    pub version: String,
}

impl Constraint {
    pub fn new(op: Operator, version: &str) -> Self {
        Self {
            op,
            version: version.to_string(),
        }
    }

    pub fn exact(version: &str) -> Self {
        Self::new(Operator::Equal, version)
    }

    pub fn matches(&self, version: &str) -> bool {
        self.op.accepts(vercmp(version, &self.version))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.version)
    }
}

/// A parsed `depends`/`provides` entry: `name`, or `name<op>version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyExpr {
    pub name: String,
    pub constraint: Option<Constraint>,
}

impl DependencyExpr {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let Some(pos) = input.find(&['<', '>', '='][..]) else {
            return Self {
                name: input.to_string(),
                constraint: None,
            };
        };
        let rest = &input[pos..];
        let (op, len) = if rest.starts_with("<=") {
            (Operator::LessEqual, 2)
        } else if rest.starts_with(">=") {
            (Operator::GreaterEqual, 2)
        } else if rest.starts_with('<') {
            (Operator::Less, 1)
        } else if rest.starts_with('>') {
            (Operator::Greater, 1)
        } else {
            (Operator::Equal, 1)
        };
        Self {
            name: input[..pos].to_string(),
            constraint: Some(Constraint::new(op, &rest[len..])),
        }
    }

    pub fn matches(&self, package_name: &str, version: &str) -> bool {
        self.name == package_name
            && self
                .constraint
                .as_ref()
                .is_none_or(|c| c.matches(version))
    }
}

impl fmt::Display for DependencyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(ref constraint) = self.constraint {
            write!(f, "{}", constraint)?;
        }
        Ok(())
    }
}

/// True when `version` passes every constraint. An empty list accepts anything.
pub fn satisfies(version: &str, constraints: &[Constraint]) -> bool {
    constraints.iter().all(|c| c.matches(version))
}

/// Groups the constraints of many raw expressions by the package name they
/// reference, keeping the order in which names first appear.
pub fn group_by_name<I, S>(exprs: I) -> Vec<(String, Vec<Constraint>)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut grouped: Vec<(String, Vec<Constraint>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for raw in exprs {
        let expr = DependencyExpr::parse(raw.as_ref());
        if expr.name.is_empty() {
            continue;
        }
        let idx = *positions.entry(expr.name.clone()).or_insert_with(|| {
            grouped.push((expr.name.clone(), Vec::new()));
            grouped.len() - 1
        });
        if let Some(constraint) = expr.constraint {
            if !grouped[idx].1.contains(&constraint) {
                grouped[idx].1.push(constraint);
            }
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operators() {
        let expr = DependencyExpr::parse("glibc>=2.39");
        assert_eq!(expr.name, "glibc");
        assert_eq!(
            expr.constraint,
            Some(Constraint::new(Operator::GreaterEqual, "2.39"))
        );

        let expr = DependencyExpr::parse("python<=3.12");
        assert_eq!(expr.constraint.unwrap().op, Operator::LessEqual);
        let expr = DependencyExpr::parse("python<3.13");
        assert_eq!(expr.constraint.unwrap().op, Operator::Less);
        let expr = DependencyExpr::parse("linux>6");
        assert_eq!(expr.constraint.unwrap().op, Operator::Greater);
        let expr = DependencyExpr::parse("sh=5.2");
        assert_eq!(expr.constraint.unwrap(), Constraint::exact("5.2"));
    }

    #[test]
    fn test_parse_unconstrained() {
        let expr = DependencyExpr::parse("bash");
        assert_eq!(expr.name, "bash");
        assert!(expr.constraint.is_none());
        assert!(expr.matches("bash", "0.1"));
        assert!(!expr.matches("zsh", "0.1"));
        assert_eq!(expr.to_string(), "bash");
    }

    #[test]
    fn test_constraint_matching() {
        assert!(Constraint::new(Operator::GreaterEqual, "1.0").matches("1.0"));
        assert!(Constraint::new(Operator::GreaterEqual, "1.0").matches("1:0.1"));
        assert!(!Constraint::new(Operator::Greater, "1.0").matches("1.0"));
        assert!(Constraint::new(Operator::Less, "2.0").matches("1.9-3"));
        assert!(Constraint::new(Operator::LessEqual, "2.0").matches("2.0"));
        assert!(!Constraint::exact("2.0-1").matches("2.0-2"));
    }

    #[test]
    fn test_satisfies_all_constraints() {
        let range = vec![
            Constraint::new(Operator::GreaterEqual, "1.0"),
            Constraint::new(Operator::Less, "2.0"),
        ];
        assert!(satisfies("1.5", &range));
        assert!(!satisfies("2.0", &range));
        assert!(!satisfies("0.9", &range));
        assert!(satisfies("anything", &[]));
    }

    #[test]
    fn test_group_by_name() {
        let grouped = group_by_name(["foo>=1.0", "bar", "foo<2.0", "baz=3", "bar"]);
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped[0].0, "foo");
        assert_eq!(grouped[0].1.len(), 2);
        assert_eq!(grouped[1], ("bar".to_string(), Vec::new()));
        assert_eq!(grouped[2].1, vec![Constraint::exact("3")]);
    }
}
