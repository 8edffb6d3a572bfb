//! Caller-built user filters.
//!
//! # Responsibility
//! - Describe a selection of users independently of the backing store.
//! - Provide the reference in-memory evaluation.
//!
//! # Invariants
//! - `And([])` matches every user; `Or([])` and `IdIn([])` match none.
//! - `NameContains` is case-sensitive.
//! - `EmailDomain` compares ASCII case-insensitively and never matches a
//!   user without email.
//! - Storage backends that translate a spec must agree with
//!   [`UserSpec::is_satisfied_by`].

use crate::model::user::{User, UserId};
use serde::{Deserialize, Serialize};

/// Immutable filter over users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum UserSpec {
    #[default]
    All,
    IdIn(Vec<UserId>),
    NameEquals(String),
    NameContains(String),
    EmailDomain(String),
    HasEmail,
    And(Vec<UserSpec>),
    Or(Vec<UserSpec>),
    Not(Box<UserSpec>),
}

impl UserSpec {
    pub fn ids(ids: impl IntoIterator<Item = UserId>) -> Self {
        Self::IdIn(ids.into_iter().collect())
    }

    pub fn name_equals(name: impl Into<String>) -> Self {
        Self::NameEquals(name.into())
    }

    pub fn name_contains(fragment: impl Into<String>) -> Self {
        Self::NameContains(fragment.into())
    }

    /// Matches users whose email domain equals `domain`.
    ///
    /// A leading `@` is accepted and ignored.
    pub fn email_domain(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        match domain.strip_prefix('@') {
            Some(stripped) => Self::EmailDomain(stripped.to_string()),
            None => Self::EmailDomain(domain),
        }
    }

    /// Conjunction; flattens nested `And` nodes.
    pub fn and(self, other: UserSpec) -> Self {
        match (self, other) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), right) => {
                left.push(right);
                Self::And(left)
            }
            (left, Self::And(mut right)) => {
                right.insert(0, left);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Disjunction; flattens nested `Or` nodes.
    pub fn or(self, other: UserSpec) -> Self {
        match (self, other) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), right) => {
                left.push(right);
                Self::Or(left)
            }
            (left, Self::Or(mut right)) => {
                right.insert(0, left);
                Self::Or(right)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Evaluates this spec against one user.
    pub fn is_satisfied_by(&self, user: &User) -> bool {
        match self {
            Self::All => true,
            Self::IdIn(ids) => ids.contains(&user.id),
            Self::NameEquals(name) => user.name == *name,
            Self::NameContains(fragment) => user.name.contains(fragment.as_str()),
            Self::EmailDomain(domain) => user
                .email_domain()
                .is_some_and(|actual| actual.eq_ignore_ascii_case(domain)),
            Self::HasEmail => user.email.is_some(),
            Self::And(specs) => specs.iter().all(|spec| spec.is_satisfied_by(user)),
            Self::Or(specs) => specs.iter().any(|spec| spec.is_satisfied_by(user)),
            Self::Not(spec) => !spec.is_satisfied_by(user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UserSpec;
    use crate::model::user::{User, UserId};

    fn ann() -> User {
        User::new(1, "Ann Lee").with_email("ann@Example.com")
    }

    #[test]
    fn empty_combinators_follow_identity_elements() {
        assert!(UserSpec::And(Vec::new()).is_satisfied_by(&ann()));
        assert!(!UserSpec::Or(Vec::new()).is_satisfied_by(&ann()));
        assert!(!UserSpec::IdIn(Vec::new()).is_satisfied_by(&ann()));
    }

    #[test]
    fn name_contains_is_case_sensitive() {
        assert!(UserSpec::name_contains("Lee").is_satisfied_by(&ann()));
        assert!(!UserSpec::name_contains("lee").is_satisfied_by(&ann()));
    }

    #[test]
    fn email_domain_ignores_ascii_case_and_leading_at() {
        assert!(UserSpec::email_domain("@example.COM").is_satisfied_by(&ann()));
        assert!(!UserSpec::email_domain("example.org").is_satisfied_by(&ann()));
        assert!(!UserSpec::email_domain("example.com").is_satisfied_by(&User::new(2, "Bob")));
    }

    #[test]
    fn builders_flatten_and_double_negation_cancels() {
        let spec = UserSpec::name_equals("Ann Lee")
            .and(UserSpec::HasEmail)
            .and(UserSpec::ids([UserId::new(1)]));
        assert!(matches!(&spec, UserSpec::And(parts) if parts.len() == 3));
        assert!(spec.is_satisfied_by(&ann()));

        let negated = UserSpec::HasEmail.negate();
        assert!(!negated.is_satisfied_by(&ann()));
        assert_eq!(negated.negate(), UserSpec::HasEmail);
    }

    #[test]
    fn builders_flatten_a_nested_right_hand_side() {
        let and = UserSpec::HasEmail.and(UserSpec::name_equals("Ann Lee").and(UserSpec::All));
        assert_eq!(
            and,
            UserSpec::And(vec![
                UserSpec::HasEmail,
                UserSpec::name_equals("Ann Lee"),
                UserSpec::All,
            ])
        );

        let or = UserSpec::HasEmail.or(UserSpec::ids([UserId::new(2)]).or(UserSpec::All));
        assert!(matches!(&or, UserSpec::Or(parts) if parts.len() == 3));
        assert_eq!(
            or.is_satisfied_by(&ann()),
            UserSpec::HasEmail.is_satisfied_by(&ann())
        );
    }

    #[test]
    fn serializes_with_kind_and_value_tags() {
        let spec = UserSpec::HasEmail.negate();
        assert_eq!(
            serde_json::to_string(&spec).unwrap(),
            r#"{"kind":"not","value":{"kind":"has_email"}}"#
        );
        assert_eq!(
            serde_json::to_value(UserSpec::ids([UserId::new(1), UserId::new(2)])).unwrap(),
            serde_json::json!({"kind": "id_in", "value": [1, 2]})
        );

        let nested = UserSpec::email_domain("example.com")
            .or(UserSpec::name_contains("Lee").negate())
            .and(UserSpec::All);
        let encoded = serde_json::to_string(&nested).unwrap();
        assert_eq!(serde_json::from_str::<UserSpec>(&encoded).unwrap(), nested);
    }
}
